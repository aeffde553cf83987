//! One-shot commands: credentials and account reads.

use crate::render;
use courier_core::{
    clear_credentials, save_credentials, CourierConfig, CourierError, CredentialStore,
    Credentials, DeliveryApi, DriverEngine, FileCredentialStore, HttpDeliveryApi, Result,
    StorageConfig,
};
use courier_protocol::ErrorInfo;

pub fn login(storage: &StorageConfig, driver_id: &str, token: &str) -> Result<()> {
    let credentials = Credentials {
        driver_id: driver_id.trim().to_string(),
        token: token.trim().to_string(),
    };
    if credentials.driver_id.is_empty() || credentials.token.is_empty() {
        return Err(ErrorInfo::new("missing_field", "driver id and token are required").into());
    }
    save_credentials(storage, &credentials)?;
    tracing::info!(driver_id = %credentials.driver_id, "Credentials stored");
    println!("Signed in as {}", credentials.driver_id);
    Ok(())
}

pub fn logout(storage: &StorageConfig) -> Result<()> {
    clear_credentials(storage)?;
    println!("Signed out");
    Ok(())
}

fn engine(storage: &StorageConfig, config: CourierConfig) -> Result<DriverEngine> {
    let mut engine = DriverEngine::connect_default(config, None)?;
    engine.login_from(&FileCredentialStore::new(storage))?;
    Ok(engine)
}

/// Lists offers straight from the backend; no need to go online for a look.
pub fn offers(storage: &StorageConfig, config: CourierConfig, json: bool) -> Result<()> {
    let credentials = FileCredentialStore::new(storage)
        .load()
        .ok_or(CourierError::NotLoggedIn)?;
    let api = HttpDeliveryApi::new(&config.api_base_url, config.request_timeout())?;
    let offers = api.fetch_available_deliveries(&credentials)?;
    render::offers(&offers, json);
    Ok(())
}

pub fn profile(storage: &StorageConfig, config: CourierConfig, json: bool) -> Result<()> {
    let profile = engine(storage, config)?.profile()?;
    render::profile(&profile, json);
    Ok(())
}

pub fn earnings(storage: &StorageConfig, config: CourierConfig, json: bool) -> Result<()> {
    let earnings = engine(storage, config)?.earnings()?;
    render::earnings(&earnings, json);
    Ok(())
}

pub fn history(storage: &StorageConfig, config: CourierConfig, json: bool) -> Result<()> {
    let history = engine(storage, config)?.history()?;
    render::history(&history, json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn login_then_logout_round_trips_store() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig::with_root(dir.path().to_path_buf());

        login(&storage, " drv-1 ", "tok").unwrap();
        let loaded = FileCredentialStore::new(&storage).load().unwrap();
        assert_eq!(loaded.driver_id, "drv-1");

        logout(&storage).unwrap();
        assert!(FileCredentialStore::new(&storage).load().is_none());
    }

    #[test]
    fn blank_login_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig::with_root(dir.path().to_path_buf());
        assert!(login(&storage, "drv-1", "  ").is_err());
        assert!(!storage.credentials_file().exists());
    }
}
