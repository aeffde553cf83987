//! Credential store boundary.
//!
//! The core only ever reads credentials. Writing them belongs to whatever
//! signs the driver in (the CLI `login` command, or the host app).

use crate::error::{CourierError, Result};
use crate::storage::StorageConfig;
use crate::types::Credentials;
use fs_err as fs;
use std::path::PathBuf;

pub trait CredentialStore {
    fn load(&self) -> Option<Credentials>;
}

/// Reads `credentials.json` from the courier root.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            path: storage.credentials_file(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credentials> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Credentials>(&content) {
            Ok(creds) if !creds.driver_id.trim().is_empty() && !creds.token.trim().is_empty() => {
                Some(creds)
            }
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Credentials file is missing fields");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "Credentials file is corrupt");
                None
            }
        }
    }
}

/// Fixed credentials, for hosts that hold the token in memory.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Option<Credentials>);

impl CredentialStore for StaticCredentials {
    fn load(&self) -> Option<Credentials> {
        self.0.clone()
    }
}

/// Persists credentials with temp file + rename so a crash never leaves a
/// half-written token behind. Not used by the core itself.
pub fn save_credentials(storage: &StorageConfig, creds: &Credentials) -> Result<()> {
    let path = storage.credentials_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| CourierError::Io {
            context: "creating credentials directory".to_string(),
            source: err,
        })?;
    }
    let payload = serde_json::to_vec_pretty(creds).map_err(|err| CourierError::Json {
        context: "serializing credentials".to_string(),
        source: err,
    })?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| CourierError::Io {
        context: "writing credentials".to_string(),
        source: err,
    })?;
    fs::rename(&tmp_path, &path).map_err(|err| CourierError::Io {
        context: "committing credentials".to_string(),
        source: err,
    })
}

/// Removes stored credentials; a missing file is not an error.
pub fn clear_credentials(storage: &StorageConfig) -> Result<()> {
    let path = storage.credentials_file();
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CourierError::Io {
            context: "removing credentials".to_string(),
            source: err,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_through_file() {
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("nested"));
        let creds = Credentials {
            driver_id: "drv-7".to_string(),
            token: "tok".to_string(),
        };
        save_credentials(&storage, &creds).unwrap();

        let store = FileCredentialStore::new(&storage);
        assert_eq!(store.load(), Some(creds));

        clear_credentials(&storage).unwrap();
        assert_eq!(store.load(), None);
        clear_credentials(&storage).unwrap();
    }

    #[test]
    fn blank_token_is_treated_as_missing() {
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(
            storage.credentials_file(),
            r#"{"driverId":"drv-1","token":"  "}"#,
        )
        .unwrap();
        assert_eq!(FileCredentialStore::new(&storage).load(), None);
    }
}
