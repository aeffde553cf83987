//! courier: command-line driver client.
//!
//! Thin shell over `courier-core`. Credentials live in
//! `~/.courier/credentials.json`, logs in `~/.courier/logs/`.
//!
//! ## Subcommands
//!
//! - `login` / `logout`: store or forget the driver's token
//! - `run`: go online and process offers until stopped; reads driver
//!   commands (`accept <id>`, `advance`, `cancel`, ...) from stdin
//! - `offers`, `profile`, `earnings`, `history`: one-shot reads

mod account;
mod logging;
mod render;
mod run;

use clap::{Parser, Subcommand};
use courier_core::{load_config, CourierError, StorageConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier driver client")]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store credentials for later commands
    Login {
        #[arg(long)]
        driver_id: String,

        /// Bearer token issued by the backend
        #[arg(long)]
        token: String,
    },

    /// Forget stored credentials
    Logout,

    /// Go online and track until interrupted or `quit` is typed
    Run {
        /// Newline-delimited JSON location feed to replay
        #[arg(long, value_name = "PATH")]
        replay: Option<PathBuf>,

        /// Delay between replayed readings
        #[arg(long, default_value_t = 1000)]
        pace_ms: u64,

        /// Loop the replay feed
        #[arg(long)]
        repeat: bool,

        /// Go offline automatically after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Run `advance` and `cancel` without asking for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// List deliveries currently up for grabs
    Offers,

    /// Show the driver profile
    Profile,

    /// Show the earnings summary
    Earnings,

    /// Show completed deliveries
    History,
}

fn main() {
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage);
    let cli = Cli::parse();

    if let Err(err) = dispatch(&storage, cli) {
        tracing::error!(error = %err, "courier command failed");
        match err {
            CourierError::NotLoggedIn | CourierError::AuthExpired => {
                eprintln!("courier: {}. Run `courier login` first.", err)
            }
            other => eprintln!("courier: {}", other),
        }
        std::process::exit(1);
    }
}

fn dispatch(storage: &StorageConfig, cli: Cli) -> courier_core::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Login { driver_id, token } => account::login(storage, &driver_id, &token),
        Commands::Logout => account::logout(storage),
        Commands::Run {
            replay,
            pace_ms,
            repeat,
            duration_secs,
            yes,
        } => run::run(
            storage,
            load_config(storage)?,
            run::RunOptions {
                replay,
                pace: Duration::from_millis(pace_ms),
                repeat,
                duration: duration_secs.map(Duration::from_secs),
                assume_yes: yes,
                json,
            },
        ),
        Commands::Offers => account::offers(storage, load_config(storage)?, json),
        Commands::Profile => account::profile(storage, load_config(storage)?, json),
        Commands::Earnings => account::earnings(storage, load_config(storage)?, json),
        Commands::History => account::history(storage, load_config(storage)?, json),
    }
}
