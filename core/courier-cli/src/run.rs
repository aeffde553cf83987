//! `courier run`: online session with an interactive command prompt.
//!
//! The engine is pumped on this thread. Stdin is read on a helper thread and
//! handed over as parsed commands, so typing never stalls tracking.
//! `advance` and `cancel` wait for a `y` on the next line unless `--yes`.

use crate::render;
use courier_core::{
    CourierConfig, CourierError, DriverEngine, EngineNotice, FileCredentialStore, LocationSensor,
    ReplaySensor, Result, StorageConfig,
};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(200);

const HELP: &str = "commands: offers | accept <id> | advance | cancel | refresh | status | quit";

pub struct RunOptions {
    pub replay: Option<PathBuf>,
    pub pace: Duration,
    pub repeat: bool,
    pub duration: Option<Duration>,
    pub assume_yes: bool,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Offers,
    Accept(String),
    Advance,
    Cancel,
    Refresh,
    Status,
    Help,
    Confirm(bool),
    Quit,
}

impl Command {
    fn confirmation_prompt(&self) -> Option<&'static str> {
        match self {
            Command::Advance => Some("Advance the active delivery to its next status? [y/N]"),
            Command::Cancel => Some("Cancel the active delivery? [y/N]"),
            _ => None,
        }
    }
}

/// What the loop should do with a submitted command.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Run(Command),
    Ask(&'static str),
    Skip(&'static str),
}

/// Holds a destructive command until the driver answers the prompt.
#[derive(Debug, Default)]
pub struct Confirmations {
    pending: Option<Command>,
    assume_yes: bool,
}

impl Confirmations {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            pending: None,
            assume_yes,
        }
    }

    pub fn submit(&mut self, command: Command) -> Step {
        if let Command::Confirm(yes) = command {
            return match self.pending.take() {
                Some(held) if yes => Step::Run(held),
                Some(_) => Step::Skip("Not sent"),
                None => Step::Skip("Nothing to confirm"),
            };
        }
        // Anything else abandons a pending prompt.
        self.pending = None;
        match command.confirmation_prompt() {
            Some(prompt) if !self.assume_yes => {
                self.pending = Some(command);
                Step::Ask(prompt)
            }
            _ => Step::Run(command),
        }
    }
}

pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "offers" | "ls" => Command::Offers,
        "accept" => match words.next() {
            Some(id) => Command::Accept(id.to_string()),
            None => return Err("usage: accept <offer id>".to_string()),
        },
        "advance" | "next" => Command::Advance,
        "cancel" => Command::Cancel,
        "refresh" => Command::Refresh,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "y" | "yes" => Command::Confirm(true),
        "n" | "no" => Command::Confirm(false),
        "quit" | "exit" | "offline" => Command::Quit,
        other => return Err(format!("unknown command: {}", other)),
    };
    if words.next().is_some() {
        return Err(format!("too many arguments for {}", verb));
    }
    Ok(command)
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = channel();
    thread::Builder::new()
        .name("courier-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|err| CourierError::Io {
            context: "spawning stdin reader".to_string(),
            source: err,
        })?;
    Ok(rx)
}

fn sensor(options: &RunOptions) -> Result<Option<Box<dyn LocationSensor>>> {
    let Some(path) = &options.replay else {
        return Ok(None);
    };
    let sensor = ReplaySensor::from_path(path, options.pace, options.repeat)?;
    tracing::info!(path = %path.display(), "Replaying location feed");
    Ok(Some(Box::new(sensor)))
}

pub fn run(storage: &StorageConfig, config: CourierConfig, options: RunOptions) -> Result<()> {
    let mut engine = DriverEngine::connect_default(config, sensor(&options)?)?;
    engine.login_from(&FileCredentialStore::new(storage))?;

    let status = engine.go_online()?;
    render::tracking(&status, options.json);
    render::offers(engine.offers(), options.json);
    if !options.json {
        println!("{}", HELP);
    }

    let commands = spawn_stdin_reader()?;
    let mut confirmations = Confirmations::new(options.assume_yes);
    let started = Instant::now();

    'session: loop {
        for notice in engine.wait_and_pump(TICK) {
            render::notice(&notice, options.json);
            if notice == EngineNotice::SessionExpired {
                return Err(CourierError::AuthExpired);
            }
        }

        loop {
            match commands.try_recv() {
                Ok(line) => match parse_command(&line) {
                    Ok(Command::Quit) => break 'session,
                    Ok(command) => match confirmations.submit(command) {
                        Step::Run(command) => execute(&mut engine, command, options.json)?,
                        Step::Ask(prompt) => println!("{}", prompt),
                        Step::Skip(message) => println!("{}", message),
                    },
                    Err(message) => eprintln!("{}", message),
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if let Some(limit) = options.duration {
            if started.elapsed() >= limit {
                tracing::info!(elapsed_secs = started.elapsed().as_secs(), "Run duration reached");
                break;
            }
        }
    }

    match engine.go_offline() {
        Ok(()) => {}
        Err(CourierError::DeliveryAlreadyActive(id)) => {
            eprintln!("Delivery {} is still active; it stays assigned to you", id);
        }
        Err(err) => return Err(err),
    }
    render::snapshot(&engine.snapshot(), options.json);
    Ok(())
}

/// Runs one driver command. Only an expired session ends the run; every
/// other failure is reported and leaves the session as it was.
fn execute(engine: &mut DriverEngine, command: Command, json: bool) -> Result<()> {
    let outcome = match command {
        Command::Offers => {
            render::offers(engine.offers(), json);
            Ok(())
        }
        Command::Accept(id) => engine
            .accept_offer(&id)
            .map(|record| render::delivery(&record, json)),
        Command::Advance => engine
            .advance_delivery()
            .map(|record| render::delivery(&record, json)),
        Command::Cancel => engine
            .cancel_delivery()
            .map(|record| render::delivery(&record, json)),
        Command::Refresh => engine
            .refresh_offers()
            .map(|offers| render::offers(&offers, json)),
        Command::Status => {
            render::snapshot(&engine.snapshot(), json);
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Confirm(_) | Command::Quit => Ok(()),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(CourierError::AuthExpired) => Err(CourierError::AuthExpired),
        Err(err) => {
            tracing::warn!(error = %err, "Driver command failed");
            eprintln!("{}", err);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_driver_commands() {
        assert_eq!(parse_command("offers"), Ok(Command::Offers));
        assert_eq!(
            parse_command("  accept ord-1 "),
            Ok(Command::Accept("ord-1".to_string()))
        );
        assert_eq!(parse_command("NEXT"), Ok(Command::Advance));
        assert_eq!(parse_command("offline"), Ok(Command::Quit));
    }

    #[test]
    fn destructive_commands_wait_for_yes() {
        let mut confirmations = Confirmations::new(false);
        assert!(matches!(confirmations.submit(Command::Cancel), Step::Ask(_)));
        assert_eq!(
            confirmations.submit(Command::Confirm(true)),
            Step::Run(Command::Cancel)
        );
        assert_eq!(
            confirmations.submit(Command::Confirm(true)),
            Step::Skip("Nothing to confirm")
        );
    }

    #[test]
    fn declined_or_interrupted_prompt_sends_nothing() {
        let mut confirmations = Confirmations::new(false);
        assert!(matches!(confirmations.submit(Command::Advance), Step::Ask(_)));
        assert_eq!(confirmations.submit(Command::Confirm(false)), Step::Skip("Not sent"));

        assert!(matches!(confirmations.submit(Command::Advance), Step::Ask(_)));
        assert_eq!(confirmations.submit(Command::Offers), Step::Run(Command::Offers));
        assert_eq!(
            confirmations.submit(Command::Confirm(true)),
            Step::Skip("Nothing to confirm")
        );
    }

    #[test]
    fn assume_yes_runs_destructive_commands_directly() {
        let mut confirmations = Confirmations::new(true);
        assert_eq!(
            confirmations.submit(Command::Advance),
            Step::Run(Command::Advance)
        );
        assert_eq!(parse_command("Y"), Ok(Command::Confirm(true)));
        assert_eq!(parse_command("no"), Ok(Command::Confirm(false)));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("accept").is_err());
        assert!(parse_command("cancel now").is_err());
        assert!(parse_command("dance").is_err());
        assert!(parse_command("   ").is_err());
    }
}
