//! sessionkeep - command-line front end for the session token store.
//!
//! Restores the session left in durable storage, then logs in, logs out,
//! reports status, or watches the session until it expires.

use std::io;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sessionkeep_core::auth::parse_expiration;
use sessionkeep_core::{Config, DurableStore, SessionStore};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Store = SessionStore<Box<dyn DurableStore>>;

/// Log file name inside `log_dir`
const LOG_FILE: &str = "sessionkeep.log";

const USAGE: &str = "\
Usage: sessionkeep <command>

Commands:
  status                                 Show the current session
  login <token> <expiration>             Start a session (RFC 3339 or epoch millis)
  login <token> --expires-in <seconds>   Start a session expiring from now
  logout                                 End the current session
  watch                                  Print session changes until it ends
  config [--save]                        Show (or write out) the effective config
  help                                   Show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Login {
        token: String,
        expiration_time: DateTime<Utc>,
    },
    Logout,
    Watch,
    Config {
        save: bool,
    },
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            [] | ["status"] => Ok(Self::Status),
            ["login", token, "--expires-in", seconds] => {
                let seconds: i64 = seconds
                    .parse()
                    .with_context(|| format!("Invalid --expires-in value: {}", seconds))?;
                let expiration_time = Duration::try_seconds(seconds)
                    .and_then(|delta| Utc::now().checked_add_signed(delta))
                    .ok_or_else(|| anyhow::anyhow!("--expires-in out of range: {}", seconds))?;
                Ok(Self::Login {
                    token: token.to_string(),
                    expiration_time,
                })
            }
            ["login", token, expiration] => {
                let expiration_time = parse_expiration(expiration)
                    .ok_or_else(|| anyhow::anyhow!("Invalid expiration time: {}", expiration))?;
                Ok(Self::Login {
                    token: token.to_string(),
                    expiration_time,
                })
            }
            ["login", ..] => Err(anyhow::anyhow!("login needs a token and an expiration")),
            ["logout"] => Ok(Self::Logout),
            ["watch"] => Ok(Self::Watch),
            ["config"] => Ok(Self::Config { save: false }),
            ["config", "--save"] => Ok(Self::Config { save: true }),
            ["help"] | ["--help"] | ["-h"] => Ok(Self::Help),
            [other, ..] => Err(anyhow::anyhow!("Unknown command: {}", other)),
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file and must live until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    debug!(?command, storage = ?config.storage, "Starting");

    match command {
        Command::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        Command::Config { save } => {
            if save {
                config.save()?;
                info!("Config saved");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        _ => {}
    }

    let storage = config.open_storage()?;
    let store: Store = SessionStore::new(storage).with_expiration_margin(config.expiration_margin());
    if let Some(restored) = store.initialize() {
        debug!(remaining_secs = restored.duration.num_seconds(), "Restored stored session");
    }

    match command {
        Command::Login {
            token,
            expiration_time,
        } => {
            store.login(token, expiration_time);
            print_status(&store)?;
        }
        Command::Logout => {
            store.logout();
            print_status(&store)?;
        }
        Command::Watch => watch(&store).await?,
        _ => print_status(&store)?,
    }

    Ok(())
}

fn print_status(store: &Store) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
    if let Some(remaining) = store.remaining() {
        println!("expires in {}", format_remaining(remaining));
    }
    Ok(())
}

/// Print every session change until the session ends or Ctrl-C.
async fn watch(store: &Store) -> Result<()> {
    let mut changes = store.subscribe();
    print_status(store)?;
    if !store.is_logged_in() {
        return Ok(());
    }

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snapshot)?);
                if !snapshot.is_logged_in {
                    info!("Session ended");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

/// Human-readable remaining time, e.g. `1h 5m`, `4m 30s`, `12s`.
fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.num_seconds();
    if secs <= 0 {
        "now".to_string()
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

// ============================================================================
// Tests
// ============================================================================
