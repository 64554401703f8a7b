//! sampleagent - field console for medical sample couriers.
//!
//! Tracks the day's pickups, the active sample's collection timeline, a chat
//! assistant, health and safety tips and incident reports. State is kept in
//! the local data directory and survives restarts; everything works offline
//! except the assistant.

mod input;
mod render;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sampleagent_core::assistant::GeminiClient;
use sampleagent_core::clock::SystemClock;
use sampleagent_core::credentials::CredentialStore;
use sampleagent_core::device::{ConnectivityProbe, FixedLocation, HttpProbe, StaticProbe};
use sampleagent_core::storage::{EncryptedStore, FileStore, KvStore};
use sampleagent_core::tips::{HttpTipsSource, MockTipsSource, TipsSource};
use sampleagent_core::{App, Config, Services};

use input::{parse_line, Command, HELP};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling console input (in milliseconds)
const INPUT_POLL_TIMEOUT_MS: u64 = 100;

/// Log file name prefix inside the data directory
const LOG_FILE_PREFIX: &str = "sampleagent.log";

/// Environment variable with a fixed "lat,lng[,accuracy]" position
const LOCATION_ENV: &str = "SAMPLEAGENT_LOCATION";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and to a daily rolling file in `log_dir`. The returned
/// guard must live until exit so the file writer flushes.
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    guard
}

/// Prompt for the assistant API key and keep it in the OS keychain.
fn set_api_key() -> Result<()> {
    let key = rpassword::prompt_password("Assistant API key: ")
        .context("Failed to read API key")?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("No API key entered");
    }
    CredentialStore::store_api_key(key)?;
    eprintln!("API key saved to the system keychain.");
    Ok(())
}

fn set_passphrase() -> Result<()> {
    let passphrase = rpassword::prompt_password("Local data passphrase: ")
        .context("Failed to read passphrase")?;
    let confirm = rpassword::prompt_password("Confirm passphrase: ")
        .context("Failed to read passphrase")?;
    if passphrase != confirm {
        anyhow::bail!("Passphrases do not match");
    }
    CredentialStore::store_passphrase(&passphrase)?;
    eprintln!("Passphrase saved to the system keychain.");
    Ok(())
}

fn build_store(config: &Config, data_dir: &Path) -> Result<Arc<dyn KvStore>> {
    let files = FileStore::new(data_dir.join("store"))?;
    if !config.security.encrypt_local_data {
        return Ok(Arc::new(files));
    }

    match CredentialStore::passphrase() {
        Some(passphrase) => {
            let sealed = EncryptedStore::new(files, &passphrase)
                .context("Failed to open encrypted store")?;
            info!("Local data encryption enabled");
            Ok(Arc::new(sealed))
        }
        None => {
            warn!("Encryption is enabled but no passphrase is available, storing in plain text");
            Ok(Arc::new(files))
        }
    }
}

fn build_services(config: &Config, data_dir: &Path) -> Result<Services> {
    let store = build_store(config, data_dir)?;

    let api_key = CredentialStore::api_key();
    let assistant = GeminiClient::new(&config.assistant, api_key)?;
    if !assistant.has_api_key() {
        warn!("No assistant API key configured; run `sampleagent --set-api-key`");
    }

    let tips: Arc<dyn TipsSource> = match &config.tips.api_url {
        Some(url) => Arc::new(HttpTipsSource::new(url.clone(), CredentialStore::api_key())?),
        None => Arc::new(MockTipsSource::new(Duration::from_millis(
            config.tips.mock_delay_ms,
        ))),
    };

    let probe: Arc<dyn ConnectivityProbe> = match &config.connectivity.probe_url {
        Some(url) => Arc::new(HttpProbe::new(
            url.clone(),
            Duration::from_secs(config.connectivity.probe_timeout_secs),
        )?),
        None => Arc::new(StaticProbe::new(true)),
    };

    let location = std::env::var(LOCATION_ENV)
        .ok()
        .and_then(|raw| FixedLocation::parse(&raw));

    Ok(Services {
        store,
        assistant: Arc::new(assistant),
        tips,
        probe,
        locator: Arc::new(FixedLocation::new(location)),
        clock: Arc::new(SystemClock),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--set-api-key") => return set_api_key(),
        Some("--set-passphrase") => return set_passphrase(),
        Some("--clear-api-key") => {
            CredentialStore::delete_api_key()?;
            eprintln!("API key removed from the system keychain.");
            return Ok(());
        }
        Some("--help") | Some("-h") => {
            println!("Usage: sampleagent [--set-api-key | --clear-api-key | --set-passphrase]\n\n{}", HELP);
            return Ok(());
        }
        _ => {}
    }

    let (config, config_error) = match Config::load() {
        Ok(c) => (c, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let data_dir = config
        .data_dir()
        .unwrap_or_else(|_| PathBuf::from("./sampleagent-data"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let _log_guard = init_tracing(&data_dir);
    info!(data_dir = %data_dir.display(), "sampleagent starting");
    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    let services = build_services(&config, &data_dir)?;
    let mut app = App::new(config, services);
    let tickers = app.spawn_tickers();

    println!("{}", render::render(&app));
    println!("Type 'help' for commands.");

    let result = run_app(&mut app).await;

    for ticker in tickers {
        ticker.abort();
    }
    let report = app.teardown();
    if !report.is_complete() {
        eprintln!("Some data could not be saved; see the log for details.");
    }

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!("sampleagent shutting down");
    Ok(())
}

/// Main console loop: read commands, apply background results, redraw.
async fn run_app(app: &mut App) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        // Poll for input with timeout to allow background updates
        let polled = tokio::time::timeout(
            Duration::from_millis(INPUT_POLL_TIMEOUT_MS),
            lines.next_line(),
        )
        .await;

        if let Ok(line) = polled {
            let Some(line) = line? else {
                // stdin closed
                return Ok(());
            };

            match parse_line(&line) {
                Ok(Command::Quit) => return Ok(()),
                Ok(Command::Help) => println!("{}", HELP),
                Ok(Command::Redraw) => println!("{}", render::render(app)),
                Ok(Command::Action(action)) => {
                    let outcome = app.dispatch(action);
                    render::print_outcome(app, &outcome);
                }
                Err(message) => println!("[error] {}", message),
            }
        }

        // Check for completed background tasks
        let outcome = app.check_background_tasks();
        if !outcome.is_empty() {
            render::print_outcome(app, &outcome);
        }
    }
}
