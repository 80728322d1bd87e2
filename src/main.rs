//! emberkv server entry point.
//!
//! Parses the command line, sets up logging, the store and the expiry
//! sweeper, then accepts connections until Ctrl+C.

use emberkv::commands::CommandHandler;
use emberkv::connection::{handle_connection, ConnectionStats};
use emberkv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Pause between expiry sweeps
    sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: emberkv::DEFAULT_HOST.to_string(),
            port: emberkv::DEFAULT_PORT,
            sweep_interval: emberkv::storage::expiry::DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Run(Config),
    Help,
    Version,
}

impl Config {
    /// Parse configuration from command-line arguments (program name excluded).
    fn parse<I>(args: I) -> Result<Invocation, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().ok_or("--host requires a value")?;
                }
                "--port" | "-p" => {
                    let value = args.next().ok_or("--port requires a value")?;
                    config.port = value
                        .parse()
                        .map_err(|_| format!("invalid port number '{}'", value))?;
                }
                "--sweep-interval" => {
                    let value = args.next().ok_or("--sweep-interval requires a value")?;
                    let ms: u64 = value
                        .parse()
                        .ok()
                        .filter(|ms| *ms > 0)
                        .ok_or_else(|| format!("invalid sweep interval '{}'", value))?;
                    config.sweep_interval = Duration::from_millis(ms);
                }
                "--help" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                other => return Err(format!("unknown argument: {}", other)),
            }
        }

        Ok(Invocation::Run(config))
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
emberkv - A small in-memory key-value store

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>            Port to listen on (default: 6379)
        --sweep-interval <MS>    Milliseconds between expiry sweeps (default: 100)
    -v, --version                Print version information
        --help                   Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=emberkv=debug

COMMANDS:
    PING [message]
    ECHO message
    SET key value [XP milliseconds]
    GET key
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::parse(std::env::args().skip(1)) {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("emberkv version {}", emberkv::VERSION);
            return Ok(());
        }
        Err(message) => {
            eprintln!("Error: {}", message);
            print_help();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Shared across all connections and the sweeper
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized");

    let _sweeper = ExpirySweeper::start(
        Arc::clone(&storage),
        ExpiryConfig::with_interval(config.sweep_interval),
    );

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        version = emberkv::VERSION,
        address = %config.bind_address(),
        "Ready to accept connections"
    );

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C, running until killed");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), stats) => {}
        _ = shutdown => {}
    }

    info!(keys = storage.len(), "Server shutdown complete");
    Ok(())
}

/// Accepts connections forever, one task per client.
///
/// A failed accept is logged and skipped; it never stops the listener.
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
