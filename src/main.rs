//! fastws - Event-bus client
//!
//! Command-line client for fast-ws endpoints: emit events, send messages
//! and watch traffic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fastws::config::{self, Config};
use fastws::{Client, EventData, WebSocketTransport};

/// How long to wait for the handshake before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// fastws - Event-bus client
#[derive(Parser)]
#[command(name = "fastws")]
#[command(author = "fastws Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Emit and observe events on a fast-ws endpoint", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit a named event
    Emit {
        /// Event name
        event: String,

        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,

        /// Wait for the response and print it
        #[arg(short, long)]
        wait: bool,

        /// Endpoint URL (overrides the configuration)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Send a plain message
    Send {
        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,

        /// Endpoint URL (overrides the configuration)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Print incoming traffic until interrupted
    Listen {
        /// Endpoint URL (overrides the configuration)
        #[arg(short, long)]
        url: Option<String>,

        /// Named events to print
        events: Vec<String>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Emit {
            event,
            data,
            wait,
            url,
        } => {
            let payload = parse_payload(data.as_deref())?;
            let client = connect(&config, url).await?;
            let reply = client.emit(&event, payload, wait).await;
            client.close().await?;
            if let Some(value) = reply? {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Commands::Send { data, url } => {
            let payload = parse_payload(data.as_deref())?;
            let client = connect(&config, url).await?;
            client.send(payload).await?;
            client.close().await?;
        }
        Commands::Listen { url, events } => {
            run_listener(&config, url, events).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn parse_payload(data: Option<&str>) -> anyhow::Result<Value> {
    match data {
        Some(text) => Ok(serde_json::from_str(text)?),
        None => Ok(Value::Null),
    }
}

/// Open a client and wait for the handshake
async fn connect(config: &Config, url: Option<String>) -> anyhow::Result<Client> {
    let endpoint = url.unwrap_or_else(|| config.client.endpoint.clone());
    let transport =
        WebSocketTransport::new(endpoint.as_str()).with_protocol(config.client.protocol.as_str());
    let client = Client::new(config.client_options());

    client.on("error", |data| {
        if let Some(error) = data.as_error() {
            tracing::warn!("{}", error);
        }
    });

    tracing::info!("Connecting to {}", endpoint);
    client.open(transport).await?;
    client.wait_connected(CONNECT_TIMEOUT).await?;
    tracing::info!("Connected to {}", endpoint);

    Ok(client)
}

/// Print traffic until Ctrl+C or disconnect
async fn run_listener(
    config: &Config,
    url: Option<String>,
    events: Vec<String>,
) -> anyhow::Result<()> {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let client = Arc::new(connect(config, url).await?);

    for name in ["message", "ping", "pong", "binary", "disconnect"] {
        let lines = line_tx.clone();
        client.on(name, move |data| {
            let _ = lines.send(describe(name, data));
        });
    }
    for name in events {
        let lines = line_tx.clone();
        let label = name.clone();
        client.on(&name, move |data| {
            let _ = lines.send(describe(&label, data));
        });
    }
    drop(line_tx);

    println!("Listening. Press Ctrl+C to stop.");

    let mut state = client.state_changes();
    loop {
        tokio::select! {
            Some(line) = line_rx.recv() => {
                println!("{}", line);
            }
            changed = state.changed() => {
                if changed.is_err() || !client.is_connected() {
                    println!("Disconnected");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                client.close().await?;
                break;
            }
        }
    }

    Ok(())
}

fn describe(name: &str, data: &EventData) -> String {
    match data {
        EventData::Empty => name.to_string(),
        EventData::Value(value) => format!("{}: {}", name, value),
        EventData::Ping { timestamp } => format!("{}: {}", name, timestamp),
        EventData::Pong { latency_ms } => format!("{}: {} ms", name, latency_ms),
        EventData::Binary(bytes) => format!("{}: {} bytes", name, bytes.len()),
        EventData::Error(error) => format!("{}: {}", name, error),
    }
}
