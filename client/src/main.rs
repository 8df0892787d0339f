mod api;
mod errors;
mod simulate;
mod telemetry;

use anyhow::Context;
use api::ServerClient;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line client for the HoloLens Communication Server
#[derive(Parser, Debug)]
#[command(name = "hololens-client", version)]
struct Args {
    /// Base URL of the server
    #[arg(long, env = "SERVER_URL", default_value = "http://127.0.0.1:8000")]
    server_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server is up
    Status,

    /// List registered message types
    Types,

    /// Register a message type, e.g. --structure '{"x": "float"}'
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        structure: String,
    },

    /// Validate a reading against its message type, then submit it
    Send {
        #[arg(long, env = "HOLOLENS_ID", default_value = "HOLO1")]
        device_id: String,
        #[arg(long, default_value = telemetry::POSITION_TYPE)]
        message_type: String,
        /// Sensor data as a JSON object; defaults to a sample position
        #[arg(long)]
        data: Option<String>,
    },

    /// Show what the server stored for a device
    Fetch {
        #[arg(long, env = "HOLOLENS_ID", default_value = "HOLO1")]
        device_id: String,
    },

    /// Stream random position readings
    Simulate {
        #[arg(long, default_value = "5")]
        devices: usize,
        /// Readings per second
        #[arg(long, default_value = "100")]
        rate: u64,
        /// Stop after this many readings; 0 runs until interrupted
        #[arg(long, default_value = "0")]
        count: u64,
    },

    /// Status, schema registration, one validated reading and a fetch
    Demo {
        #[arg(long, env = "HOLOLENS_ID", default_value = "HOLO1")]
        device_id: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let client = ServerClient::new(&args.server_url)?;

    match args.command {
        Command::Status => {
            info!("Server status: {}", client.status().await?);
        }
        Command::Types => {
            let types = client.message_types().await?;
            info!("Available message types: {}", serde_json::to_string(&types)?);
        }
        Command::Register { name, structure } => {
            let structure: Value =
                serde_json::from_str(&structure).context("--structure is not valid JSON")?;
            info!("{}", client.register(&name, &structure).await?);
        }
        Command::Send {
            device_id,
            message_type,
            data,
        } => {
            let data = match data {
                Some(raw) => parse_object(&raw)?,
                None => telemetry::sample_position(),
            };
            let reply = client.send_validated(&device_id, &message_type, data).await?;
            info!("Server response: {}", reply);
        }
        Command::Fetch { device_id } => {
            info!("HoloLens data for {}: {}", device_id, client.fetch(&device_id).await?);
        }
        Command::Simulate {
            devices,
            rate,
            count,
        } => {
            simulate::run(&client, devices, rate, count).await?;
        }
        Command::Demo { device_id } => {
            info!("Server status: {}", client.status().await?);
            simulate::ensure_position_type(&client).await?;
            let types = client.message_types().await?;
            info!("Available message types: {}", serde_json::to_string(&types)?);

            let reply = client
                .send_validated(&device_id, telemetry::POSITION_TYPE, telemetry::sample_position())
                .await?;
            info!("Server response: {}", reply);
            info!("HoloLens data for {}: {}", device_id, client.fetch(&device_id).await?);
        }
    }

    Ok(())
}

fn parse_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("--data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--data must be a JSON object, got {}", other),
    }
}
