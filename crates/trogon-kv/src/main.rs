mod signal;
mod telemetry;

use clap::{Parser, Subcommand};
use std::io::Write;
use std::time::Duration;
use tracing::{error, info, warn};
use trogon_kv::{KeyValueClient, StoreConfig, UpdateEvent};
use trogon_std::{SystemEnv, SystemFs};

#[derive(Parser, Debug)]
#[command(name = "trogon-kv")]
#[command(about = "Read, write and observe an arbiter-protected key-value store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a value to a key.
    Write {
        data_source_id: String,
        key: String,
        value: String,
    },
    /// Print the value stored at a key.
    Read { data_source_id: String, key: String },
    /// List the keys of a data source.
    Keys { data_source_id: String },
    /// Stream updates until interrupted or the store ends the feed.
    Observe {
        data_source_id: String,
        /// Only this key instead of every key of the data source.
        #[arg(long)]
        key: Option<String>,
    },
    /// Wait for the store to answer its status probe.
    Wait {
        #[arg(long, default_value_t = 30)]
        attempts: u32,
        #[arg(long = "interval-secs", default_value_t = 1)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let provider = telemetry::init_logger();

    let result = run(cli.command).await;
    if let Err(ref e) = result {
        error!(error = %e, "trogon-kv failed");
    }

    telemetry::shutdown(&provider);
    result
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = StoreConfig::from_env(&SystemEnv, &SystemFs)?;
    let kv = KeyValueClient::connect(&config).await?;
    let mut stdout = std::io::stdout();

    match command {
        Command::Write {
            data_source_id,
            key,
            value,
        } => {
            kv.write(&data_source_id, &key, value).await?;
            info!(%data_source_id, %key, "Value written");
        }
        Command::Read {
            data_source_id,
            key,
        } => {
            let value = kv.read(&data_source_id, &key).await?;
            stdout.write_all(&value)?;
            writeln!(stdout)?;
        }
        Command::Keys { data_source_id } => {
            for key in kv.list_keys(&data_source_id).await? {
                writeln!(stdout, "{key}")?;
            }
        }
        Command::Observe {
            data_source_id,
            key,
        } => {
            let mut updates = match key {
                Some(key) => kv.observe_key(&data_source_id, &key).await?,
                None => kv.observe(&data_source_id).await?,
            };
            info!(path = %updates.path(), "Observing, press Ctrl+C to stop");

            let shutdown = signal::shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    name = &mut shutdown => {
                        info!(signal = name, "Stopping observation");
                        updates.close();
                        break;
                    }
                    item = updates.next() => match item {
                        Some(Ok(event)) => println!("{}", event_json(&event)),
                        Some(Err(e)) => warn!(error = %e, "Skipping malformed update"),
                        None => {
                            info!("Store closed the observation");
                            break;
                        }
                    },
                }
            }
        }
        Command::Wait {
            attempts,
            interval_secs,
        } => {
            kv.wait_until_ready(attempts, Duration::from_secs(interval_secs))
                .await?;
            info!("Store is ready");
        }
    }

    Ok(())
}

fn event_json(event: &UpdateEvent) -> serde_json::Value {
    serde_json::json!({
        "timestampMS": event.timestamp_ms,
        "dataSourceID": event.data_source_id,
        "key": event.key,
        "data": String::from_utf8_lossy(&event.data),
    })
}
