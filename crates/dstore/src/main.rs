mod config;
mod registry;

use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use dstore_core::{DatastoreError, Key};
use dstore_mount::MountDatastore;
use dstore_query::{Order, Query};
use dstore_storage::{Capability, Datastore, PersistentDatastore};
use futures_util::StreamExt;
use registry::BackendRegistry;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

const DEFAULT_DATA_FILE: &str = "./dstore.redb";

#[derive(Parser)]
#[command(name = "dstore", about = "Key-value datastore assembled from mounted backends")]
struct Cli {
    /// Mount table (YAML, or JSON with a .json extension)
    #[arg(long, global = true, env = "DSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Redb file mounted at / when no mount table is given
    #[arg(long, global = true, default_value = DEFAULT_DATA_FILE)]
    data_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored at a key
    Get { key: String },
    /// Store a value at a key
    Put { key: String, value: String },
    /// Remove a key
    Delete { key: String },
    /// List entries under a prefix
    Query {
        #[arg(long, default_value = "/")]
        prefix: String,
        /// Criteria applied in the order given
        #[arg(long, value_enum)]
        order: Vec<OrderArg>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// 0 means no limit
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long)]
        keys_only: bool,
        /// One JSON object per entry
        #[arg(long)]
        json: bool,
    },
    /// Show the optional contracts each mount provides
    Capabilities {
        #[arg(long)]
        json: bool,
    },
    /// Total disk usage of the persistent mounts, in bytes
    Du,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Key,
    KeyDesc,
    Value,
    ValueDesc,
}

impl From<OrderArg> for Order {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Key => Order::ByKey,
            OrderArg::KeyDesc => Order::ByKeyDescending,
            OrderArg::Value => Order::ByValue,
            OrderArg::ValueDesc => Order::ByValueDescending,
        }
    }
}

#[derive(Serialize)]
struct MountReport {
    prefix: String,
    capabilities: Vec<Capability>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::single_file(&cli.data_file),
    };
    let datastore = config.build(&BackendRegistry::with_defaults())?;

    let outcome = run(&datastore, cli.command).await;
    if let Err(e) = datastore.close() {
        error!("Failed to close datastore: {}", e);
    }
    outcome
}

async fn run(datastore: &MountDatastore, command: Commands) -> miette::Result<()> {
    match command {
        Commands::Get { key } => {
            let value = datastore.get(&Key::new(key))?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Put { key, value } => {
            let key = Key::new(key);
            datastore.put(&key, Bytes::from(value))?;
            info!("Stored {}", key);
        }
        Commands::Delete { key } => {
            let key = Key::new(key);
            datastore.delete(&key)?;
            info!("Deleted {}", key);
        }
        Commands::Query {
            prefix,
            order,
            offset,
            limit,
            keys_only,
            json,
        } => {
            let mut query = Query::new()
                .with_prefix(Key::new(prefix))
                .with_offset(offset)
                .with_limit(limit);
            query.orders = order.into_iter().map(Order::from).collect();
            if keys_only {
                query = query.keys_only();
            }
            run_query(datastore, query, json).await?;
        }
        Commands::Capabilities { json } => {
            let reports: Vec<MountReport> = datastore
                .mounts()
                .iter()
                .map(|m| MountReport {
                    prefix: m.prefix.to_string(),
                    capabilities: m.capabilities().iter().collect(),
                })
                .collect();
            if json {
                println!("{}", dstore_core::to_json_pretty(&reports)?);
            } else {
                for mount in datastore.mounts() {
                    println!("{}\t{}", mount.prefix, mount.capabilities());
                }
            }
        }
        Commands::Du => {
            println!("{}", datastore.disk_usage()?);
        }
    }
    Ok(())
}

/// Print query results as they arrive from the push stream
async fn run_query(datastore: &MountDatastore, query: Query, json: bool) -> miette::Result<()> {
    info!("Running {}", query);
    // opening may pull from child producers, which must not block a runtime worker
    let opener = datastore.clone();
    let results = tokio::task::spawn_blocking(move || opener.query(query))
        .await
        .map_err(|e| miette::miette!("Query task failed: {}", e))??;
    let mut stream = results.into_stream();

    while let Some(item) = stream.next().await {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                stream.close().await?;
                return Err(e.into());
            }
        };
        if json {
            println!("{}", serde_json::to_string(&entry).map_err(DatastoreError::from)?);
        } else {
            match &entry.value {
                Some(value) => println!("{}\t{}", entry.key, String::from_utf8_lossy(value)),
                None => println!("{}", entry.key),
            }
        }
    }
    stream.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_default_redb_mount() {
        let dir = tempfile::tempdir().unwrap();
        let datastore = Config::single_file(dir.path().join("dstore.redb"))
            .build(&BackendRegistry::with_defaults())
            .unwrap();
        datastore.put(&Key::new("/a"), Bytes::from("x")).unwrap();
        datastore.put(&Key::new("/b/c"), Bytes::from("y")).unwrap();

        run_query(&datastore, Query::new().order(Order::ByKey), false)
            .await
            .unwrap();
        run_query(&datastore, Query::new().with_prefix("/b"), true)
            .await
            .unwrap();
        datastore.close().unwrap();
    }
}
