//! filekv CLI
//!
//! Inspect and edit a filekv data directory holding JSON records.

use std::process;

use clap::{Parser, Subcommand};
use filekv::{CancellationToken, Config, Document, FileStore, JsonCodec, SyncPolicy};
use tracing_subscriber::{fmt, EnvFilter};

/// filekv CLI
#[derive(Parser, Debug)]
#[command(name = "filekv-cli")]
#[command(about = "Read and write records in a filekv data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./filekv_data")]
    data_dir: String,

    /// fsync every record write
    #[arg(long)]
    sync: bool,

    /// Pretty-print stored JSON
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the record stored under a key
    Get {
        /// The key to get
        key: String,
    },

    /// Store a JSON object under a key
    Put {
        /// The key to set
        key: String,

        /// JSON object to store
        value: String,

        /// Expected ETag ("*" forces the write)
        #[arg(long)]
        etag: Option<String>,
    },

    /// Delete one or more keys
    Delete {
        /// Keys to delete
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List record files
    List,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,filekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(if e.is_conflict() { 2 } else { 1 });
    }
}

fn run(args: Args) -> filekv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .sync_policy(if args.sync {
            SyncPolicy::EveryWrite
        } else {
            SyncPolicy::None
        })
        .pretty_json(args.pretty)
        .worker_threads(1)
        .build();

    let store: FileStore<JsonCodec<Document>> = FileStore::open_json(config)?;
    let cancel = CancellationToken::new();

    match args.command {
        Commands::Get { key } => {
            let mut found = store.read_blocking([key.as_str()], &cancel)?;
            match found.remove(&key) {
                Some(doc) => {
                    let rendered = serde_json::to_string_pretty(&doc)
                        .map_err(filekv::FileKvError::serialization)?;
                    println!("eTag: {}", doc.e_tag.as_deref().unwrap_or("-"));
                    println!("{}", rendered);
                }
                None => println!("(not found)"),
            }
        }
        Commands::Put { key, value, etag } => {
            let parsed: serde_json::Value =
                serde_json::from_str(&value).map_err(filekv::FileKvError::serialization)?;
            let mut doc = Document::from_value(parsed).ok_or_else(|| {
                filekv::FileKvError::Serialization("value must be a JSON object".to_string())
            })?;
            doc.e_tag = etag;

            store.write_blocking([(key.clone(), doc)], &cancel)?;
            tracing::info!(key = %key, path = %store.path_for(&key)?.display(), "Stored");
        }
        Commands::Delete { keys } => {
            store.delete_blocking(keys, &cancel)?;
        }
        Commands::List => {
            for name in store.keys()? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
