//! dawnkv CLI
//!
//! Command-line interface for inspecting and editing a dawnkv file.
//! Keys and values are UTF-8 strings.

use clap::{Parser, Subcommand};
use dawnkv::{CompactionOutcome, Config, Engine, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// dawnkv CLI
#[derive(Parser, Debug)]
#[command(name = "dawnkv-cli")]
#[command(about = "CLI for dawnkv database files")]
#[command(version)]
struct Args {
    /// Database file
    #[arg(short, long, default_value = "./dawnkv.db")]
    path: String,

    /// Skip fsync on flush
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// Rewrite the log with only live entries
    Compact {
        /// Compact even if little of the log is stale
        #[arg(short, long)]
        force: bool,
    },

    /// Remove every key
    Clear,

    /// Print key, record and byte counts
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,dawnkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> dawnkv::Result<()> {
    let sync_strategy = if args.no_sync {
        SyncStrategy::OsBuffered
    } else {
        SyncStrategy::EveryFlush
    };
    let config = Config::builder().sync_strategy(sync_strategy).build();

    let db: Engine<String, String> = Engine::builder(&args.path).config(config).open()?;

    match args.command {
        Commands::Get { key } => match db.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            db.set_flush(&key, value)?;
            println!("OK");
        }
        Commands::Delete { key } => match db.delete_flush(&key)? {
            Some(_) => println!("1"),
            None => println!("0"),
        },
        Commands::Compact { force } => match db.compact(force)? {
            CompactionOutcome::Skipped { records, live } => {
                println!("skipped: {} records, {} live", records, live);
            }
            CompactionOutcome::Compacted {
                records_before,
                records_after,
                bytes_before,
                bytes_after,
            } => {
                println!(
                    "compacted: {} -> {} records, {} -> {} bytes",
                    records_before, records_after, bytes_before, bytes_after
                );
            }
        },
        Commands::Clear => {
            db.clear()?;
            println!("OK");
        }
        Commands::Stats => {
            println!("path:    {}", db.path().display());
            println!("keys:    {}", db.len());
            println!("records: {}", db.logsize()?);
            println!("bytes:   {}", db.bytesize()?);
        }
    }

    db.close()
}
