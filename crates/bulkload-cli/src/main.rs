//! Bulkload CLI
//!
//! Runs one import of a JSON records file into a database and prints the
//! per-row result.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ImportCommand, InitDbCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BULKLOAD_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "BULKLOAD_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a records file
    Import(ImportCommand),
    /// Create the import tables
    InitDb(InitDbCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins when set; otherwise our crates at the requested level
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) if std::env::var("RUST_LOG").is_ok() => filter,
        _ => tracing_subscriber::EnvFilter::new(format!(
            "bulkload={level},\
             bulkload_cli={level},\
             bulkload_import={level},\
             bulkload_types={level},\
             sqlx=warn,\
             sea_orm=warn",
            level = cli.log_level
        )),
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Import(import_cmd) => import_cmd.execute(),
        Commands::InitDb(init_cmd) => init_cmd.execute(),
    }
}
