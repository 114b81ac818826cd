use chargeflow::application::engine::ChargeEngine;
use chargeflow::config::ChargeConfig;
use chargeflow::domain::money::Currency;
use chargeflow::domain::ports::{SharedCustomerStore, SharedLedgerStore, SharedPaymentGateway};
use chargeflow::infrastructure::in_memory::{InMemoryCustomerStore, InMemoryLedgerStore};
#[cfg(feature = "storage-rocksdb")]
use chargeflow::infrastructure::rocksdb::RocksDBStore;
use chargeflow::infrastructure::sandbox::SandboxGateway;
use chargeflow::interfaces::csv::receipt_writer::ReceiptWriter;
use chargeflow::interfaces::jsonl::command_reader::CommandReader;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands file (JSON Lines)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON configuration file (optional). Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the merchant currency.
    #[arg(long)]
    currency: Option<Currency>,

    /// Overrides the merchant location.
    #[arg(long)]
    location_id: Option<String>,
}

fn stores(db_path: Option<PathBuf>) -> Result<(SharedLedgerStore, SharedCustomerStore)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        let ledger: SharedLedgerStore = Arc::new(store.clone());
        let customers: SharedCustomerStore = Arc::new(store);
        return Ok((ledger, customers));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    let ledger: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
    let customers: SharedCustomerStore = Arc::new(InMemoryCustomerStore::new());
    Ok((ledger, customers))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ChargeConfig::from_file(path).into_diagnostic()?,
        None => ChargeConfig::default(),
    };
    if let Some(currency) = cli.currency {
        config.merchant.currency = currency;
    }
    if let Some(location_id) = cli.location_id {
        config.merchant.location_id = location_id;
    }

    let (ledger, customers) = stores(cli.db_path)?;
    let gateway: SharedPaymentGateway = Arc::new(SandboxGateway::new());
    let engine = ChargeEngine::new(ledger, customers, gateway, &config);

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (index, command) in reader.commands().enumerate() {
        let entry = index + 1;
        match command {
            Ok(command) => {
                if let Err(e) = command.execute(&engine).await {
                    tracing::error!(entry, error = %e, "Error processing command");
                }
            }
            Err(e) => {
                tracing::error!(entry, error = %e, "Error reading command");
            }
        }
    }

    let transactions = engine.into_results().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = ReceiptWriter::new(stdout.lock());
    writer.write_transactions(transactions).into_diagnostic()?;

    Ok(())
}
