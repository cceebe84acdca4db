use cardwallet::application::engine::WalletEngine;
use cardwallet::config::WalletConfig;
use cardwallet::domain::charge::Currency;
use cardwallet::domain::ports::{CustomerStoreBox, ProcessorBox, SubscriptionStoreBox};
use cardwallet::infrastructure::credentials::StaticCredentials;
use cardwallet::infrastructure::in_memory::{InMemoryCustomerStore, InMemorySubscriptionStore};
use cardwallet::infrastructure::sandbox::SandboxProcessor;
use cardwallet::interfaces::csv::customer_writer::CustomerWriter;
use cardwallet::interfaces::csv::operation_reader::OperationReader;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProcessorKind {
    /// In-process processor that understands the test tokens.
    Sandbox,
    /// The live Stripe API (requires the `stripe-live` feature).
    Stripe,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Payment processor to talk to.
    #[arg(long, value_enum, default_value_t = ProcessorKind::Sandbox)]
    processor: ProcessorKind,

    /// Currency for charges that name none.
    #[arg(long, env = "WALLET_CURRENCY", default_value = "usd")]
    currency: String,

    /// Secret API key for the processor.
    #[arg(long, env = "STRIPE_SECRET", hide_env_values = true)]
    api_key: Option<String>,
}

#[cfg(feature = "storage-rocksdb")]
fn stores(db_path: Option<PathBuf>) -> Result<(CustomerStoreBox, SubscriptionStoreBox)> {
    use cardwallet::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(db_path) => {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            Ok((Box::new(store.clone()), Box::new(store)))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn stores(db_path: Option<PathBuf>) -> Result<(CustomerStoreBox, SubscriptionStoreBox)> {
    if db_path.is_some() {
        warn!("built without the 'storage-rocksdb' feature; --db-path ignored, using memory");
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (CustomerStoreBox, SubscriptionStoreBox) {
    (
        Box::new(InMemoryCustomerStore::new()),
        Box::new(InMemorySubscriptionStore::new()),
    )
}

fn processor(
    kind: ProcessorKind,
    api_key: Option<String>,
    config: &WalletConfig,
) -> Result<ProcessorBox> {
    match kind {
        ProcessorKind::Sandbox => Ok(match api_key {
            Some(key) => Box::new(SandboxProcessor::with_credentials(
                StaticCredentials::new(key),
            )),
            None => Box::new(SandboxProcessor::new()),
        }),
        #[cfg(feature = "stripe-live")]
        ProcessorKind::Stripe => {
            use cardwallet::domain::ports::CredentialsBox;
            use cardwallet::infrastructure::credentials::EnvCredentials;
            use cardwallet::infrastructure::stripe::StripeProcessor;

            let credentials: CredentialsBox = match api_key {
                Some(key) => Box::new(StaticCredentials::new(key)),
                None => Box::new(EnvCredentials::default()),
            };
            let stripe = StripeProcessor::new(credentials, config).into_diagnostic()?;
            Ok(Box::new(stripe))
        }
        #[cfg(not(feature = "stripe-live"))]
        ProcessorKind::Stripe => {
            let _ = (api_key, config);
            Err(miette::miette!(
                "the stripe processor requires building with the 'stripe-live' feature"
            ))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = WalletConfig::default().with_currency(Currency::new(&cli.currency));

    let (customers, subscriptions) = stores(cli.db_path)?;
    let processor = processor(cli.processor, cli.api_key, &config)?;
    let engine = WalletEngine::new(processor, customers, subscriptions).with_config(config);

    // Process operations; a failed row never stops the batch
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for (row, result) in reader.operations().enumerate() {
        let operation = match result {
            Ok(operation) => operation,
            Err(e) => {
                warn!(row, error = %e, "skipping unreadable operation");
                continue;
            }
        };
        let customer = operation.customer;
        if let Err(e) = engine.process_operation(operation).await {
            if e.is_fatal() {
                error!(row, customer, status = ?e.status(), error = %e, "operation failed");
            } else {
                warn!(row, customer, status = ?e.status(), error = %e, "operation failed");
            }
        }
    }

    // Output final state
    let customers = engine.customers().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = CustomerWriter::new(stdout.lock());
    writer.write_customers(customers).into_diagnostic()?;

    Ok(())
}
