#![allow(dead_code)]

use cardwallet::application::engine::WalletEngine;
use cardwallet::config::WalletConfig;
use cardwallet::infrastructure::in_memory::{InMemoryCustomerStore, InMemorySubscriptionStore};
use cardwallet::infrastructure::sandbox::SandboxProcessor;
use predicates::str::RegexPredicate;
use std::io::Write;
use tempfile::NamedTempFile;

pub const OPERATIONS_HEADER: &str = "op, customer, email, token, card, amount, plan, trial_days";

/// An engine wired to a sandbox processor and in-memory stores, with
/// handles kept for inspection.
pub struct Wallet {
    pub engine: WalletEngine,
    pub sandbox: SandboxProcessor,
    pub customers: InMemoryCustomerStore,
    pub subscriptions: InMemorySubscriptionStore,
}

pub fn wallet() -> Wallet {
    wallet_with_config(WalletConfig::default())
}

pub fn wallet_with_config(config: WalletConfig) -> Wallet {
    let sandbox = SandboxProcessor::new();
    let customers = InMemoryCustomerStore::new();
    let subscriptions = InMemorySubscriptionStore::new();
    let engine = WalletEngine::new(
        Box::new(sandbox.clone()),
        Box::new(customers.clone()),
        Box::new(subscriptions.clone()),
    )
    .with_config(config);

    Wallet {
        engine,
        sandbox,
        customers,
        subscriptions,
    }
}

/// Writes an operations CSV with the standard header followed by `rows`.
pub fn operations_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{OPERATIONS_HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}

/// Matches the output row of `customer` whatever remote id the sandbox
/// minted. `card` is the `brand,last_four` tail, or `","` for no card.
pub fn customer_row(customer: u32, email: &str, card: &str) -> RegexPredicate {
    let email = email.replace('.', r"\.");
    predicates::str::is_match(format!(
        r"(?m)^{customer},{email},cus_[0-9a-f]{{32}},{card}$"
    ))
    .unwrap()
}

/// The `stripe_id` column of `customer`'s row in the CLI output.
pub fn stripe_id_of(stdout: &str, customer: u32) -> Option<String> {
    let prefix = format!("{customer},");
    stdout
        .lines()
        .find(|line| line.starts_with(&prefix))
        .and_then(|line| line.split(',').nth(2))
        .map(str::to_string)
}
