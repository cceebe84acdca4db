//! Application layer: the payment profile engine.
//!
//! `WalletEngine` is the entry point. Its operations are split by concern
//! across the submodules (tokenization, card storage, default card
//! coordination, charges, subscriptions, batch rows), all working on one
//! engine and one set of injected ports.

mod batch;
mod charges;
mod defaults;
pub mod engine;
mod methods;
pub mod subscriptions;
mod tokens;
