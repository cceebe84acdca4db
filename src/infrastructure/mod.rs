//! Adapters for the domain ports: local stores and payment processors.

pub mod credentials;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
#[cfg(feature = "stripe-live")]
pub mod stripe;
