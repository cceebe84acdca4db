use crate::domain::customer::Customer;
use crate::domain::ports::{CustomerStore, SubscriptionStore};
use crate::domain::subscription::Subscription;
use crate::error::PersistError;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family for local customer records.
pub const CF_CUSTOMERS: &str = "customers";
/// Column Family for subscriptions, one JSON list per customer.
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";

/// A persistent store implementation using RocksDB.
///
/// Customers and subscriptions live in separate Column Families, both keyed
/// by the big-endian customer id so iteration yields customers in id order.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// the column families on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_customers = ColumnFamilyDescriptor::new(CF_CUSTOMERS, Options::default());
        let cf_subscriptions = ColumnFamilyDescriptor::new(CF_SUBSCRIPTIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_customers, cf_subscriptions])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, PersistError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PersistError::Backend(format!("column family '{name}' not found")))
    }
}

#[async_trait]
impl CustomerStore for RocksDBStore {
    async fn load(&self, id: u32) -> Result<Option<Customer>, PersistError> {
        let cf = self.cf(CF_CUSTOMERS)?;
        match self.db.get_cf(&cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, customer: &Customer) -> Result<(), PersistError> {
        let cf = self.cf(CF_CUSTOMERS)?;
        let value = serde_json::to_vec(customer)?;
        self.db.put_cf(&cf, customer.id.to_be_bytes(), value)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Customer>, PersistError> {
        let cf = self.cf(CF_CUSTOMERS)?;
        let mut customers = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            customers.push(serde_json::from_slice(&value)?);
        }
        Ok(customers)
    }
}

#[async_trait]
impl SubscriptionStore for RocksDBStore {
    async fn save(&self, subscription: &Subscription) -> Result<(), PersistError> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        let key = subscription.customer.to_be_bytes();
        let mut owned: Vec<Subscription> = match self.db.get_cf(&cf, key)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        match owned
            .iter_mut()
            .find(|s| s.stripe_id == subscription.stripe_id)
        {
            Some(existing) => *existing = subscription.clone(),
            None => owned.push(subscription.clone()),
        }
        self.db.put_cf(&cf, key, serde_json::to_vec(&owned)?)?;
        Ok(())
    }

    async fn for_customer(&self, customer: u32) -> Result<Vec<Subscription>, PersistError> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        match self.db.get_cf(&cf, customer.to_be_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}
