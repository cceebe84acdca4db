use crate::domain::customer::Customer;
use crate::domain::ports::{CustomerStore, SubscriptionStore};
use crate::domain::subscription::Subscription;
use crate::error::PersistError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for customers.
///
/// Clones share the same map, so a test can keep a handle for inspection
/// while the engine owns another.
#[derive(Default, Clone)]
pub struct InMemoryCustomerStore {
    customers: Arc<RwLock<HashMap<u32, Customer>>>,
}

impl InMemoryCustomerStore {
    /// Creates a new, empty in-memory customer store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn load(&self, id: u32) -> Result<Option<Customer>, PersistError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&id).cloned())
    }

    async fn save(&self, customer: &Customer) -> Result<(), PersistError> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Customer>, PersistError> {
        let customers = self.customers.read().await;
        let mut all: Vec<Customer> = customers.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }
}

/// A thread-safe in-memory store for subscriptions, grouped by customer.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    subscriptions: Arc<RwLock<HashMap<u32, Vec<Subscription>>>>,
}

impl InMemorySubscriptionStore {
    /// Creates a new, empty in-memory subscription store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn save(&self, subscription: &Subscription) -> Result<(), PersistError> {
        let mut subscriptions = self.subscriptions.write().await;
        let owned = subscriptions.entry(subscription.customer).or_default();
        match owned
            .iter_mut()
            .find(|s| s.stripe_id == subscription.stripe_id)
        {
            Some(existing) => *existing = subscription.clone(),
            None => owned.push(subscription.clone()),
        }
        Ok(())
    }

    async fn for_customer(&self, customer: u32) -> Result<Vec<Subscription>, PersistError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(&customer).cloned().unwrap_or_default())
    }
}
