use super::charge::{ChargeReceipt, ChargeRequest};
use super::customer::Customer;
use super::payment_method::{CardDetails, PaymentMethodRef, RawCard, Token};
use super::subscription::{RemoteSubscription, Subscription, SubscriptionRequest};
use crate::error::{PersistError, Result};
use async_trait::async_trait;

/// The processor's view of a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCustomer {
    pub id: String,
    pub email: Option<String>,
    pub default_source: Option<PaymentMethodRef>,
    pub sources: Vec<CardDetails>,
}

impl RemoteCustomer {
    pub fn source(&self, id: &PaymentMethodRef) -> Option<&CardDetails> {
        self.sources.iter().find(|card| &card.id == id)
    }

    pub fn default_card(&self) -> Option<&CardDetails> {
        self.default_source.as_ref().and_then(|id| self.source(id))
    }
}

#[derive(Debug)]
pub struct NewCustomer {
    pub email: String,
    /// Seeds the customer with its first source, which becomes the default.
    pub source: Option<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerUpdate {
    pub default_source: PaymentMethodRef,
}

/// The remote payment processor.
///
/// Implementations convert every transport or protocol failure into
/// `RemoteRejected` or `RemoteUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_token(&self, card: &RawCard) -> Result<Token>;
    async fn create_customer(&self, request: NewCustomer) -> Result<RemoteCustomer>;
    async fn fetch_customer(&self, customer_id: &str) -> Result<RemoteCustomer>;
    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<RemoteCustomer>;
    async fn create_payment_method(&self, customer_id: &str, token: Token) -> Result<CardDetails>;
    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<CardDetails>>;
    async fn delete_payment_method(
        &self,
        customer_id: &str,
        method: &PaymentMethodRef,
    ) -> Result<PaymentMethodRef>;
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeReceipt>;
    async fn create_subscription(
        &self,
        customer_id: &str,
        request: SubscriptionRequest,
    ) -> Result<RemoteSubscription>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn load(&self, id: u32) -> Result<Option<Customer>, PersistError>;
    async fn save(&self, customer: &Customer) -> Result<(), PersistError>;
    async fn all(&self) -> Result<Vec<Customer>, PersistError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn save(&self, subscription: &Subscription) -> Result<(), PersistError>;
    async fn for_customer(&self, customer: u32) -> Result<Vec<Subscription>, PersistError>;
}

/// Where processor adapters obtain their secret API key.
pub trait CredentialSource: Send + Sync {
    fn secret_key(&self) -> Result<String>;
}

pub type ProcessorBox = Box<dyn PaymentProcessor>;
pub type CustomerStoreBox = Box<dyn CustomerStore>;
pub type SubscriptionStoreBox = Box<dyn SubscriptionStore>;
pub type CredentialsBox = Box<dyn CredentialSource>;
