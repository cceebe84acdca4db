use crate::config::WalletConfig;
use crate::domain::customer::Customer;
use crate::domain::payment_method::{CardDetails, CardInput, PaymentMethodRef};
use crate::domain::ports::{CustomerStoreBox, ProcessorBox, SubscriptionStoreBox};
use crate::domain::subscription::Subscription;
use crate::error::{PaymentError, Result};
use tracing::error;

/// Keeps a customer's local record in step with the payment processor.
///
/// `WalletEngine` owns the processor and the local stores. Every operation
/// takes the customer handle explicitly; operations that change remote state
/// persist the handle before returning, so the local mirror is never stale
/// for longer than one call.
///
/// Two operations on the same customer running in different processes are
/// not serialized here: the last remote write wins and the mirror reflects
/// whichever read-back ran last.
pub struct WalletEngine {
    pub(super) processor: ProcessorBox,
    pub(super) customers: CustomerStoreBox,
    pub(super) subscriptions: SubscriptionStoreBox,
    pub(super) config: WalletConfig,
}

impl WalletEngine {
    /// Creates a new `WalletEngine` with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `processor` - The remote payment processor.
    /// * `customers` - Local customer persistence.
    /// * `subscriptions` - Local subscription persistence.
    pub fn new(
        processor: ProcessorBox,
        customers: CustomerStoreBox,
        subscriptions: SubscriptionStoreBox,
    ) -> Self {
        Self {
            processor,
            customers,
            subscriptions,
            config: WalletConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WalletConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Loads a customer, or starts a fresh unsaved record when none exists.
    pub async fn customer(&self, id: u32, email: &str) -> Result<Customer> {
        Ok(self
            .customers
            .load(id)
            .await?
            .unwrap_or_else(|| Customer::new(id, email)))
    }

    pub async fn save_customer(&self, customer: &Customer) -> Result<()> {
        self.customers.save(customer).await?;
        Ok(())
    }

    /// Final state of every persisted customer.
    pub async fn customers(&self) -> Result<Vec<Customer>> {
        Ok(self.customers.all().await?)
    }

    pub async fn subscriptions_for(&self, customer: &Customer) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.for_customer(customer.id).await?)
    }

    /// Returns the customer's processor id, creating the remote customer if needed.
    pub async fn stripe_id(&self, customer: &mut Customer) -> Result<String> {
        self.ensure_remote_customer(customer, None).await
    }

    /// Adds a card from a token or raw card fields.
    ///
    /// The first card of a customer becomes its default. For later cards
    /// `set_default` promotes the new card.
    pub async fn add_payment_method(
        &self,
        customer: &mut Customer,
        input: impl Into<CardInput>,
        set_default: bool,
    ) -> Result<PaymentMethodRef> {
        let token = match input.into() {
            CardInput::Token(token) => token,
            CardInput::Raw(card) => self.create_token(&card).await?,
        };

        let first_card = customer.stripe_id().is_none();
        let method = self.attach(customer, token).await?;
        if set_default && !first_card {
            self.promote(customer, &method).await?;
        }
        Ok(method)
    }

    pub async fn remove_payment_method(
        &self,
        customer: &mut Customer,
        method: &PaymentMethodRef,
    ) -> Result<PaymentMethodRef> {
        self.remove(customer, method).await
    }

    pub async fn list_payment_methods(&self, customer: &Customer) -> Result<Vec<CardDetails>> {
        self.list_all(customer).await
    }

    pub async fn get_payment_method(
        &self,
        customer: &Customer,
        method: &PaymentMethodRef,
    ) -> Result<Option<CardDetails>> {
        self.fetch(customer, method).await
    }

    pub async fn get_default_payment_method(
        &self,
        customer: &Customer,
    ) -> Result<Option<CardDetails>> {
        self.current_default(customer).await
    }

    pub async fn promote_default_payment_method(
        &self,
        customer: &mut Customer,
        method: &PaymentMethodRef,
    ) -> Result<CardDetails> {
        self.promote(customer, method).await
    }
}

/// Builds an `InconsistentState` error and reports it; these are never expected.
pub(super) fn inconsistent(message: String) -> PaymentError {
    error!(%message, "payment profile out of sync with processor");
    PaymentError::InconsistentState(message)
}
