use super::engine::WalletEngine;
use crate::domain::customer::Customer;
use crate::domain::payment_method::{PaymentMethodRef, Token};
use crate::domain::subscription::{Subscription, SubscriptionRequest, TrialEnd};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

impl WalletEngine {
    /// Begins building a subscription named `name` on `plan` for the customer.
    pub fn new_subscription<'a>(
        &'a self,
        customer: &'a mut Customer,
        name: impl Into<String>,
        plan: impl Into<String>,
    ) -> SubscriptionBuilder<'a> {
        SubscriptionBuilder {
            engine: self,
            customer,
            name: name.into(),
            plan: plan.into(),
            quantity: 1,
            trial_days: None,
            trial_until: None,
            skip_trial: false,
            use_card: None,
            token: None,
        }
    }
}

/// Accumulates the options of a new subscription; `create` submits it.
pub struct SubscriptionBuilder<'a> {
    engine: &'a WalletEngine,
    customer: &'a mut Customer,
    name: String,
    plan: String,
    quantity: u32,
    trial_days: Option<u32>,
    trial_until: Option<DateTime<Utc>>,
    skip_trial: bool,
    use_card: Option<PaymentMethodRef>,
    token: Option<Token>,
}

impl SubscriptionBuilder<'_> {
    pub fn quantity(&mut self, quantity: u32) -> &mut Self {
        self.quantity = quantity;
        self
    }

    /// Trial lasting `days` from the moment `create` is called.
    pub fn trial_days(&mut self, days: u32) -> &mut Self {
        self.trial_days = Some(days);
        self.trial_until = None;
        self
    }

    pub fn trial_until(&mut self, until: DateTime<Utc>) -> &mut Self {
        self.trial_until = Some(until);
        self.trial_days = None;
        self
    }

    /// Ends any trial immediately, including one the plan would grant.
    pub fn skip_trial(&mut self) -> &mut Self {
        self.skip_trial = true;
        self
    }

    /// Bills the subscription to `method`.
    ///
    /// **This permanently promotes `method` to the customer's default card.**
    /// The promotion happens before the subscription is submitted and is not
    /// rolled back afterwards, even if the submission fails.
    pub fn use_card(&mut self, method: impl Into<PaymentMethodRef>) -> &mut Self {
        self.use_card = Some(method.into());
        self
    }

    /// A card token to use when the customer has no card yet. For a customer
    /// that already has a remote id the card is attached and made default.
    pub fn with_token(&mut self, token: Token) -> &mut Self {
        self.token = Some(token);
        self
    }

    /// Creates the subscription remotely, then records it locally.
    ///
    /// Nothing is recorded unless the processor accepted the subscription.
    pub async fn create(&mut self) -> Result<Subscription> {
        if self.plan.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Subscription plan must not be empty".to_string(),
            ));
        }
        if self.quantity == 0 {
            return Err(PaymentError::ValidationError(
                "Subscription quantity must be at least 1".to_string(),
            ));
        }
        let trial_expires = self.trial_expires()?;

        let engine = self.engine;
        let existing = self.customer.stripe_id().map(str::to_string);
        let stripe_id = match (existing, self.token.take()) {
            (Some(stripe_id), Some(token)) => {
                let method = engine.attach(self.customer, token).await?;
                engine.promote(self.customer, &method).await?;
                stripe_id
            }
            (Some(stripe_id), None) => stripe_id,
            (None, token) => engine.ensure_remote_customer(self.customer, token).await?,
        };

        if let Some(method) = &self.use_card {
            engine.promote(self.customer, method).await?;
        }

        let trial_end = if self.skip_trial {
            Some(TrialEnd::Now)
        } else {
            trial_expires.map(TrialEnd::At)
        };
        let remote = engine
            .processor
            .create_subscription(
                &stripe_id,
                SubscriptionRequest {
                    plan: self.plan.clone(),
                    quantity: self.quantity,
                    trial_end,
                },
            )
            .await?;

        let subscription = Subscription {
            customer: self.customer.id,
            name: self.name.clone(),
            stripe_id: remote.id,
            plan: self.plan.clone(),
            quantity: self.quantity,
            trial_ends_at: if self.skip_trial {
                None
            } else {
                trial_expires
            },
            ends_at: None,
        };
        engine.subscriptions.save(&subscription).await?;
        info!(
            customer = subscription.customer,
            subscription = %subscription.stripe_id,
            plan = %subscription.plan,
            "subscription created"
        );
        Ok(subscription)
    }

    fn trial_expires(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(days) = self.trial_days else {
            return Ok(self.trial_until);
        };
        TimeDelta::try_days(i64::from(days))
            .and_then(|trial| Utc::now().checked_add_signed(trial))
            .map(Some)
            .ok_or_else(|| {
                PaymentError::ValidationError(format!("Trial of {days} days is out of range"))
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::application::engine::WalletEngine;
    use crate::domain::customer::Customer;
    use crate::domain::payment_method::Token;
    use crate::domain::ports::SubscriptionStore;
    use crate::error::PaymentError;
    use crate::infrastructure::in_memory::{InMemoryCustomerStore, InMemorySubscriptionStore};
    use crate::infrastructure::sandbox::{SandboxOp, SandboxProcessor};
    use chrono::{Duration, Utc};

    struct Fixture {
        processor: SandboxProcessor,
        subscriptions: InMemorySubscriptionStore,
        engine: WalletEngine,
    }

    fn fixture() -> Fixture {
        let processor = SandboxProcessor::new();
        let subscriptions = InMemorySubscriptionStore::new();
        let engine = WalletEngine::new(
            Box::new(processor.clone()),
            Box::new(InMemoryCustomerStore::new()),
            Box::new(subscriptions.clone()),
        );
        Fixture {
            processor,
            subscriptions,
            engine,
        }
    }

    #[tokio::test]
    async fn test_use_card_promotes_permanently() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");

        let card_a = f
            .engine
            .add_payment_method(&mut customer, Token::new("tok_ie"), false)
            .await
            .unwrap();
        let card_b = f
            .engine
            .add_payment_method(&mut customer, Token::new("tok_mx"), true)
            .await
            .unwrap();
        let default = f.engine.get_default_payment_method(&customer).await.unwrap().unwrap();
        assert_eq!(default.id, card_b);

        let subscription = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .trial_days(10)
            .use_card(card_a.clone())
            .create()
            .await
            .unwrap();
        assert_eq!(subscription.name, "main");

        let default = f.engine.get_default_payment_method(&customer).await.unwrap().unwrap();
        assert_eq!(default.id, card_a);
        assert_eq!(customer.card_last_four(), Some(default.last4.as_str()));
    }

    #[tokio::test]
    async fn test_trial_days_sets_expiry() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");

        let before = Utc::now();
        let subscription = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .trial_days(10)
            .create()
            .await
            .unwrap();

        let trial_ends = subscription.trial_ends_at.unwrap();
        assert!(trial_ends >= before + Duration::days(10));
        assert!(subscription.ends_at.is_none());
        assert_eq!(subscription.quantity, 1);
        assert!(customer.stripe_id().is_some());
    }

    #[tokio::test]
    async fn test_skip_trial_clears_expiry() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");

        let subscription = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .with_token(Token::new("tok_visa"))
            .trial_days(10)
            .skip_trial()
            .quantity(3)
            .create()
            .await
            .unwrap();

        assert!(subscription.trial_ends_at.is_none());
        assert_eq!(subscription.quantity, 3);
        assert_eq!(customer.card_last_four(), Some("4242"));
    }

    #[tokio::test]
    async fn test_token_for_existing_customer_becomes_default() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");
        f.engine
            .add_payment_method(&mut customer, Token::new("tok_visa"), false)
            .await
            .unwrap();

        f.engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .with_token(Token::new("tok_amex"))
            .create()
            .await
            .unwrap();

        assert_eq!(customer.card_brand(), Some("American Express"));
        assert_eq!(f.engine.list_payment_methods(&customer).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_remote_call_records_nothing() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");
        f.engine
            .add_payment_method(&mut customer, Token::new("tok_visa"), false)
            .await
            .unwrap();

        f.processor.fail_next(SandboxOp::CreateSubscription).await;
        let err = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .create()
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::RemoteUnavailable(_)));
        assert!(f.subscriptions.for_customer(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_card_and_no_trial_is_rejected_remotely() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");

        let err = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .create()
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::RemoteRejected { .. }));
        assert!(f.subscriptions.for_customer(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected_locally() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");

        let err = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .quantity(0)
            .create()
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::ValidationError(_)));
        assert_eq!(f.processor.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_trial_is_rejected_locally() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");

        let err = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .with_token(Token::new("tok_visa"))
            .trial_days(u32::MAX)
            .create()
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!("Trial of {} days is out of range", u32::MAX)
        );
        assert_eq!(f.processor.remote_calls(), 0);
        assert!(customer.stripe_id().is_none());
        assert!(f.subscriptions.for_customer(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_later_trial_setter_wins() {
        let f = fixture();
        let mut customer = Customer::new(1, "ada@example.com");
        let until = Utc::now() + Duration::days(3);

        let subscription = f
            .engine
            .new_subscription(&mut customer, "main", "monthly-10-1")
            .trial_days(30)
            .trial_until(until)
            .create()
            .await
            .unwrap();

        assert_eq!(subscription.trial_ends_at, Some(until));
    }
}
