use super::engine::{WalletEngine, inconsistent};
use crate::domain::customer::Customer;
use crate::domain::payment_method::{CardDetails, PaymentMethodRef, Token};
use crate::domain::ports::NewCustomer;
use crate::error::{PaymentError, Result};
use tracing::{info, warn};

impl WalletEngine {
    /// Returns the customer's remote id, creating the remote customer at most once.
    ///
    /// When `initial_token` is given and a remote customer has to be created,
    /// the token seeds its first card, which the processor makes the default;
    /// the mirror is then read back from the processor. An existing remote id
    /// is returned without any remote call and the token is dropped unused.
    pub async fn ensure_remote_customer(
        &self,
        customer: &mut Customer,
        initial_token: Option<Token>,
    ) -> Result<String> {
        if let Some(stripe_id) = customer.stripe_id() {
            return Ok(stripe_id.to_string());
        }
        let (stripe_id, _) = self.create_remote_customer(customer, initial_token).await?;
        Ok(stripe_id)
    }

    /// Creates the remote customer and returns its id plus the seeded default card.
    async fn create_remote_customer(
        &self,
        customer: &mut Customer,
        initial_token: Option<Token>,
    ) -> Result<(String, Option<CardDetails>)> {
        let seeded = initial_token.is_some();
        let remote = self
            .processor
            .create_customer(NewCustomer {
                email: customer.email.clone(),
                source: initial_token,
            })
            .await?;

        // The link is saved before any further remote call.
        customer.set_stripe_id(remote.id.clone());
        self.customers.save(customer).await?;
        info!(customer = customer.id, stripe_id = %remote.id, seeded, "remote customer created");

        if !seeded {
            return Ok((remote.id, None));
        }

        let card = self.current_default(customer).await?.ok_or_else(|| {
            inconsistent(format!(
                "customer {} was created with a card but has no default source",
                remote.id
            ))
        })?;
        if customer.mirror_default(Some(&card)) {
            self.customers.save(customer).await?;
        }
        Ok((remote.id, Some(card)))
    }

    /// Attaches a tokenized card to the customer.
    ///
    /// A customer without a remote id is created with the token as its first
    /// card in a single call. Otherwise the card is attached and the default
    /// stays as it was.
    pub async fn attach(&self, customer: &mut Customer, token: Token) -> Result<PaymentMethodRef> {
        let Some(stripe_id) = customer.stripe_id().map(str::to_string) else {
            let (stripe_id, card) = self.create_remote_customer(customer, Some(token)).await?;
            return card.map(|c| c.id).ok_or_else(|| {
                inconsistent(format!("customer {stripe_id} has no card after seeding"))
            });
        };

        let card = self
            .processor
            .create_payment_method(&stripe_id, token)
            .await?;
        info!(customer = customer.id, method = %card.id, "card attached");

        // The processor defaults the first card of a customer that has none.
        if customer.card_last_four().is_none() {
            self.refresh_default_mirror(customer).await?;
        }
        Ok(card.id)
    }

    /// Lists the customer's cards; empty when there is no remote customer yet.
    pub async fn list_all(&self, customer: &Customer) -> Result<Vec<CardDetails>> {
        match customer.stripe_id() {
            Some(stripe_id) => self.processor.list_payment_methods(stripe_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Finds one of the customer's cards. Unknown ids are `None`, not errors.
    pub async fn fetch(
        &self,
        customer: &Customer,
        method: &PaymentMethodRef,
    ) -> Result<Option<CardDetails>> {
        let Some(stripe_id) = customer.stripe_id() else {
            return Ok(None);
        };
        let remote = self.processor.fetch_customer(stripe_id).await?;
        Ok(remote.source(method).cloned())
    }

    /// Deletes a card from the customer.
    ///
    /// Deleting the default card lets the processor pick a new default (or
    /// none), so the mirror is re-read afterwards. Once the delete succeeds
    /// the removal is reported even if that re-read fails; the mirror then
    /// catches up on the next read-back.
    pub async fn remove(
        &self,
        customer: &mut Customer,
        method: &PaymentMethodRef,
    ) -> Result<PaymentMethodRef> {
        let stripe_id = customer
            .stripe_id()
            .ok_or(PaymentError::NoStripeId)?
            .to_string();

        let removed = self
            .processor
            .delete_payment_method(&stripe_id, method)
            .await?;
        info!(customer = customer.id, method = %removed, "card removed");

        if let Err(e) = self.refresh_default_mirror(customer).await {
            warn!(
                customer = customer.id,
                method = %removed,
                error = %e,
                "default card mirror not refreshed after removal"
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::application::engine::WalletEngine;
    use crate::domain::customer::Customer;
    use crate::domain::payment_method::{PaymentMethodRef, RawCard, Token};
    use crate::error::PaymentError;
    use crate::infrastructure::in_memory::{InMemoryCustomerStore, InMemorySubscriptionStore};
    use crate::infrastructure::sandbox::{SandboxOp, SandboxProcessor};

    fn engine_with(processor: &SandboxProcessor, customers: &InMemoryCustomerStore) -> WalletEngine {
        WalletEngine::new(
            Box::new(processor.clone()),
            Box::new(customers.clone()),
            Box::new(InMemorySubscriptionStore::new()),
        )
    }

    #[tokio::test]
    async fn test_ensure_remote_customer_is_idempotent() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        let first = engine.ensure_remote_customer(&mut customer, None).await.unwrap();
        let calls = processor.remote_calls();
        let second = engine.ensure_remote_customer(&mut customer, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(processor.remote_calls(), calls);
        assert_eq!(processor.customer_count().await, 1);
    }

    #[tokio::test]
    async fn test_new_remote_id_is_persisted() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        let stripe_id = engine.stripe_id(&mut customer).await.unwrap();

        let stored = engine.customer(1, "ignored@example.com").await.unwrap();
        assert_eq!(stored.stripe_id(), Some(stripe_id.as_str()));
    }

    #[tokio::test]
    async fn test_seeded_customer_mirrors_default_card() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        engine
            .ensure_remote_customer(&mut customer, Some(Token::new("tok_visa")))
            .await
            .unwrap();

        assert_eq!(customer.card_brand(), Some("Visa"));
        assert_eq!(customer.card_last_four(), Some("4242"));
    }

    #[tokio::test]
    async fn test_link_survives_failed_read_back() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        processor.fail_next(SandboxOp::FetchCustomer).await;
        let err = engine
            .attach(&mut customer, Token::new("tok_visa"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::RemoteUnavailable(_)));

        // The remote customer exists and the link was saved, so a retry
        // must not create another one.
        let stored = engine.customer(1, "ada@example.com").await.unwrap();
        assert!(stored.stripe_id().is_some());
        engine.stripe_id(&mut customer).await.unwrap();
        assert_eq!(processor.customer_count().await, 1);
    }

    #[tokio::test]
    async fn test_attach_to_existing_customer_keeps_default() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        let first = engine
            .attach(&mut customer, Token::new("tok_visa"))
            .await
            .unwrap();
        let second = engine
            .attach(&mut customer, Token::new("tok_mastercard"))
            .await
            .unwrap();

        assert_ne!(first, second);
        let default = engine.current_default(&customer).await.unwrap().unwrap();
        assert_eq!(default.id, first);
        assert_eq!(customer.card_last_four(), Some("4242"));
    }

    #[tokio::test]
    async fn test_first_attach_to_cardless_customer_updates_mirror() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        engine.stripe_id(&mut customer).await.unwrap();
        assert!(customer.card_last_four().is_none());

        engine
            .attach(&mut customer, Token::new("tok_mastercard"))
            .await
            .unwrap();
        assert_eq!(customer.card_brand(), Some("MasterCard"));
        assert_eq!(customer.card_last_four(), Some("4444"));
    }

    #[tokio::test]
    async fn test_token_then_attach_then_fetch_matches_last_four() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        let card = RawCard::new("5555555555554444", "12", "2099", "123");
        let token = engine.create_token(&card).await.unwrap();
        let method = engine.attach(&mut customer, token).await.unwrap();

        let details = engine.fetch(&customer, &method).await.unwrap().unwrap();
        assert_eq!(details.last4, "4444");
    }

    #[tokio::test]
    async fn test_list_and_fetch_without_remote_customer() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let customer = Customer::new(1, "ada@example.com");

        assert!(engine.list_all(&customer).await.unwrap().is_empty());
        let missing = engine
            .fetch(&customer, &PaymentMethodRef::from("card_1"))
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(processor.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_foreign_card_is_none() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut ada = Customer::new(1, "ada@example.com");
        let mut grace = Customer::new(2, "grace@example.com");

        let ada_card = engine.attach(&mut ada, Token::new("tok_visa")).await.unwrap();
        engine.attach(&mut grace, Token::new("tok_amex")).await.unwrap();

        assert!(engine.fetch(&grace, &ada_card).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_without_remote_customer() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        let err = engine
            .remove(&mut customer, &PaymentMethodRef::from("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NoStripeId));
        assert_eq!(processor.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_removing_default_moves_mirror() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        let visa = engine.attach(&mut customer, Token::new("tok_visa")).await.unwrap();
        engine
            .attach(&mut customer, Token::new("tok_mastercard"))
            .await
            .unwrap();

        engine.remove(&mut customer, &visa).await.unwrap();
        assert_eq!(customer.card_last_four(), Some("4444"));

        let stored = engine.customer(1, "ada@example.com").await.unwrap();
        assert_eq!(stored.card_last_four(), Some("4444"));
    }

    #[tokio::test]
    async fn test_removing_last_card_clears_mirror() {
        let processor = SandboxProcessor::new();
        let customers = InMemoryCustomerStore::new();
        let engine = engine_with(&processor, &customers);
        let mut customer = Customer::new(1, "ada@example.com");

        let visa = engine.attach(&mut customer, Token::new("tok_visa")).await.unwrap();
        engine.remove(&mut customer, &visa).await.unwrap();

        assert!(customer.card_brand().is_none());
        assert!(customer.card_last_four().is_none());
    }
}
