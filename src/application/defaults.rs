use super::engine::{WalletEngine, inconsistent};
use crate::domain::customer::Customer;
use crate::domain::payment_method::{CardDetails, PaymentMethodRef};
use crate::domain::ports::CustomerUpdate;
use crate::error::{PaymentError, Result};
use tracing::{debug, info};

impl WalletEngine {
    /// Makes `method` the customer's default card, remotely and in the mirror.
    ///
    /// The processor is written first. The mirror is then derived from a
    /// fresh read of the customer's cards, never from the arguments. A card
    /// that cannot be found after the write is an `InconsistentState`.
    pub async fn promote(
        &self,
        customer: &mut Customer,
        method: &PaymentMethodRef,
    ) -> Result<CardDetails> {
        let stripe_id = customer
            .stripe_id()
            .ok_or(PaymentError::NoStripeId)?
            .to_string();

        let remote = self.processor.fetch_customer(&stripe_id).await?;
        let updated = self
            .processor
            .update_customer(
                &remote.id,
                CustomerUpdate {
                    default_source: method.clone(),
                },
            )
            .await?;
        if updated.default_source.as_ref() != Some(method) {
            return Err(inconsistent(format!(
                "customer {stripe_id} reports default {:?} after promoting {method}",
                updated.default_source
            )));
        }

        let card = self.fetch(customer, method).await?.ok_or_else(|| {
            inconsistent(format!(
                "card {method} not found on customer {stripe_id} after promotion"
            ))
        })?;

        customer.mirror_default(Some(&card));
        self.customers.save(customer).await?;
        info!(customer = customer.id, method = %method, "default card promoted");
        Ok(card)
    }

    /// The customer's current default card, as the processor sees it.
    pub async fn current_default(&self, customer: &Customer) -> Result<Option<CardDetails>> {
        let Some(stripe_id) = customer.stripe_id() else {
            return Ok(None);
        };
        let remote = self.processor.fetch_customer(stripe_id).await?;
        Ok(remote.default_card().cloned())
    }

    /// Re-derives the mirror from the processor, saving only if it changed.
    pub async fn refresh_default_mirror(
        &self,
        customer: &mut Customer,
    ) -> Result<Option<CardDetails>> {
        let card = self.current_default(customer).await?;
        if customer.mirror_default(card.as_ref()) {
            self.customers.save(customer).await?;
            debug!(customer = customer.id, "default card mirror refreshed");
        }
        Ok(card)
    }
}
