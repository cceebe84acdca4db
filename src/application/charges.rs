use super::engine::WalletEngine;
use crate::domain::charge::{Amount, ChargeOptions, ChargeReceipt, ChargeRequest, PaymentSource};
use crate::domain::customer::Customer;
use crate::error::{NO_PAYMENT_SOURCE, PaymentError, Result};
use tracing::info;

impl WalletEngine {
    /// Makes a one-off charge.
    ///
    /// An explicit `options.method` wins; otherwise the processor charges the
    /// remote customer's default card. With neither, nothing is sent.
    pub async fn charge(
        &self,
        customer: &Customer,
        amount: u64,
        options: ChargeOptions,
    ) -> Result<ChargeReceipt> {
        let source = match (options.method, customer.stripe_id()) {
            (Some(method), stripe_id) => PaymentSource::Method {
                method,
                customer: stripe_id.map(str::to_string),
            },
            (None, Some(stripe_id)) => PaymentSource::CustomerDefault {
                customer: stripe_id.to_string(),
            },
            (None, None) => {
                return Err(PaymentError::ValidationError(NO_PAYMENT_SOURCE.to_string()));
            }
        };
        let amount = Amount::new(amount)?;
        let currency = options
            .currency
            .or_else(|| customer.currency.clone())
            .unwrap_or_else(|| self.config.default_currency.clone());

        let receipt = self
            .processor
            .create_charge(ChargeRequest {
                amount,
                currency,
                source,
                description: options.description,
            })
            .await?;
        info!(customer = customer.id, charge = %receipt.id, amount = receipt.amount, "charge created");
        Ok(receipt)
    }
}
