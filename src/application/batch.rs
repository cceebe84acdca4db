use super::engine::WalletEngine;
use crate::domain::charge::ChargeOptions;
use crate::domain::customer::Customer;
use crate::domain::operation::{Operation, OperationType};
use crate::domain::payment_method::{PaymentMethodRef, Token};
use crate::error::{PaymentError, Result};
use tracing::info;

/// Subscription name used for rows of a batch.
pub const DEFAULT_SUBSCRIPTION: &str = "main";

fn required<T>(value: Option<T>, column: &str, op: OperationType) -> Result<T> {
    value.ok_or_else(|| {
        PaymentError::ValidationError(format!("{op:?} requires the {column} column"))
    })
}

impl WalletEngine {
    /// Applies one batch row to its customer and persists the result.
    ///
    /// A customer seen for the first time needs an `email`; later rows may
    /// leave it empty.
    pub async fn process_operation(&self, operation: Operation) -> Result<Customer> {
        let mut customer = match self.customers.load(operation.customer).await? {
            Some(customer) => customer,
            None => {
                let email = required(operation.email.clone(), "email", operation.op)?;
                Customer::new(operation.customer, email)
            }
        };

        match operation.op {
            OperationType::AddCard | OperationType::AddDefaultCard => {
                let token = Token::new(required(operation.token, "token", operation.op)?);
                let set_default = operation.op == OperationType::AddDefaultCard;
                self.add_payment_method(&mut customer, token, set_default)
                    .await?;
            }
            OperationType::RemoveCard => {
                let card = PaymentMethodRef::new(required(operation.card, "card", operation.op)?);
                self.remove_payment_method(&mut customer, &card).await?;
            }
            OperationType::SetDefault => {
                let card = PaymentMethodRef::new(required(operation.card, "card", operation.op)?);
                self.promote_default_payment_method(&mut customer, &card)
                    .await?;
            }
            OperationType::Charge => {
                let amount = required(operation.amount, "amount", operation.op)?;
                let options = ChargeOptions {
                    method: operation.card.map(PaymentMethodRef::new),
                    ..ChargeOptions::default()
                };
                self.charge(&customer, amount, options).await?;
            }
            OperationType::Subscribe => {
                let plan = required(operation.plan, "plan", operation.op)?;
                let mut builder = self.new_subscription(&mut customer, DEFAULT_SUBSCRIPTION, plan);
                if let Some(days) = operation.trial_days {
                    builder.trial_days(days);
                }
                if let Some(token) = operation.token {
                    builder.with_token(Token::new(token));
                }
                if let Some(card) = operation.card {
                    builder.use_card(card);
                }
                builder.create().await?;
            }
        }

        self.save_customer(&customer).await?;
        info!(customer = customer.id, op = ?operation.op, "operation applied");
        Ok(customer)
    }
}
