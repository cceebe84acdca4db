use super::payment_method::PaymentMethodRef;
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A positive charge amount in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self, PaymentError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = PaymentError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Lowercase ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self("usd".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional knobs of a one-off charge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeOptions {
    /// Charge this card instead of the customer's default.
    pub method: Option<PaymentMethodRef>,
    pub currency: Option<Currency>,
    pub description: Option<String>,
}

impl ChargeOptions {
    pub fn with_method(method: impl Into<PaymentMethodRef>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }
}

/// Which funding source the processor should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSource {
    /// An explicit card, together with its owning remote customer when known.
    Method {
        method: PaymentMethodRef,
        customer: Option<String>,
    },
    /// Whatever the remote customer's default source is.
    CustomerDefault { customer: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount: Amount,
    pub currency: Currency,
    pub source: PaymentSource,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub id: String,
    pub amount: u64,
    pub currency: Currency,
    /// The card the processor actually charged.
    pub method: Option<PaymentMethodRef>,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(1).is_ok());
        assert!(matches!(
            Amount::new(0),
            Err(PaymentError::ValidationError(_))
        ));
        assert_eq!(Amount::try_from(u64::MAX).unwrap().value(), u64::MAX);
    }

    #[test]
    fn test_currency_is_normalized() {
        assert_eq!(Currency::new(" EUR ").as_str(), "eur");
        assert_eq!(Currency::default().as_str(), "usd");
    }
}
