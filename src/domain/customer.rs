use super::charge::Currency;
use super::payment_method::CardDetails;
use serde::{Deserialize, Serialize};

/// A locally persisted customer and its link to the processor.
///
/// `card_brand` and `card_last_four` mirror the processor's default source.
/// They are only written together through [`Customer::mirror_default`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Customer {
    /// Local key of the customer.
    pub id: u32,
    pub email: String,
    /// Preferred charge currency. Falls back to the engine default when unset.
    #[serde(default)]
    pub currency: Option<Currency>,
    stripe_id: Option<String>,
    card_brand: Option<String>,
    card_last_four: Option<String>,
}

impl Customer {
    pub fn new(id: u32, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            currency: None,
            stripe_id: None,
            card_brand: None,
            card_last_four: None,
        }
    }

    /// Links an existing remote customer, e.g. when migrating records.
    pub fn with_stripe_id(mut self, stripe_id: impl Into<String>) -> Self {
        self.stripe_id = Some(stripe_id.into());
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn stripe_id(&self) -> Option<&str> {
        self.stripe_id.as_deref()
    }

    pub fn card_brand(&self) -> Option<&str> {
        self.card_brand.as_deref()
    }

    pub fn card_last_four(&self) -> Option<&str> {
        self.card_last_four.as_deref()
    }

    pub(crate) fn set_stripe_id(&mut self, stripe_id: String) {
        self.stripe_id = Some(stripe_id);
    }

    /// Overwrites both mirror fields from a read-back of the remote default.
    ///
    /// Returns `true` when the mirror changed.
    pub(crate) fn mirror_default(&mut self, card: Option<&CardDetails>) -> bool {
        let brand = card.map(|c| c.brand.clone());
        let last_four = card.map(|c| c.last4.clone());
        if self.card_brand == brand && self.card_last_four == last_four {
            return false;
        }
        self.card_brand = brand;
        self.card_last_four = last_four;
        true
    }
}
