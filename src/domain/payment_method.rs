use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable identifier of a card attached to a remote customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethodRef(String);

impl PaymentMethodRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PaymentMethodRef {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PaymentMethodRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PaymentMethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use stand-in for raw card data, issued by the processor.
///
/// Deliberately neither `Clone` nor serializable: it is handed over by value
/// to exactly one consuming call.
#[derive(Debug, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Raw card fields, forwarded to the processor as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCard {
    pub number: String,
    pub exp_month: String,
    pub exp_year: String,
    pub cvc: String,
}

impl RawCard {
    pub fn new(
        number: impl Into<String>,
        exp_month: impl Into<String>,
        exp_year: impl Into<String>,
        cvc: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            exp_month: exp_month.into(),
            exp_year: exp_year.into(),
            cvc: cvc.into(),
        }
    }
}

/// What a caller may hand to `add_payment_method`.
#[derive(Debug)]
pub enum CardInput {
    Token(Token),
    Raw(RawCard),
}

impl From<Token> for CardInput {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl From<RawCard> for CardInput {
    fn from(card: RawCard) -> Self {
        Self::Raw(card)
    }
}

/// A card as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub id: PaymentMethodRef,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}
