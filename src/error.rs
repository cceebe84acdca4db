use serde::Serialize;
use thiserror::Error;

/// Message used when a charge has neither an explicit method nor a remote customer.
pub const NO_PAYMENT_SOURCE: &str = "No payment source provided.";

#[derive(Error, Debug)]
pub enum PaymentError {
    /// The caller supplied insufficient input. Never reaches the processor.
    #[error("{0}")]
    ValidationError(String),
    /// The processor declined the request. `message` is the processor's text, verbatim.
    #[error("{message}")]
    RemoteRejected { message: String },
    #[error("Payment processor unavailable: {0}")]
    RemoteUnavailable(String),
    /// The operation needs a remote customer and the local record has none.
    #[error("Invalid StripeId")]
    NoStripeId,
    /// A post-write read-back did not find what was just written.
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistError),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T, E = PaymentError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PersistError {
    fn from(e: rocksdb::Error) -> Self {
        PersistError::Backend(e.into_string())
    }
}

/// Discriminator attached to every user-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    Validation,
    RemoteRejected,
    RemoteUnavailable,
    NoStripeId,
    InconsistentState,
    Internal,
}

impl PaymentError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            message: message.into(),
        }
    }

    pub fn status(&self) -> ErrorStatus {
        match self {
            Self::ValidationError(_) => ErrorStatus::Validation,
            Self::RemoteRejected { .. } => ErrorStatus::RemoteRejected,
            Self::RemoteUnavailable(_) => ErrorStatus::RemoteUnavailable,
            Self::NoStripeId => ErrorStatus::NoStripeId,
            Self::InconsistentState(_) => ErrorStatus::InconsistentState,
            Self::Persistence(_) | Self::CsvError(_) | Self::IoError(_) => ErrorStatus::Internal,
        }
    }

    /// Fatal errors signal a bug or corrupted remote data and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InconsistentState(_))
    }
}

/// The shape a failure takes when reported to a user: status plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub status: ErrorStatus,
    pub message: String,
}

impl From<&PaymentError> for Failure {
    fn from(e: &PaymentError) -> Self {
        Self {
            status: e.status(),
            message: e.to_string(),
        }
    }
}
