use crate::domain::ports::CredentialSource;
use crate::error::{PaymentError, Result};

impl<T: CredentialSource + ?Sized> CredentialSource for Box<T> {
    fn secret_key(&self) -> Result<String> {
        (**self).secret_key()
    }
}

/// A key held in memory, shared by whoever constructs the processor.
#[derive(Clone)]
pub struct StaticCredentials {
    key: String,
}

impl StaticCredentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials").finish_non_exhaustive()
    }
}

impl CredentialSource for StaticCredentials {
    fn secret_key(&self) -> Result<String> {
        Ok(self.key.clone())
    }
}

/// A key read from the environment on every request, so rotation needs no restart.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub const DEFAULT_VAR: &'static str = "STRIPE_SECRET";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl CredentialSource for EnvCredentials {
    fn secret_key(&self) -> Result<String> {
        match std::env::var(&self.var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(PaymentError::ValidationError(format!(
                "No API key configured in {}",
                self.var
            ))),
        }
    }
}
