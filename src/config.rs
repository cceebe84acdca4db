use crate::domain::charge::Currency;
use std::time::Duration;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    /// Used for charges when neither the call nor the customer names a currency.
    pub default_currency: Currency,
    /// Upper bound for a single processor request. Exceeding it is `RemoteUnavailable`.
    pub request_timeout: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_currency: Currency::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl WalletConfig {
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.default_currency = currency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
