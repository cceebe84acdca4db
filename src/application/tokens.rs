use super::engine::WalletEngine;
use crate::domain::payment_method::{RawCard, Token};
use crate::error::Result;
use tracing::debug;

impl WalletEngine {
    /// Exchanges raw card fields for a single-use token.
    ///
    /// Nothing is validated locally; the processor decides and its rejection
    /// message is returned verbatim. Tokens are never cached.
    pub async fn create_token(&self, card: &RawCard) -> Result<Token> {
        let token = self.processor.create_token(card).await?;
        debug!("card tokenized");
        Ok(token)
    }
}
