//! The chain data provider seam.
//!
//! Everything the pipeline knows about a chain comes through [`ChainProvider`]:
//! block bodies, Transfer logs, internal transfers, receipts and wallet
//! activity statistics. One implementation exists per chain family and the
//! pipeline receives them in an explicit [`ChainTable`].

use crate::blockchain::models::{BlockBody, InternalTransferRecord, Receipt, TransferLog};
use crate::config::ChainSpec;
use crate::models::{ChainKey, NewHead, WalletAddress};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Classified provider failure. Only `Transient` is retried by the provider
/// itself; the other kinds surface to the caller's own recovery policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transient connection error: {0}")]
    Transient(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unexpected provider error: {0}")]
    Unexpected(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Transient(err.to_string())
        } else if err.is_decode() || err.is_status() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unexpected(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProviderError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

/// Live `newHeads` feed. An `Err` item or the end of the stream means the
/// subscription is gone and must be re-established.
pub type HeadStream = BoxStream<'static, Result<NewHead, ProviderError>>;

/// Chain facts required by the ingestion pipeline.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn spec(&self) -> &ChainSpec;

    fn chain_key(&self) -> &ChainKey {
        &self.spec().key
    }

    /// Opens the live subscription and the request session behind it.
    async fn subscribe_new_heads(&self) -> Result<HeadStream, ProviderError>;

    /// `Ok(None)` means the node has announced the block but cannot serve its
    /// body yet.
    async fn get_block_by_number(&self, block_number: u64)
        -> Result<Option<BlockBody>, ProviderError>;

    async fn get_transfer_logs(
        &self,
        block_number: u64,
        topic: &str,
    ) -> Result<Vec<TransferLog>, ProviderError>;

    async fn get_internal_transfers(
        &self,
        block_number: u64,
    ) -> Result<Vec<InternalTransferRecord>, ProviderError>;

    /// `Ok(None)` when the node knows no receipt for the hash.
    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ProviderError>;

    async fn get_normal_tx_count(&self, address: &WalletAddress) -> Result<u64, ProviderError>;

    async fn get_token_tx_count(&self, address: &WalletAddress) -> Result<u64, ProviderError>;

    /// Largest value the two count lookups can report. A count at the cap is
    /// only a lower bound.
    fn tx_count_cap(&self) -> Option<u64> {
        None
    }

    /// Unix timestamp of the wallet's first transaction, if any is discoverable.
    async fn get_first_tx_timestamp(
        &self,
        address: &WalletAddress,
    ) -> Result<Option<i64>, ProviderError>;

    /// ERC-20 `symbol()`, `None` when the contract does not report one.
    async fn get_token_symbol(
        &self,
        contract: &WalletAddress,
    ) -> Result<Option<String>, ProviderError>;

    fn scan_tx_link(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.spec().scan_url.trim_end_matches('/'), tx_hash)
    }

    fn scan_wallet_link(&self, address: &WalletAddress) -> String {
        format!("{}/address/{}", self.spec().scan_url.trim_end_matches('/'), address)
    }
}

/// Providers of every configured chain, keyed by chain key.
pub type ChainTable = HashMap<ChainKey, Arc<dyn ChainProvider>>;
