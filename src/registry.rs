//! Wallet tracking registry contract used by the pipeline.

use crate::models::{ChainKey, InterestedUsers, UserId, WalletAddress};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(
        "chain {key} does not match stored chain info (stored {stored_name}/{stored_coin}, configured {name}/{coin})"
    )]
    ChainMismatch {
        key: ChainKey,
        stored_name: String,
        stored_coin: String,
        name: String,
        coin: String,
    },

    #[error("unknown chain {0}")]
    UnknownChain(ChainKey),
}

/// Durable store of which users track which wallets. Implementations are
/// shared between tasks and must be safe to call concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackingRegistry: Send + Sync {
    /// Users tracking any of `wallets` on `chain`, each with the subset of
    /// `wallets` they track and the custom names they gave them.
    async fn find_interested_users(
        &self,
        chain: &ChainKey,
        wallets: &HashSet<WalletAddress>,
    ) -> Result<InterestedUsers, RegistryError>;

    /// `Ok(false)` when the (chain, user, wallet) entry already exists.
    async fn add_tracking(
        &self,
        chain: &ChainKey,
        user_id: UserId,
        wallet: &WalletAddress,
    ) -> Result<bool, RegistryError>;
}
