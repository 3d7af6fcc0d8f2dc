pub mod chain;
pub mod connection;
pub mod migration;
pub mod tracking;

use crate::config::ChainSpec;
use crate::models::{ChainKey, InterestedUsers, TrackingEntry, UserId, WalletAddress};
use crate::registry::{RegistryError, TrackingRegistry};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::debug;

pub use tracking::AddOutcome;

/// [`TrackingRegistry`] backed by SQLite, plus the management operations used
/// by the admin API.
#[derive(Clone)]
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs migrations and registers the configured chains.
    pub async fn init(pool: SqlitePool, chains: &[ChainSpec]) -> Result<Self, RegistryError> {
        migration::run_migrations(&pool).await?;
        chain::register_chains(&pool, chains).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn user_trackings(
        &self,
        chain: &ChainKey,
        user_id: UserId,
    ) -> Result<Vec<TrackingEntry>, RegistryError> {
        Ok(tracking::user_trackings(&self.pool, chain, user_id).await?)
    }

    pub async fn wallet_name(
        &self,
        chain: &ChainKey,
        user_id: UserId,
        wallet: &WalletAddress,
    ) -> Result<Option<String>, RegistryError> {
        Ok(tracking::wallet_name(&self.pool, chain, user_id, wallet).await?)
    }

    /// Adds `wallet` and its optional name in one step.
    pub async fn add_named_tracking(
        &self,
        chain: &ChainKey,
        user_id: UserId,
        wallet: &WalletAddress,
        name: Option<&str>,
    ) -> Result<AddOutcome, RegistryError> {
        Ok(tracking::add_named_tracking(&self.pool, chain, user_id, wallet, name).await?)
    }

    pub async fn rename_tracking(
        &self,
        chain: &ChainKey,
        user_id: UserId,
        wallet: &WalletAddress,
        name: &str,
    ) -> Result<bool, RegistryError> {
        Ok(tracking::rename_tracking(&self.pool, chain, user_id, wallet, name).await?)
    }

    pub async fn stop_tracking(
        &self,
        chain: &ChainKey,
        user_id: UserId,
        wallet: Option<&WalletAddress>,
    ) -> Result<u64, RegistryError> {
        Ok(tracking::stop_tracking(&self.pool, chain, user_id, wallet).await?)
    }

    pub async fn native_coin(&self, chain: &ChainKey) -> Result<String, RegistryError> {
        chain::native_coin(&self.pool, chain).await
    }
}

#[async_trait]
impl TrackingRegistry for SqliteRegistry {
    async fn find_interested_users(
        &self,
        chain: &ChainKey,
        wallets: &HashSet<WalletAddress>,
    ) -> Result<InterestedUsers, RegistryError> {
        Ok(tracking::find_interested_users(&self.pool, chain, wallets).await?)
    }

    async fn add_tracking(
        &self,
        chain: &ChainKey,
        user_id: UserId,
        wallet: &WalletAddress,
    ) -> Result<bool, RegistryError> {
        let added = tracking::add_tracking(&self.pool, chain, user_id, wallet).await?;
        if !added {
            debug!(chain = %chain, user_id, wallet = %wallet, "Wallet already tracked");
        }
        Ok(added)
    }
}
