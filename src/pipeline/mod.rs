//! Correlation pipeline: merged block batches in, per-user notifications out.

pub mod assembler;
pub mod autotrack;
pub mod correlator;

pub use assembler::{ChannelSink, LogSink, NotificationAssembler, NotificationSink, SinkError};
pub use autotrack::{AutoTrackDecision, AutoTrackHeuristic, WalletActivity};
pub use correlator::{Correlated, TransactionCorrelator};

use crate::blockchain::aggregator::MultiChainAggregator;
use crate::blockchain::provider::{ChainProvider, ChainTable, ProviderError};
use crate::config::PipelineSettings;
use crate::models::{BlockBatch, Notification, Transaction};
use crate::registry::{RegistryError, TrackingRegistry};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// The ingestion and correlation object graph. Everything it needs is passed
/// in at construction.
pub struct Pipeline {
    chains: ChainTable,
    settings: PipelineSettings,
    correlator: TransactionCorrelator,
    heuristic: AutoTrackHeuristic,
    assembler: NotificationAssembler,
}

impl Pipeline {
    pub fn new(
        chains: ChainTable,
        registry: Arc<dyn TrackingRegistry>,
        sink: Arc<dyn NotificationSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            chains,
            settings,
            correlator: TransactionCorrelator::new(registry.clone()),
            heuristic: AutoTrackHeuristic::new(registry),
            assembler: NotificationAssembler::new(sink),
        }
    }

    /// Monitors every chain and processes their batches. Only returns when the
    /// sink goes away.
    pub async fn run(self) -> Result<(), PipelineError> {
        info!("Starting pipeline for {} chain(s)", self.chains.len());
        let batches = MultiChainAggregator::new(&self.chains, &self.settings).start();
        self.consume(batches).await
    }

    pub async fn consume<S>(&self, mut batches: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = BlockBatch> + Unpin,
    {
        while let Some(batch) = batches.next().await {
            self.process_batch(&batch).await?;
        }
        Ok(())
    }

    /// Processes every transaction of `batch`. A failing transaction or user
    /// is logged and dropped; only a closed sink is returned as an error.
    /// Returns the number of notifications delivered.
    pub async fn process_batch(&self, batch: &BlockBatch) -> Result<usize, PipelineError> {
        let Some(provider) = self.chains.get(&batch.chain_key) else {
            error!(chain = %batch.chain_key, "Batch for an unconfigured chain, dropping");
            return Ok(0);
        };

        let mut hashes: Vec<&String> = batch.transactions.keys().collect();
        hashes.sort();

        let mut delivered = 0;
        for hash in hashes {
            let tx = &batch.transactions[hash];
            let correlated = match self.correlator.correlate(provider.as_ref(), tx).await {
                Ok(correlated) => correlated,
                Err(e) => {
                    error!(
                        chain = %batch.chain_key,
                        block = batch.block_number,
                        tx = %tx.hash,
                        "Error while processing transaction: {}", e
                    );
                    continue;
                }
            };
            // Each user's notification leaves before the next user is evaluated
            for entry in correlated {
                if let Some(notification) = self.evaluate(provider.as_ref(), entry).await {
                    self.assembler.finish(notification).await?;
                    delivered += 1;
                }
            }
        }
        Ok(delivered)
    }

    /// Correlates `tx` and runs the auto-track heuristic for each interested
    /// user. Users whose evaluation fails are logged and left out.
    pub async fn process_transaction(
        &self,
        provider: &dyn ChainProvider,
        tx: &Transaction,
    ) -> Result<Vec<Notification>, PipelineError> {
        let mut notifications = Vec::new();
        for entry in self.correlator.correlate(provider, tx).await? {
            if let Some(notification) = self.evaluate(provider, entry).await {
                notifications.push(notification);
            }
        }
        Ok(notifications)
    }

    async fn evaluate(
        &self,
        provider: &dyn ChainProvider,
        entry: Correlated,
    ) -> Option<Notification> {
        let Correlated {
            mut notification,
            tracked,
        } = entry;
        match self
            .heuristic
            .evaluate(provider, &mut notification, &tracked)
            .await
        {
            Ok(()) => Some(notification),
            Err(e) => {
                error!(
                    chain = %notification.chain_key,
                    tx = %notification.tx_hash,
                    user = notification.user_id,
                    "Error while evaluating wallets to track: {}", e
                );
                None
            }
        }
    }
}
