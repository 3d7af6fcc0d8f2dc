use crate::blockchain::monitor::ChainMonitor;
use crate::blockchain::provider::ChainTable;
use crate::config::PipelineSettings;
use crate::models::BlockBatch;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Runs one [`ChainMonitor`] per chain and merges their batches.
///
/// Each chain forwards into a shared bounded channel from its own task. A
/// chain stuck reconnecting does not hold back the others; batches of one
/// chain keep the order its monitor produced them in.
pub struct MultiChainAggregator {
    monitors: Vec<ChainMonitor>,
    channel_capacity: usize,
}

impl MultiChainAggregator {
    pub fn new(chains: &ChainTable, settings: &PipelineSettings) -> Self {
        let mut providers: Vec<_> = chains.values().cloned().collect();
        providers.sort_by(|a, b| a.chain_key().cmp(b.chain_key()));

        let monitors = providers
            .into_iter()
            .map(|provider| ChainMonitor::new(provider, settings.clone()))
            .collect();

        Self::from_monitors(monitors, settings.batch_channel_capacity)
    }

    pub fn from_monitors(monitors: Vec<ChainMonitor>, channel_capacity: usize) -> Self {
        Self {
            monitors,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Spawns the per-chain tasks and returns the merged batch stream. Every
    /// monitor subscribes before it produces anything.
    pub fn start(self) -> BoxStream<'static, BlockBatch> {
        let (sender, receiver) = mpsc::channel(self.channel_capacity);

        for mut monitor in self.monitors {
            let sender = sender.clone();
            tokio::spawn(async move {
                let chain = monitor.chain_key().clone();
                monitor.start().await;
                info!(chain = %chain, "Monitoring new blocks");

                let mut batches = monitor.into_batches();
                while let Some(batch) = batches.next().await {
                    if sender.send(batch).await.is_err() {
                        warn!(chain = %chain, "Batch consumer gone, stopping monitor");
                        break;
                    }
                }
            });
        }

        stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|batch| (batch, receiver))
        })
        .boxed()
    }
}
