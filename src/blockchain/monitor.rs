//! Per-chain block follower.
//!
//! A [`ChainMonitor`] owns the `newHeads` subscription of one chain and the
//! cursor of the last fully processed block. Each announced head is caught up
//! to one block at a time; every block is fetched as three independent
//! provider calls (body, Transfer logs, internal transfers) and assembled into
//! a [`BlockBatch`].

use crate::blockchain::models::{assemble_block, BlockBody, TRANSFER_TOPIC};
use crate::blockchain::provider::{ChainProvider, HeadStream, ProviderError};
use crate::config::PipelineSettings;
use crate::models::{BlockBatch, ChainKey, NewHead};
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("block {block} still unavailable after {polls} polls")]
    BlockNotReady { block: u64, polls: u32 },

    #[error("provider failure: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Disconnected,
    Connecting,
    Subscribed,
    CatchingUp,
    IdleSubscribed,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::CatchingUp => "catching-up",
            Self::IdleSubscribed => "idle-subscribed",
        };
        f.write_str(name)
    }
}

/// Outcome of one step of the catch-up loop.
enum Step {
    Batch(BlockBatch),
    /// Block processed without transactions, or a failed attempt handled.
    Continue,
    /// Cursor reached the current target.
    Idle,
}

async fn wait_for_block(
    provider: &dyn ChainProvider,
    settings: &PipelineSettings,
    number: u64,
) -> Result<BlockBody, MonitorError> {
    let polls = settings.not_ready_max_polls.max(1);
    for poll in 1..=polls {
        if let Some(body) = provider.get_block_by_number(number).await? {
            return Ok(body);
        }
        if poll < polls {
            debug!(chain = %provider.chain_key(), block = number, poll, "Block not ready yet");
            sleep(settings.not_ready_delay).await;
        }
    }
    Err(MonitorError::BlockNotReady {
        block: number,
        polls,
    })
}

/// Fetches and assembles one block. All three provider calls must succeed.
pub async fn fetch_block(
    provider: &dyn ChainProvider,
    settings: &PipelineSettings,
    number: u64,
) -> Result<BlockBatch, MonitorError> {
    let (body, logs, internals) = tokio::try_join!(
        wait_for_block(provider, settings, number),
        async {
            provider
                .get_transfer_logs(number, TRANSFER_TOPIC)
                .await
                .map_err(MonitorError::from)
        },
        async {
            provider
                .get_internal_transfers(number)
                .await
                .map_err(MonitorError::from)
        },
    )?;

    Ok(assemble_block(provider.chain_key(), body, &logs, internals))
}

pub struct ChainMonitor {
    provider: Arc<dyn ChainProvider>,
    settings: PipelineSettings,
    state: MonitorState,
    heads: Option<HeadStream>,
    cursor: Option<u64>,
    target: Option<u64>,
    head_failures: u8,
}

impl ChainMonitor {
    pub fn new(provider: Arc<dyn ChainProvider>, settings: PipelineSettings) -> Self {
        Self {
            provider,
            settings,
            state: MonitorState::Disconnected,
            heads: None,
            cursor: None,
            target: None,
            head_failures: 0,
        }
    }

    pub fn chain_key(&self) -> &ChainKey {
        self.provider.chain_key()
    }

    /// Last fully processed (or skipped) block.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    fn set_state(&mut self, state: MonitorState) {
        if self.state != state {
            debug!(chain = %self.chain_key(), "Monitor state {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Establishes the head subscription. Retries with the reconnect delay
    /// until it succeeds.
    pub async fn start(&mut self) {
        loop {
            self.set_state(MonitorState::Connecting);
            match self.provider.subscribe_new_heads().await {
                Ok(heads) => {
                    info!(chain = %self.chain_key(), "Subscribed to new blocks");
                    self.heads = Some(heads);
                    self.set_state(MonitorState::Subscribed);
                    return;
                }
                Err(e) => {
                    warn!(
                        chain = %self.chain_key(),
                        "Subscription failed: {}. Trying again in {:?}",
                        e, self.settings.reconnect_delay
                    );
                    self.set_state(MonitorState::Disconnected);
                    sleep(self.settings.reconnect_delay).await;
                }
            }
        }
    }

    /// Next announced head. A broken or finished subscription is re-established
    /// after `reconnect_delay`, so this never fails.
    pub async fn next_head(&mut self) -> NewHead {
        loop {
            if self.heads.is_none() {
                self.start().await;
            }
            let Some(heads) = self.heads.as_mut() else {
                continue;
            };
            let event = heads.next().await;
            match event {
                Some(Ok(head)) => return head,
                Some(Err(e)) => warn!(chain = %self.chain_key(), "Head subscription broken: {}", e),
                None => warn!(chain = %self.chain_key(), "Head subscription ended"),
            }
            self.heads = None;
            self.set_state(MonitorState::Disconnected);
            sleep(self.settings.reconnect_delay).await;
        }
    }

    /// Records `head` as the catch-up target. The first head initialises the
    /// cursor to the block before the configured start block, or to `head - 1`.
    fn accept_head(&mut self, head: NewHead) {
        let start_block = self.provider.spec().start_block;
        let cursor = *self.cursor.get_or_insert_with(|| {
            start_block.unwrap_or(head.number).saturating_sub(1)
        });

        if head.number <= cursor {
            debug!(chain = %self.chain_key(), head = head.number, cursor, "Stale head, ignoring");
            return;
        }
        self.target = Some(head.number);
        self.head_failures = 0;
    }

    async fn step(&mut self) -> Step {
        let block = match (self.cursor, self.target) {
            (Some(cursor), Some(target)) if cursor < target => cursor + 1,
            _ => {
                self.target = None;
                return Step::Idle;
            }
        };

        self.set_state(MonitorState::CatchingUp);
        debug!(chain = %self.chain_key(), block, "Processing block");

        match fetch_block(self.provider.as_ref(), &self.settings, block).await {
            Ok(batch) => {
                self.cursor = Some(block);
                if batch.is_empty() {
                    Step::Continue
                } else {
                    Step::Batch(batch)
                }
            }
            Err(e) if self.head_failures == 0 => {
                warn!(
                    chain = %self.chain_key(),
                    block,
                    "Error while processing block: {}. Trying again", e
                );
                self.head_failures += 1;
                sleep(self.settings.block_retry_delay).await;
                Step::Continue
            }
            Err(e) => {
                error!(
                    chain = %self.chain_key(),
                    block,
                    "Error while processing block: {}. Skipping block", e
                );
                self.cursor = Some(block);
                self.target = None;
                self.head_failures = 0;
                Step::Continue
            }
        }
    }

    /// Catches up from the cursor through `head`, returning the non-empty
    /// batches in block order. Stops early when a block is skipped; the rest is
    /// picked up with the next head.
    pub async fn process_notification(&mut self, head: NewHead) -> Vec<BlockBatch> {
        self.accept_head(head);
        let mut batches = Vec::new();
        loop {
            match self.step().await {
                Step::Batch(batch) => batches.push(batch),
                Step::Continue => {}
                Step::Idle => break,
            }
        }
        self.set_state(MonitorState::IdleSubscribed);
        batches
    }

    /// Next non-empty processed block, following new heads as needed.
    pub async fn next_batch(&mut self) -> BlockBatch {
        loop {
            match self.step().await {
                Step::Batch(batch) => return batch,
                Step::Continue => {}
                Step::Idle => {
                    self.set_state(MonitorState::IdleSubscribed);
                    let head = self.next_head().await;
                    self.accept_head(head);
                }
            }
        }
    }

    /// Endless stream of processed blocks.
    pub fn into_batches(self) -> BoxStream<'static, BlockBatch> {
        stream::unfold(self, |mut monitor| async move {
            let batch = monitor.next_batch().await;
            Some((batch, monitor))
        })
        .boxed()
    }
}
