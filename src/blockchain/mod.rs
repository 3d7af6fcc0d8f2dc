pub mod aggregator;
pub mod client;
pub mod models;
pub mod monitor;
pub mod provider;
pub mod retry;
pub mod ws;

// Re-exports for convenience
pub use aggregator::MultiChainAggregator;
pub use client::EvmChainProvider;
pub use monitor::{ChainMonitor, MonitorError, MonitorState};
pub use provider::{ChainProvider, ChainTable, HeadStream, ProviderError};
