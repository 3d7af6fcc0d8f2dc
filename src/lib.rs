pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use api::{create_router, ApiError, ApiResponse};
pub use blockchain::{ChainProvider, ChainTable, EvmChainProvider, ProviderError};
pub use config::Config;
pub use db::SqliteRegistry;
pub use models::{BlockBatch, ChainKey, Notification, Transaction, WalletAddress};
pub use pipeline::Pipeline;
pub use registry::{RegistryError, TrackingRegistry};
