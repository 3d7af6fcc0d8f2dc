use crate::db::SqliteRegistry;
use crate::models::ChainKey;

/// Shared state of the admin API.
pub struct AppState {
    pub registry: SqliteRegistry,
    pub chain_keys: Vec<ChainKey>,
}

impl AppState {
    pub fn new(registry: SqliteRegistry, chain_keys: Vec<ChainKey>) -> Self {
        Self {
            registry,
            chain_keys,
        }
    }
}
