// Configuration is read from the environment (optionally through a `.env`
// file):
// - database URL and admin API listen address
// - the configured chains and their node / explorer endpoints
// - retry delays, cache TTL and rate limits of the ingestion pipeline

use crate::models::{ChainKey, InvalidChainKey};
use dotenv::dotenv;
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidChainKey(#[from] InvalidChainKey),

    #[error("chain key configured twice: {0}")]
    DuplicateChainKey(String),

    #[error("no chains configured")]
    NoChains,

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Static description of one configured chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    pub key: ChainKey,
    pub name: String,
    pub coin_symbol: String,
    pub node_wss: String,
    pub node_http: String,
    pub scan_api_url: String,
    pub scan_api_key: String,
    pub scan_url: String,
    /// First block to process. Without it the monitor starts at the first head it sees.
    pub start_block: Option<u64>,
}

impl ChainSpec {
    /// Built-in defaults for a chain key; unknown keys get empty endpoints.
    pub fn preset(key: ChainKey) -> Self {
        match key.as_str() {
            "BSC" => Self {
                key,
                name: "Binance Smart Chain".to_string(),
                coin_symbol: "BNB".to_string(),
                node_wss: String::new(),
                node_http: String::new(),
                scan_api_url: "https://api.bscscan.com/api".to_string(),
                scan_api_key: String::new(),
                scan_url: "https://bscscan.com".to_string(),
                start_block: None,
            },
            _ => Self {
                name: key.to_string(),
                coin_symbol: key.to_string(),
                key,
                node_wss: String::new(),
                node_http: String::new(),
                scan_api_url: String::new(),
                scan_api_key: String::new(),
                scan_url: String::new(),
                start_block: None,
            },
        }
    }

    fn from_env(key: ChainKey) -> Result<Self, ConfigError> {
        let preset = Self::preset(key);
        let prefix = preset.key.as_str().to_uppercase();
        let var = |suffix: &str, default: &str| {
            env::var(format!("{}_{}", prefix, suffix)).unwrap_or_else(|_| default.to_string())
        };

        let start_block = match env::var(format!("{}_START_BLOCK", prefix)) {
            Ok(value) => Some(parse_value(&format!("{}_START_BLOCK", prefix), &value)?),
            Err(_) => None,
        };

        Ok(Self {
            name: var("NAME", &preset.name),
            coin_symbol: var("COIN", &preset.coin_symbol),
            node_wss: var("NODE_WSS", &preset.node_wss),
            node_http: var("NODE_HTTP", &preset.node_http),
            scan_api_url: var("SCAN_API_URL", &preset.scan_api_url),
            scan_api_key: var("SCAN_API_KEY", &preset.scan_api_key),
            scan_url: var("SCAN_URL", &preset.scan_url),
            start_block,
            key: preset.key,
        })
    }
}

/// Timing knobs of the per-chain monitor and the provider middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Fixed delay between reconnect attempts and transient-error retries.
    pub reconnect_delay: Duration,
    /// Delay before the single retry of a failed block catch-up attempt.
    pub block_retry_delay: Duration,
    /// Delay between polls of a block the node cannot serve yet.
    pub not_ready_delay: Duration,
    pub not_ready_max_polls: u32,
    pub stats_cache_ttl: Duration,
    pub stats_page_size: u32,
    pub scan_api_rate_limit: u32,
    pub rpc_timeout: Duration,
    pub batch_channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
            block_retry_delay: Duration::from_secs(1),
            not_ready_delay: Duration::from_millis(1000),
            not_ready_max_polls: 30,
            stats_cache_ttl: Duration::from_secs(600),
            stats_page_size: 10_000,
            scan_api_rate_limit: 5,
            rpc_timeout: Duration::from_secs(20),
            batch_channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub chains: Vec<ChainSpec>,
    pub pipeline: PipelineSettings,
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_value(name, &value),
        Err(_) => Ok(default),
    }
}

/// Parses a comma separated chain key list, rejecting invalid and repeated keys.
pub fn parse_chain_keys(raw: &str) -> Result<Vec<ChainKey>, ConfigError> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let key = ChainKey::new(part)?;
        if !seen.insert(key.clone()) {
            return Err(ConfigError::DuplicateChainKey(part.to_string()));
        }
        keys.push(key);
    }
    if keys.is_empty() {
        return Err(ConfigError::NoChains);
    }
    Ok(keys)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:wallet_watch.db".to_string());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env_or("SERVER_PORT", 8080)?;

        let chain_keys =
            parse_chain_keys(&env::var("CHAINS").unwrap_or_else(|_| "BSC".to_string()))?;
        let chains = chain_keys
            .into_iter()
            .map(ChainSpec::from_env)
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            reconnect_delay: Duration::from_secs(env_or(
                "RECONNECT_DELAY_SECS",
                defaults.reconnect_delay.as_secs(),
            )?),
            block_retry_delay: Duration::from_secs(env_or(
                "BLOCK_RETRY_DELAY_SECS",
                defaults.block_retry_delay.as_secs(),
            )?),
            not_ready_delay: Duration::from_millis(env_or(
                "BLOCK_NOT_READY_DELAY_MS",
                defaults.not_ready_delay.as_millis() as u64,
            )?),
            not_ready_max_polls: env_or("BLOCK_NOT_READY_MAX_POLLS", defaults.not_ready_max_polls)?,
            stats_cache_ttl: Duration::from_secs(env_or(
                "STATS_CACHE_TTL_SECS",
                defaults.stats_cache_ttl.as_secs(),
            )?),
            stats_page_size: env_or("STATS_PAGE_SIZE", defaults.stats_page_size)?,
            scan_api_rate_limit: env_or("SCAN_API_RATE_LIMIT", defaults.scan_api_rate_limit)?,
            rpc_timeout: Duration::from_secs(env_or(
                "RPC_TIMEOUT_SECS",
                defaults.rpc_timeout.as_secs(),
            )?),
            batch_channel_capacity: env_or(
                "BATCH_CHANNEL_CAPACITY",
                defaults.batch_channel_capacity,
            )?,
        };

        Ok(Self {
            database_url,
            server_host,
            server_port,
            chains,
            pipeline,
        })
    }
}
