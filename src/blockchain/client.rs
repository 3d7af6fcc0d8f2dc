use crate::blockchain::models::{
    decode_abi_string, parse_decimal, parse_quantity, parse_u64_quantity, BlockBody,
    BlockTransaction, DecodeError, InternalTransferRecord, Receipt, TransferLog,
};
use crate::blockchain::provider::{ChainProvider, HeadStream, ProviderError};
use crate::blockchain::retry::{with_retry, RetryPolicy};
use crate::blockchain::ws;
use crate::cache::{CacheKey, ProviderCache};
use crate::config::{ChainSpec, PipelineSettings};
use crate::models::WalletAddress;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// `symbol()` selector
const SYMBOL_SELECTOR: &str = "0x95d89b41";

impl From<DecodeError> for ProviderError {
    fn from(err: DecodeError) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

#[derive(Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcBlock {
    number: String,
    timestamp: String,
    transactions: Vec<RpcTransaction>,
}

#[derive(Deserialize)]
struct RpcTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    value: String,
}

#[derive(Deserialize)]
struct RpcReceipt {
    status: Option<String>,
}

/// Etherscan-compatible explorer reply envelope.
#[derive(Deserialize)]
struct ScanReply {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

impl ScanReply {
    fn into_records<T: for<'de> Deserialize<'de>>(self) -> Result<Vec<T>, ProviderError> {
        if self.status == "1" {
            return Ok(serde_json::from_value(self.result)?);
        }
        if self.message.starts_with("No transactions found")
            || self.message.starts_with("No records found")
        {
            return Ok(Vec::new());
        }
        let detail = self.result.as_str().unwrap_or_default().to_string();
        if detail.to_lowercase().contains("rate limit") {
            Err(ProviderError::Transient(detail))
        } else {
            Err(ProviderError::Malformed(format!("{}: {}", self.message, detail)))
        }
    }
}

#[derive(Deserialize)]
struct ScanInternalTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(default, rename = "isError")]
    is_error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanTx {
    time_stamp: String,
}

/// Any EVM chain reachable through a JSON-RPC node (HTTP + websocket) and an
/// Etherscan-compatible explorer API.
pub struct EvmChainProvider {
    spec: ChainSpec,
    http: reqwest::Client,
    retry: RetryPolicy,
    stats_page_size: u32,
    scan_limiter: DefaultDirectRateLimiter,
    cache: ProviderCache,
    next_id: AtomicU64,
}

impl EvmChainProvider {
    pub fn new(spec: ChainSpec, settings: &PipelineSettings) -> Result<Self, ProviderError> {
        info!(
            "Initializing {} provider with RPC endpoint: {}, explorer: {}",
            spec.key, spec.node_http, spec.scan_api_url
        );

        let http = reqwest::Client::builder()
            .timeout(settings.rpc_timeout)
            .build()
            .map_err(|e| ProviderError::Unexpected(e.to_string()))?;
        let rate = NonZeroU32::new(settings.scan_api_rate_limit).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            spec,
            http,
            retry: RetryPolicy::forever(settings.reconnect_delay),
            stats_page_size: settings.stats_page_size.max(1),
            scan_limiter: RateLimiter::direct(Quota::per_second(rate)),
            cache: ProviderCache::new(settings.stats_cache_ttl),
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        with_retry(self.retry, method, || async {
            let reply: RpcReply = self
                .http
                .post(&self.spec.node_http)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if let Some(error) = reply.error {
                return Err(ProviderError::Malformed(format!(
                    "{} returned error {}: {}",
                    method, error.code, error.message
                )));
            }
            Ok(reply.result.unwrap_or(Value::Null))
        })
        .await
    }

    async fn scan_call(
        &self,
        params: Vec<(&'static str, String)>,
    ) -> Result<ScanReply, ProviderError> {
        let action = params
            .iter()
            .find(|(name, _)| *name == "action")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();

        with_retry(self.retry, &action, || async {
            self.scan_limiter.until_ready().await;
            let reply: ScanReply = self
                .http
                .get(&self.spec.scan_api_url)
                .query(&params)
                .query(&[("apikey", self.spec.scan_api_key.as_str())])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(reply)
        })
        .await
    }

    async fn account_records<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        address: &WalletAddress,
        offset: u32,
    ) -> Result<Vec<T>, ProviderError> {
        let params = vec![
            ("module", "account".to_string()),
            ("action", action.to_string()),
            ("address", address.to_string()),
            ("page", "1".to_string()),
            ("offset", offset.to_string()),
            ("sort", "asc".to_string()),
        ];
        self.scan_call(params).await?.into_records()
    }

    async fn first_timestamp(
        &self,
        action: &str,
        address: &WalletAddress,
    ) -> Result<Option<i64>, ProviderError> {
        let records: Vec<ScanTx> = self.account_records(action, address, 1).await?;
        match records.first() {
            Some(tx) => tx
                .time_stamp
                .parse()
                .map(Some)
                .map_err(|_| ProviderError::Malformed(format!("bad timeStamp {}", tx.time_stamp))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChainProvider for EvmChainProvider {
    fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    async fn subscribe_new_heads(&self) -> Result<HeadStream, ProviderError> {
        ws::subscribe_new_heads(&self.spec.node_wss).await
    }

    async fn get_block_by_number(
        &self,
        block_number: u64,
    ) -> Result<Option<BlockBody>, ProviderError> {
        let result = self
            .rpc_call(
                "eth_getBlockByNumber",
                json!([format!("0x{:x}", block_number), true]),
            )
            .await?;
        if result.is_null() {
            debug!(chain = %self.spec.key, block = block_number, "Block not available yet");
            return Ok(None);
        }

        let block: RpcBlock = serde_json::from_value(result)?;
        let transactions = block
            .transactions
            .into_iter()
            .map(|tx| {
                Ok(BlockTransaction {
                    hash: tx.hash,
                    from: tx.from,
                    to: tx.to,
                    value: parse_quantity(&tx.value)?,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Ok(Some(BlockBody {
            number: parse_u64_quantity(&block.number)?,
            timestamp: parse_u64_quantity(&block.timestamp)? as i64,
            transactions,
        }))
    }

    async fn get_transfer_logs(
        &self,
        block_number: u64,
        topic: &str,
    ) -> Result<Vec<TransferLog>, ProviderError> {
        let block = format!("0x{:x}", block_number);
        let result = self
            .rpc_call(
                "eth_getLogs",
                json!([{ "fromBlock": block, "toBlock": block, "topics": [topic] }]),
            )
            .await?;
        if result.is_null() {
            return Err(ProviderError::Malformed("eth_getLogs returned null".to_string()));
        }
        Ok(serde_json::from_value(result)?)
    }

    async fn get_internal_transfers(
        &self,
        block_number: u64,
    ) -> Result<Vec<InternalTransferRecord>, ProviderError> {
        let params = vec![
            ("module", "account".to_string()),
            ("action", "txlistinternal".to_string()),
            ("startblock", block_number.to_string()),
            ("endblock", block_number.to_string()),
            ("page", "1".to_string()),
            ("offset", self.stats_page_size.to_string()),
            ("sort", "asc".to_string()),
        ];
        let records: Vec<ScanInternalTx> = self.scan_call(params).await?.into_records()?;

        records
            .into_iter()
            .filter(|record| record.is_error != "1")
            .map(|record| {
                Ok(InternalTransferRecord {
                    hash: record.hash,
                    from: record.from,
                    to: Some(record.to).filter(|to| !to.is_empty()),
                    value: parse_decimal(&record.value)?,
                })
            })
            .collect()
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ProviderError> {
        let result = self.rpc_call("eth_getTransactionReceipt", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: RpcReceipt = serde_json::from_value(result)?;
        Ok(Some(Receipt {
            success: receipt.status.as_deref() == Some("0x1"),
        }))
    }

    async fn get_normal_tx_count(&self, address: &WalletAddress) -> Result<u64, ProviderError> {
        let key = CacheKey::normal_tx_count(&self.spec.key, address);
        self.cache
            .tx_counts
            .get_or_try_insert(key, async {
                let records: Vec<Value> =
                    self.account_records("txlist", address, self.stats_page_size).await?;
                Ok(records.len() as u64)
            })
            .await
    }

    async fn get_token_tx_count(&self, address: &WalletAddress) -> Result<u64, ProviderError> {
        let key = CacheKey::token_tx_count(&self.spec.key, address);
        self.cache
            .tx_counts
            .get_or_try_insert(key, async {
                let records: Vec<Value> =
                    self.account_records("tokentx", address, self.stats_page_size).await?;
                Ok(records.len() as u64)
            })
            .await
    }

    /// One explorer page is fetched per count.
    fn tx_count_cap(&self) -> Option<u64> {
        Some(u64::from(self.stats_page_size))
    }

    async fn get_first_tx_timestamp(
        &self,
        address: &WalletAddress,
    ) -> Result<Option<i64>, ProviderError> {
        let key = CacheKey::first_tx_timestamp(&self.spec.key, address);
        self.cache
            .first_tx
            .get_or_try_insert(key, async {
                let normal = self.first_timestamp("txlist", address).await?;
                let token = self.first_timestamp("tokentx", address).await?;
                Ok(normal.into_iter().chain(token).min())
            })
            .await
    }

    async fn get_token_symbol(
        &self,
        contract: &WalletAddress,
    ) -> Result<Option<String>, ProviderError> {
        let key = CacheKey::token_symbol(&self.spec.key, contract);
        self.cache
            .symbols
            .try_get_with(key, async {
                let call = json!([
                    { "to": contract.as_str(), "data": SYMBOL_SELECTOR },
                    "latest"
                ]);
                match self.rpc_call("eth_call", call).await {
                    Ok(Value::String(data)) => Ok(decode_abi_string(&data)),
                    Ok(_) => Ok(None),
                    // Reverted or missing `symbol()`
                    Err(ProviderError::Malformed(reason)) => {
                        debug!(contract = %contract, "symbol() unavailable: {}", reason);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(|err| (*err).clone())
    }
}
