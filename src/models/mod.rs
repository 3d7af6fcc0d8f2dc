// Domain types shared by the chain monitor, the correlation pipeline,
// the registry and the admin API.

pub mod notification;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub use notification::{
    CoinTransfer, Notification, ParsedWallet, TokenTransferRecord, WalletAddToTrack,
};

/// Identifier of the user owning a tracking entry (chat id on the messaging side).
pub type UserId = i64;

/// Tracked wallets of one user on one chain, mapped to their optional custom name.
pub type WalletMap = HashMap<WalletAddress, Option<String>>;

/// Result of a registry lookup: user -> tracked wallets restricted to the queried set.
pub type InterestedUsers = HashMap<UserId, WalletMap>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid chain key '{0}': use only letters, digits and underscore")]
pub struct InvalidChainKey(pub String);

/// Short identifier naming one configured blockchain, e.g. `BSC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainKey(String);

impl ChainKey {
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidChainKey> {
        let key = key.into();
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(Self(key))
        } else {
            Err(InvalidChainKey(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChainKey {
    type Error = InvalidChainKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChainKey> for String {
    fn from(key: ChainKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ChainKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wallet or contract address. Always stored lowercase so that comparisons
/// never depend on the checksum casing a provider or a user happened to use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for WalletAddress {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for WalletAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Native coin movement produced by contract execution inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTransfer {
    pub from: WalletAddress,
    pub to: Option<WalletAddress>,
    pub value: U256,
}

/// A decoded `Transfer(address,address,uint256)` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub transaction_hash: String,
    pub contract_address: WalletAddress,
    pub from: WalletAddress,
    pub to: WalletAddress,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: WalletAddress,
    /// `None` for contract creation.
    pub to: Option<WalletAddress>,
    pub value: U256,
    pub timestamp: i64,
    pub internal_transfers: Vec<InternalTransfer>,
    pub token_transfers: Vec<TokenTransfer>,
}

impl Transaction {
    /// Every sender and recipient appearing in the base transfer, the internal
    /// transfers and the token transfers. Absent recipients are never included.
    pub fn involved_wallets(&self) -> std::collections::HashSet<WalletAddress> {
        let mut wallets = std::collections::HashSet::new();
        wallets.insert(self.from.clone());
        wallets.extend(self.to.iter().cloned());
        for transfer in &self.internal_transfers {
            wallets.insert(transfer.from.clone());
            wallets.extend(transfer.to.iter().cloned());
        }
        for transfer in &self.token_transfers {
            wallets.insert(transfer.from.clone());
            wallets.insert(transfer.to.clone());
        }
        wallets
    }
}

/// Every mined transaction of one block, keyed by transaction hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBatch {
    pub chain_key: ChainKey,
    pub block_number: u64,
    pub transactions: HashMap<String, Transaction>,
}

impl BlockBatch {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// A `newHeads` subscription event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewHead {
    pub number: u64,
}

impl NewHead {
    /// Parses an `eth_subscription` push message. Anything else (subscription
    /// acknowledgements, unrelated replies) yields `None`.
    pub fn from_message(message: &serde_json::Value) -> Option<Self> {
        if message.get("method")?.as_str()? != "eth_subscription" {
            return None;
        }
        let number = message.get("params")?.get("result")?.get("number")?.as_str()?;
        let number = u64::from_str_radix(number.trim_start_matches("0x"), 16).ok()?;
        Some(Self { number })
    }
}

/// A (chain, user, wallet) pair with its optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub chain_key: ChainKey,
    pub user_id: UserId,
    pub wallet: WalletAddress,
    pub custom_name: Option<String>,
}
