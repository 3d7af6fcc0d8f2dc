//! Cache key generation for memoized provider calls

use crate::models::{ChainKey, WalletAddress};
use std::fmt;

/// A structured cache key naming one provider query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Normal transaction count of a wallet
    NormalTxCount {
        chain: ChainKey,
        address: WalletAddress,
    },
    /// Token transfer count of a wallet
    TokenTxCount {
        chain: ChainKey,
        address: WalletAddress,
    },
    /// Timestamp of the first transaction of a wallet
    FirstTxTimestamp {
        chain: ChainKey,
        address: WalletAddress,
    },
    /// ERC-20 symbol of a token contract
    TokenSymbol {
        chain: ChainKey,
        contract: WalletAddress,
    },
}

impl CacheKey {
    pub fn normal_tx_count(chain: &ChainKey, address: &WalletAddress) -> Self {
        Self::NormalTxCount {
            chain: chain.clone(),
            address: address.clone(),
        }
    }

    pub fn token_tx_count(chain: &ChainKey, address: &WalletAddress) -> Self {
        Self::TokenTxCount {
            chain: chain.clone(),
            address: address.clone(),
        }
    }

    pub fn first_tx_timestamp(chain: &ChainKey, address: &WalletAddress) -> Self {
        Self::FirstTxTimestamp {
            chain: chain.clone(),
            address: address.clone(),
        }
    }

    pub fn token_symbol(chain: &ChainKey, contract: &WalletAddress) -> Self {
        Self::TokenSymbol {
            chain: chain.clone(),
            contract: contract.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NormalTxCount { chain, address } => write!(f, "txcount:{}:{}", chain, address),
            Self::TokenTxCount { chain, address } => write!(f, "tokencount:{}:{}", chain, address),
            Self::FirstTxTimestamp { chain, address } => write!(f, "firsttx:{}:{}", chain, address),
            Self::TokenSymbol { chain, contract } => write!(f, "symbol:{}:{}", chain, contract),
        }
    }
}
