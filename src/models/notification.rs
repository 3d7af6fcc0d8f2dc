//! Per-user notification produced for one qualifying transaction.

use super::{ChainKey, UserId, WalletAddress, WalletMap};
use serde::{Deserialize, Serialize};

/// One side of a transfer, annotated from the owning user's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedWallet {
    pub address: WalletAddress,
    pub monitored: bool,
    pub custom_name: Option<String>,
}

impl ParsedWallet {
    pub fn annotate(address: &WalletAddress, tracked: &WalletMap) -> Self {
        Self {
            address: address.clone(),
            monitored: tracked.contains_key(address),
            custom_name: tracked.get(address).cloned().flatten(),
        }
    }
}

/// Native coin transfer: the base transaction or an internal transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransfer {
    pub from: ParsedWallet,
    pub to: Option<ParsedWallet>,
    /// Decimal display units.
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransferRecord {
    pub from: ParsedWallet,
    pub to: ParsedWallet,
    /// Decimal display units.
    pub amount: String,
    pub token_symbol: String,
    pub token_address: WalletAddress,
}

/// A wallet picked up by the auto-track heuristic, with the justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddToTrack {
    pub address: WalletAddress,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub chain_key: ChainKey,
    pub tx_hash: String,
    pub user_id: UserId,
    pub base_transfer: Option<CoinTransfer>,
    pub internal_transfers: Vec<CoinTransfer>,
    pub token_transfers: Vec<TokenTransferRecord>,
    pub autoadded_wallets: Vec<WalletAddToTrack>,
    pub wallets_to_ask: Vec<WalletAddToTrack>,
}

impl Notification {
    pub fn new(chain_key: ChainKey, tx_hash: impl Into<String>, user_id: UserId) -> Self {
        Self {
            chain_key,
            tx_hash: tx_hash.into(),
            user_id,
            base_transfer: None,
            internal_transfers: Vec::new(),
            token_transfers: Vec::new(),
            autoadded_wallets: Vec::new(),
            wallets_to_ask: Vec::new(),
        }
    }

    /// Sender/recipient pairs of every transfer, base first, then internal,
    /// then token transfers.
    pub fn transfer_flows(&self) -> impl Iterator<Item = (&ParsedWallet, Option<&ParsedWallet>)> {
        let coin = self
            .base_transfer
            .iter()
            .chain(self.internal_transfers.iter())
            .map(|t| (&t.from, t.to.as_ref()));
        let token = self.token_transfers.iter().map(|t| (&t.from, Some(&t.to)));
        coin.chain(token)
    }

    /// Nothing to tell the user. Delivery layers skip these.
    pub fn is_content_free(&self) -> bool {
        self.base_transfer.is_none()
            && self.internal_transfers.is_empty()
            && self.token_transfers.is_empty()
            && self.autoadded_wallets.is_empty()
            && self.wallets_to_ask.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(address: &str) -> ParsedWallet {
        ParsedWallet {
            address: WalletAddress::new(address),
            monitored: false,
            custom_name: None,
        }
    }

    #[test]
    fn fresh_notification_is_content_free() {
        let chain = ChainKey::new("BSC").unwrap();
        let mut notification = Notification::new(chain, "0x01", 7);
        assert!(notification.is_content_free());

        notification.wallets_to_ask.push(WalletAddToTrack {
            address: WalletAddress::new("0xaa"),
            reason: "avg txs per day = 50.00".into(),
        });
        assert!(!notification.is_content_free());
    }

    #[test]
    fn transfer_flows_follow_base_internal_token_order() {
        let chain = ChainKey::new("BSC").unwrap();
        let mut notification = Notification::new(chain, "0x01", 7);
        notification.token_transfers.push(TokenTransferRecord {
            from: wallet("0x03"),
            to: wallet("0x04"),
            amount: "1".into(),
            token_symbol: "USDT".into(),
            token_address: WalletAddress::new("0xcc"),
        });
        notification.internal_transfers.push(CoinTransfer {
            from: wallet("0x02"),
            to: None,
            amount: "1".into(),
        });
        notification.base_transfer = Some(CoinTransfer {
            from: wallet("0x01"),
            to: Some(wallet("0x02")),
            amount: "1".into(),
        });

        let senders: Vec<_> = notification
            .transfer_flows()
            .map(|(from, _)| from.address.as_str().to_string())
            .collect();
        assert_eq!(senders, vec!["0x01", "0x02", "0x03"]);
    }
}
