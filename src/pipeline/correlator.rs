use crate::blockchain::models::format_amount;
use crate::blockchain::provider::ChainProvider;
use crate::models::{
    CoinTransfer, Notification, ParsedWallet, TokenTransferRecord, Transaction, UserId,
    WalletAddress, WalletMap,
};
use crate::pipeline::PipelineError;
use crate::registry::TrackingRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const UNKNOWN_TOKEN: &str = "Unknown token";

/// A per-user notification in progress, with the wallets that user tracks
/// among the ones involved in the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlated {
    pub notification: Notification,
    pub tracked: WalletMap,
}

/// Matches transactions against the tracking registry.
pub struct TransactionCorrelator {
    registry: Arc<dyn TrackingRegistry>,
}

impl TransactionCorrelator {
    pub fn new(registry: Arc<dyn TrackingRegistry>) -> Self {
        Self { registry }
    }

    /// One entry per user tracking a wallet involved in `tx`. Empty when no
    /// one is interested or when the transaction did not succeed.
    pub async fn correlate(
        &self,
        provider: &dyn ChainProvider,
        tx: &Transaction,
    ) -> Result<Vec<Correlated>, PipelineError> {
        let chain = provider.chain_key();
        let wallets = tx.involved_wallets();

        let users = self.registry.find_interested_users(chain, &wallets).await?;
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let receipt = provider.get_transaction_receipt(&tx.hash).await?;
        if !receipt.is_some_and(|r| r.success) {
            debug!(chain = %chain, tx = %tx.hash, "Transaction not successful, skipping");
            return Ok(Vec::new());
        }

        let mut symbols: HashMap<WalletAddress, String> = HashMap::new();
        let mut users: Vec<(UserId, WalletMap)> = users.into_iter().collect();
        users.sort_by_key(|(user_id, _)| *user_id);

        let mut correlated = Vec::with_capacity(users.len());
        for (user_id, tracked) in users {
            let notification = self
                .build_notification(provider, tx, user_id, &tracked, &mut symbols)
                .await;
            correlated.push(Correlated {
                notification,
                tracked,
            });
        }
        Ok(correlated)
    }

    async fn build_notification(
        &self,
        provider: &dyn ChainProvider,
        tx: &Transaction,
        user_id: UserId,
        tracked: &WalletMap,
        symbols: &mut HashMap<WalletAddress, String>,
    ) -> Notification {
        let is_tracked = |address: &WalletAddress| tracked.contains_key(address);
        let mut notification = Notification::new(provider.chain_key().clone(), &tx.hash, user_id);

        if is_tracked(&tx.from) || tx.to.as_ref().is_some_and(is_tracked) {
            notification.base_transfer = Some(CoinTransfer {
                from: ParsedWallet::annotate(&tx.from, tracked),
                to: tx.to.as_ref().map(|to| ParsedWallet::annotate(to, tracked)),
                amount: format_amount(tx.value),
            });
        }

        for internal in &tx.internal_transfers {
            if is_tracked(&internal.from) || internal.to.as_ref().is_some_and(is_tracked) {
                notification.internal_transfers.push(CoinTransfer {
                    from: ParsedWallet::annotate(&internal.from, tracked),
                    to: internal.to.as_ref().map(|to| ParsedWallet::annotate(to, tracked)),
                    amount: format_amount(internal.value),
                });
            }
        }

        for transfer in &tx.token_transfers {
            if !is_tracked(&transfer.from) && !is_tracked(&transfer.to) {
                continue;
            }
            let token_symbol = match symbols.get(&transfer.contract_address) {
                Some(symbol) => symbol.clone(),
                None => {
                    let symbol = token_symbol(provider, &transfer.contract_address).await;
                    symbols.insert(transfer.contract_address.clone(), symbol.clone());
                    symbol
                }
            };
            notification.token_transfers.push(TokenTransferRecord {
                from: ParsedWallet::annotate(&transfer.from, tracked),
                to: ParsedWallet::annotate(&transfer.to, tracked),
                amount: format_amount(transfer.value),
                token_symbol,
                token_address: transfer.contract_address.clone(),
            });
        }

        notification
    }
}

async fn token_symbol(provider: &dyn ChainProvider, contract: &WalletAddress) -> String {
    match provider.get_token_symbol(contract).await {
        Ok(Some(symbol)) => symbol,
        Ok(None) => UNKNOWN_TOKEN.to_string(),
        Err(e) => {
            warn!(
                chain = %provider.chain_key(),
                contract = %contract,
                "Token symbol lookup failed: {}", e
            );
            UNKNOWN_TOKEN.to_string()
        }
    }
}
