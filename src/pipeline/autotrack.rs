//! Watch-list expansion.
//!
//! When a tracked wallet sends funds to an untracked one, the recipient's
//! on-chain activity decides whether it is tracked silently or proposed to the
//! user: low-activity or brand-new wallets are added, busy long-lived ones are
//! asked about.

use crate::blockchain::provider::{ChainProvider, ProviderError};
use crate::models::{Notification, WalletAddToTrack, WalletAddress, WalletMap};
use crate::pipeline::PipelineError;
use crate::registry::TrackingRegistry;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const AUTO_ADD_MAX_AVG_TXS_PER_DAY: f64 = 5.0;
pub const AUTO_ADD_MAX_DAYS: i64 = 5;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletActivity {
    /// Normal plus token transactions.
    pub total_txs: u64,
    /// Whole days since the first transaction, 0 when none is known.
    pub days_since_first: i64,
    /// A count hit the provider's cap, so `total_txs` is a lower bound.
    pub saturated: bool,
}

impl WalletActivity {
    pub fn new(total_txs: u64, first_tx_timestamp: Option<i64>, now: i64) -> Self {
        let days_since_first = first_tx_timestamp
            .map(|first| (now - first) / SECONDS_PER_DAY)
            .unwrap_or(0);
        Self {
            total_txs,
            days_since_first,
            saturated: false,
        }
    }

    /// Same-day wallets divide by one.
    pub fn avg_per_day(&self) -> f64 {
        self.total_txs as f64 / self.days_since_first.max(1) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoTrackDecision {
    AutoAdd(WalletAddToTrack),
    Ask(WalletAddToTrack),
}

pub fn decide(address: &WalletAddress, activity: &WalletActivity) -> AutoTrackDecision {
    let avg = activity.avg_per_day();
    let days = activity.days_since_first;
    let entry = |reason: String| WalletAddToTrack {
        address: address.clone(),
        reason,
    };

    if avg < AUTO_ADD_MAX_AVG_TXS_PER_DAY && !activity.saturated {
        AutoTrackDecision::AutoAdd(entry(format!("avg txs per day = {:.2}", avg)))
    } else if days < AUTO_ADD_MAX_DAYS {
        AutoTrackDecision::AutoAdd(entry(format!("days since first trans = {}", days)))
    } else if activity.saturated {
        AutoTrackDecision::Ask(entry(format!(
            "avg txs per day >= {:.2}, days since first trans = {}",
            avg, days
        )))
    } else {
        AutoTrackDecision::Ask(entry(format!(
            "avg txs per day = {:.2}, days since first trans = {}",
            avg, days
        )))
    }
}

/// Recipients of transfers sent by a tracked wallet to an untracked one, in
/// base, internal, token order without repeats.
pub fn candidate_wallets(notification: &Notification, tracked: &WalletMap) -> Vec<WalletAddress> {
    let mut seen = HashSet::new();
    notification
        .transfer_flows()
        .filter(|(from, _)| tracked.contains_key(&from.address))
        .filter_map(|(_, to)| to.map(|to| to.address.clone()))
        .filter(|to| !tracked.contains_key(to))
        .filter(|to| seen.insert(to.clone()))
        .collect()
}

pub async fn wallet_activity(
    provider: &dyn ChainProvider,
    wallet: &WalletAddress,
    now: i64,
) -> Result<WalletActivity, ProviderError> {
    let normal = provider.get_normal_tx_count(wallet).await?;
    let token = provider.get_token_tx_count(wallet).await?;
    let first = provider.get_first_tx_timestamp(wallet).await?;
    let mut activity = WalletActivity::new(normal + token, first, now);
    activity.saturated = provider
        .tx_count_cap()
        .is_some_and(|cap| normal >= cap || token >= cap);
    Ok(activity)
}

pub struct AutoTrackHeuristic {
    registry: Arc<dyn TrackingRegistry>,
}

impl AutoTrackHeuristic {
    pub fn new(registry: Arc<dyn TrackingRegistry>) -> Self {
        Self { registry }
    }

    pub async fn evaluate(
        &self,
        provider: &dyn ChainProvider,
        notification: &mut Notification,
        tracked: &WalletMap,
    ) -> Result<(), PipelineError> {
        self.evaluate_at(provider, notification, tracked, Utc::now().timestamp())
            .await
    }

    /// Decides every candidate of `notification` as of unix time `now` and
    /// records the outcomes on it. Auto-added wallets are written to the
    /// registry.
    pub async fn evaluate_at(
        &self,
        provider: &dyn ChainProvider,
        notification: &mut Notification,
        tracked: &WalletMap,
        now: i64,
    ) -> Result<(), PipelineError> {
        for wallet in candidate_wallets(notification, tracked) {
            let activity = wallet_activity(provider, &wallet, now).await?;
            match decide(&wallet, &activity) {
                AutoTrackDecision::AutoAdd(entry) => {
                    let added = self
                        .registry
                        .add_tracking(&notification.chain_key, notification.user_id, &wallet)
                        .await?;
                    if added {
                        info!(
                            chain = %notification.chain_key,
                            user_id = notification.user_id,
                            wallet = %wallet,
                            "Auto-added wallet ({})", entry.reason
                        );
                    } else {
                        debug!(wallet = %wallet, "Auto-add raced with an existing entry");
                    }
                    notification.autoadded_wallets.push(entry);
                }
                AutoTrackDecision::Ask(entry) => notification.wallets_to_ask.push(entry),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletAddress {
        WalletAddress::new("0x00000000000000000000000000000000000000b2")
    }

    fn activity(total_txs: u64, days_since_first: i64) -> WalletActivity {
        WalletActivity {
            total_txs,
            days_since_first,
            saturated: false,
        }
    }

    #[test]
    fn same_day_wallet_divides_by_one() {
        let activity = WalletActivity::new(12, Some(1_000), 1_000 + 3_600);
        assert_eq!(activity.days_since_first, 0);
        assert_eq!(activity.avg_per_day(), 12.0);
    }

    #[test]
    fn wallet_without_history_counts_zero_days() {
        let activity = WalletActivity::new(0, None, 1_700_000_000);
        assert_eq!(activity.days_since_first, 0);
        assert_eq!(activity.avg_per_day(), 0.0);
    }

    #[test]
    fn decision_branches_follow_average_then_age() {
        let low = activity(10, 10);
        assert_eq!(
            decide(&wallet(), &low),
            AutoTrackDecision::AutoAdd(WalletAddToTrack {
                address: wallet(),
                reason: "avg txs per day = 1.00".into(),
            })
        );

        let young = activity(40, 2);
        assert_eq!(
            decide(&wallet(), &young),
            AutoTrackDecision::AutoAdd(WalletAddToTrack {
                address: wallet(),
                reason: "days since first trans = 2".into(),
            })
        );

        let busy = activity(1_500, 30);
        assert_eq!(
            decide(&wallet(), &busy),
            AutoTrackDecision::Ask(WalletAddToTrack {
                address: wallet(),
                reason: "avg txs per day = 50.00, days since first trans = 30".into(),
            })
        );
    }

    #[test]
    fn boundary_average_of_five_is_not_low_activity() {
        assert!(matches!(decide(&wallet(), &activity(50, 10)), AutoTrackDecision::Ask(_)));
    }

    #[test]
    fn capped_counts_never_pass_as_low_activity() {
        let old_busy = WalletActivity {
            saturated: true,
            ..activity(20_000, 4_500)
        };
        assert_eq!(
            decide(&wallet(), &old_busy),
            AutoTrackDecision::Ask(WalletAddToTrack {
                address: wallet(),
                reason: "avg txs per day >= 4.44, days since first trans = 4500".into(),
            })
        );

        let young_busy = WalletActivity {
            saturated: true,
            ..activity(20_000, 2)
        };
        assert!(matches!(decide(&wallet(), &young_busy), AutoTrackDecision::AutoAdd(_)));
    }
}
