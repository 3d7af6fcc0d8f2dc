use super::fakes::{addr, broken_heads, head, heads, instant_settings, transfer_log, FakeProvider};
use crate::blockchain::models::{BlockBody, BlockTransaction, InternalTransferRecord};
use crate::blockchain::monitor::{ChainMonitor, MonitorState};
use crate::blockchain::provider::ProviderError;
use crate::config::PipelineSettings;
use alloy_primitives::U256;
use futures::stream::{self, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn monitor_for(provider: &Arc<FakeProvider>) -> ChainMonitor {
    ChainMonitor::new(provider.clone(), instant_settings())
}

fn body_with(number: u64, hashes: &[&str]) -> BlockBody {
    BlockBody {
        number,
        timestamp: 1_700_000_000,
        transactions: hashes
            .iter()
            .map(|hash| BlockTransaction {
                hash: hash.to_string(),
                from: addr("f1").to_string(),
                to: Some(addr("f2").to_string()),
                value: U256::from(5u64),
            })
            .collect(),
    }
}

#[tokio::test]
async fn catches_up_one_block_at_a_time_in_order() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);

    let first = monitor.process_notification(head(100)).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].block_number, 100);
    assert_eq!(monitor.cursor(), Some(100));

    let next = monitor.process_notification(head(103)).await;
    let numbers: Vec<u64> = next.iter().map(|b| b.block_number).collect();
    assert_eq!(numbers, vec![101, 102, 103]);
    assert_eq!(provider.block_requests(), vec![100, 101, 102, 103]);
    assert_eq!(monitor.cursor(), Some(103));
    assert_eq!(monitor.state(), MonitorState::IdleSubscribed);
}

#[tokio::test]
async fn configured_start_block_sets_the_initial_cursor() {
    let provider = Arc::new(FakeProvider::new("BSC").start_block(95));
    let mut monitor = monitor_for(&provider);

    let batches = monitor.process_notification(head(97)).await;
    let numbers: Vec<u64> = batches.iter().map(|b| b.block_number).collect();
    assert_eq!(numbers, vec![95, 96, 97]);
}

#[tokio::test]
async fn stale_heads_do_not_move_the_cursor() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);

    monitor.process_notification(head(100)).await;
    assert!(monitor.process_notification(head(100)).await.is_empty());
    assert!(monitor.process_notification(head(98)).await.is_empty());
    assert_eq!(monitor.cursor(), Some(100));
    assert_eq!(provider.block_requests(), vec![100]);
}

#[tokio::test]
async fn single_failure_is_retried() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    monitor.process_notification(head(100)).await;

    provider.fail_block(101, 1);
    let batches = monitor.process_notification(head(101)).await;

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].block_number, 101);
    assert_eq!(provider.block_requests(), vec![100, 101, 101]);
}

#[tokio::test]
async fn block_failing_twice_is_skipped() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    monitor.process_notification(head(100)).await;

    provider.fail_block(101, 2);
    let batches = monitor.process_notification(head(102)).await;
    assert!(batches.is_empty());
    assert_eq!(monitor.cursor(), Some(101));

    // Resumes with the next head, past the skipped block
    let batches = monitor.process_notification(head(103)).await;
    let numbers: Vec<u64> = batches.iter().map(|b| b.block_number).collect();
    assert_eq!(numbers, vec![102, 103]);
    assert_eq!(provider.block_requests(), vec![100, 101, 101, 102, 103]);
}

#[tokio::test]
async fn block_not_ready_is_polled_again() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    monitor.process_notification(head(100)).await;

    provider.delay_block(101, 2);
    let batches = monitor.process_notification(head(101)).await;

    assert_eq!(batches.len(), 1);
    assert_eq!(provider.block_requests(), vec![100, 101, 101, 101]);
}

#[tokio::test]
async fn block_that_never_becomes_ready_is_skipped() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    monitor.process_notification(head(100)).await;

    // Three polls per attempt, two attempts
    provider.delay_block(101, 6);
    assert!(monitor.process_notification(head(101)).await.is_empty());
    assert_eq!(monitor.cursor(), Some(101));
    assert_eq!(provider.block_requests().len(), 7);
}

#[tokio::test]
async fn malformed_transfer_log_is_dropped_and_the_block_survives() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    monitor.process_notification(head(100)).await;

    let token = addr("70");
    provider.set_body(body_with(101, &["0xaa01", "0xAA02"]));
    // Sender and recipient only, no amount
    let mut short = transfer_log("0xaa02", &token, &addr("b1"), &addr("b2"), 1);
    short.data = "0x".into();
    provider.set_logs(
        101,
        vec![
            transfer_log("0xaa01", &token, &addr("b1"), &addr("b2"), 7),
            short,
            transfer_log("0xaa02", &token, &addr("b3"), &addr("b4"), 9),
        ],
    );

    let batches = monitor.process_notification(head(101)).await;
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.transactions.len(), 2);
    assert_eq!(batch.transactions["0xaa01"].token_transfers.len(), 1);
    assert_eq!(batch.transactions["0xaa02"].token_transfers.len(), 1);
    assert_eq!(
        batch.transactions["0xaa02"].token_transfers[0].value,
        U256::from(9u64)
    );
}

#[tokio::test]
async fn empty_blocks_advance_the_cursor_without_a_batch() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    monitor.process_notification(head(100)).await;

    provider.set_body(body_with(101, &[]));
    assert!(monitor.process_notification(head(101)).await.is_empty());
    assert_eq!(monitor.cursor(), Some(101));
}

#[tokio::test]
async fn cursor_never_moves_backwards() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    provider.fail_block(7, 2);

    let mut previous = 0;
    for number in [5, 3, 8, 8, 10, 9, 12] {
        monitor.process_notification(head(number)).await;
        let cursor = monitor.cursor().unwrap();
        assert!(cursor >= previous, "cursor went from {} to {}", previous, cursor);
        previous = cursor;
    }

    let requests = provider.block_requests();
    assert!(requests.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(monitor.cursor(), Some(12));
}

#[tokio::test]
async fn start_retries_until_subscribed() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    provider.push_subscription(Err(ProviderError::Transient("dns".into())));
    provider.push_subscription(Err(ProviderError::Unexpected("boom".into())));
    let mut monitor = monitor_for(&provider);

    monitor.start().await;

    assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 3);
    assert_eq!(monitor.state(), MonitorState::Subscribed);
}

#[tokio::test]
async fn broken_subscription_is_reestablished() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    provider.push_subscription(Ok(broken_heads(vec![10])));
    provider.push_subscription(Ok(heads(vec![11])));
    let mut monitor = monitor_for(&provider);

    monitor.start().await;
    assert_eq!(monitor.next_batch().await.block_number, 10);
    assert_eq!(monitor.next_batch().await.block_number, 11);
    assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn subscription_closed_right_away_waits_before_reconnecting() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    for _ in 0..3 {
        provider.push_subscription(Ok(stream::empty().boxed()));
    }
    provider.push_subscription(Ok(heads(vec![11])));
    let settings = PipelineSettings {
        reconnect_delay: Duration::from_millis(40),
        ..instant_settings()
    };
    let mut monitor = ChainMonitor::new(provider.clone(), settings);

    let started = Instant::now();
    assert_eq!(monitor.next_head().await.number, 11);
    assert!(started.elapsed() >= Duration::from_millis(120));
    assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn internal_transfers_join_their_transaction() {
    let provider = Arc::new(FakeProvider::new("BSC"));
    let mut monitor = monitor_for(&provider);
    monitor.process_notification(head(100)).await;

    provider.set_body(body_with(101, &["0xaa01"]));
    provider.set_internals(
        101,
        vec![
            InternalTransferRecord {
                hash: "0xAA01".into(),
                from: addr("c1").to_string(),
                to: Some(addr("c2").to_string()),
                value: U256::from(3u64),
            },
            InternalTransferRecord {
                hash: "0xdead".into(),
                from: addr("c1").to_string(),
                to: None,
                value: U256::from(4u64),
            },
        ],
    );

    let batches = monitor.process_notification(head(101)).await;
    let internals = &batches[0].transactions["0xaa01"].internal_transfers;
    assert_eq!(internals.len(), 1);
    assert_eq!(internals[0].to, Some(addr("c2")));
}
