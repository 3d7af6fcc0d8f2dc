//! Connects to one configured chain, waits for the next head and prints the
//! assembled batch of that block.
//!
//! Usage: `check_chain [CHAIN_KEY]` (defaults to the first configured chain).

use std::sync::Arc;
use tracing::{info, Level};
use wallet_watch_service::{
    blockchain::{models::format_amount, ChainMonitor},
    Config, EvmChainProvider,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = Config::from_env()?;
    let wanted = std::env::args().nth(1);
    let spec = match &wanted {
        Some(key) => config.chains.iter().find(|spec| spec.key.as_str() == key),
        None => config.chains.first(),
    }
    .ok_or_else(|| format!("chain {} is not configured", wanted.clone().unwrap_or_default()))?
    .clone();

    info!("Checking {} ({})", spec.name, spec.key);
    let provider = Arc::new(EvmChainProvider::new(spec, &config.pipeline)?);
    let mut monitor = ChainMonitor::new(provider, config.pipeline.clone());

    monitor.start().await;
    let head = monitor.next_head().await;
    info!("Received head {}", head.number);

    let batches = monitor.process_notification(head).await;
    info!("Cursor now at {:?}", monitor.cursor());
    for batch in batches {
        println!("Block {}: {} transaction(s)", batch.block_number, batch.transactions.len());
        for tx in batch.transactions.values() {
            println!(
                "  {} {} -> {} {} ({} internal, {} token transfers)",
                tx.hash,
                tx.from,
                tx.to.as_ref().map(|to| to.as_str()).unwrap_or("<contract creation>"),
                format_amount(tx.value),
                tx.internal_transfers.len(),
                tx.token_transfers.len()
            );
        }
    }

    Ok(())
}
