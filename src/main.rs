// Load configuration
// Set up logging
// Open the registry database and register chains
// Build the chain table and spawn the pipeline
// Serve the admin API

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_watch_service::{
    api, db,
    pipeline::{LogSink, Pipeline},
    state::AppState,
    ChainProvider, ChainTable, Config, EvmChainProvider, SqliteRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wallet-watch-service");
    info!(
        "Configured chains: {:?}",
        config.chains.iter().map(|c| c.key.as_str()).collect::<Vec<_>>()
    );

    let db_pool = db::connection::establish_connection(&config.database_url).await?;
    let registry = SqliteRegistry::init(db_pool, &config.chains).await?;
    info!("Database ready at {}", config.database_url);

    let mut chains = ChainTable::new();
    for spec in &config.chains {
        let provider = EvmChainProvider::new(spec.clone(), &config.pipeline)?;
        chains.insert(spec.key.clone(), Arc::new(provider) as Arc<dyn ChainProvider>);
    }

    let pipeline = Pipeline::new(
        chains.clone(),
        Arc::new(registry.clone()),
        Arc::new(LogSink::new(chains)),
        config.pipeline.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = pipeline.run().await {
            error!("Pipeline stopped: {}", e);
        }
    });
    info!("Pipeline task started");

    let chain_keys = config.chains.iter().map(|spec| spec.key.clone()).collect();
    let app = api::create_router(Arc::new(AppState::new(registry, chain_keys)));
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting admin API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
