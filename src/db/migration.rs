use sqlx::SqlitePool;
use tracing::info;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chain (
            key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            coin_symbol TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // Custom names are unique per user across chains
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tracking_map (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_key TEXT NOT NULL REFERENCES chain(key),
            user_id INTEGER NOT NULL,
            wallet TEXT NOT NULL,
            custom_name TEXT,
            UNIQUE (chain_key, user_id, wallet),
            UNIQUE (user_id, custom_name)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tracking_map_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_key TEXT NOT NULL REFERENCES chain(key),
            user_id INTEGER NOT NULL,
            wallet TEXT NOT NULL,
            custom_name TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tracking_map_chain_wallet
         ON tracking_map(chain_key, wallet)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tracking_map_log_open
         ON tracking_map_log(chain_key, user_id, wallet, end_date)",
    )
    .execute(pool)
    .await?;

    info!("Database migrations completed successfully");
    Ok(())
}
