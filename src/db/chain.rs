use crate::config::ChainSpec;
use crate::models::ChainKey;
use crate::registry::RegistryError;
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

/// Inserts every configured chain, or checks that the stored row still
/// matches the configured name and coin.
pub async fn register_chains(
    pool: &Pool<Sqlite>,
    chains: &[ChainSpec],
) -> Result<(), RegistryError> {
    for chain in chains {
        let existing = sqlx::query("SELECT name, coin_symbol FROM chain WHERE key = ?")
            .bind(chain.key.as_str())
            .fetch_optional(pool)
            .await?;

        match existing {
            None => {
                sqlx::query("INSERT INTO chain (key, name, coin_symbol) VALUES (?, ?, ?)")
                    .bind(chain.key.as_str())
                    .bind(&chain.name)
                    .bind(&chain.coin_symbol)
                    .execute(pool)
                    .await?;
                info!("Registered chain {} ({})", chain.key, chain.name);
            }
            Some(row) => {
                let stored_name: String = row.get("name");
                let stored_coin: String = row.get("coin_symbol");
                if stored_name != chain.name || stored_coin != chain.coin_symbol {
                    return Err(RegistryError::ChainMismatch {
                        key: chain.key.clone(),
                        stored_name,
                        stored_coin,
                        name: chain.name.clone(),
                        coin: chain.coin_symbol.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}

pub async fn native_coin(pool: &Pool<Sqlite>, chain: &ChainKey) -> Result<String, RegistryError> {
    let coin = sqlx::query_scalar::<_, String>("SELECT coin_symbol FROM chain WHERE key = ?")
        .bind(chain.as_str())
        .fetch_optional(pool)
        .await?;

    coin.ok_or_else(|| RegistryError::UnknownChain(chain.clone()))
}
