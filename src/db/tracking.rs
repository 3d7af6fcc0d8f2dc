// Tracking entries and their audit log.
//
// Every write to `tracking_map` is paired with the matching
// `tracking_map_log` update inside one database transaction.

use crate::models::{ChainKey, InterestedUsers, TrackingEntry, UserId, WalletAddress};
use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::collections::HashSet;

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

pub async fn find_interested_users(
    pool: &Pool<Sqlite>,
    chain: &ChainKey,
    wallets: &HashSet<WalletAddress>,
) -> Result<InterestedUsers, sqlx::Error> {
    let mut users = InterestedUsers::new();
    if wallets.is_empty() {
        return Ok(users);
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT user_id, wallet, custom_name FROM tracking_map WHERE chain_key = ",
    );
    query.push_bind(chain.as_str());
    query.push(" AND wallet IN (");
    let mut separated = query.separated(", ");
    for wallet in wallets {
        separated.push_bind(wallet.as_str());
    }
    separated.push_unseparated(")");

    let rows = query.build().fetch_all(pool).await?;
    for row in rows {
        let user_id: UserId = row.get("user_id");
        let wallet: String = row.get("wallet");
        let custom_name: Option<String> = row.get("custom_name");
        users
            .entry(user_id)
            .or_default()
            .insert(WalletAddress::new(wallet), custom_name);
    }

    Ok(users)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyTracked,
    /// The user already gave the requested name to another wallet.
    NameTaken,
}

pub async fn add_tracking(
    pool: &Pool<Sqlite>,
    chain: &ChainKey,
    user_id: UserId,
    wallet: &WalletAddress,
) -> Result<bool, sqlx::Error> {
    let outcome = add_named_tracking(pool, chain, user_id, wallet, None).await?;
    Ok(outcome == AddOutcome::Added)
}

/// Starts tracking `wallet`, already carrying `name`. Nothing is written
/// unless the whole add succeeds.
pub async fn add_named_tracking(
    pool: &Pool<Sqlite>,
    chain: &ChainKey,
    user_id: UserId,
    wallet: &WalletAddress,
    name: Option<&str>,
) -> Result<AddOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO tracking_map (chain_key, user_id, wallet, custom_name) VALUES (?, ?, ?, ?)
         ON CONFLICT(chain_key, user_id, wallet) DO NOTHING",
    )
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet.as_str())
    .bind(name)
    .execute(&mut *tx)
    .await;

    let inserted = match inserted {
        Ok(result) => result.rows_affected(),
        Err(e) if is_unique_violation(&e) => {
            tx.rollback().await?;
            return Ok(AddOutcome::NameTaken);
        }
        Err(e) => return Err(e),
    };
    if inserted == 0 {
        tx.rollback().await?;
        return Ok(AddOutcome::AlreadyTracked);
    }

    sqlx::query(
        "INSERT INTO tracking_map_log (chain_key, user_id, wallet, custom_name, start_date)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet.as_str())
    .bind(name)
    .bind(now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(AddOutcome::Added)
}

pub async fn user_trackings(
    pool: &Pool<Sqlite>,
    chain: &ChainKey,
    user_id: UserId,
) -> Result<Vec<TrackingEntry>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT wallet, custom_name FROM tracking_map
         WHERE chain_key = ? AND user_id = ?
         ORDER BY id ASC",
    )
    .bind(chain.as_str())
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let entries = rows
        .iter()
        .map(|row| TrackingEntry {
            chain_key: chain.clone(),
            user_id,
            wallet: WalletAddress::new(row.get::<String, _>("wallet")),
            custom_name: row.get("custom_name"),
        })
        .collect();

    Ok(entries)
}

/// `Ok(None)` both for an unnamed and for an untracked wallet.
pub async fn wallet_name(
    pool: &Pool<Sqlite>,
    chain: &ChainKey,
    user_id: UserId,
    wallet: &WalletAddress,
) -> Result<Option<String>, sqlx::Error> {
    let name = sqlx::query_scalar::<_, Option<String>>(
        "SELECT custom_name FROM tracking_map WHERE chain_key = ? AND user_id = ? AND wallet = ?",
    )
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(name.flatten())
}

/// Returns `false` when the user already gave this name to another wallet.
pub async fn rename_tracking(
    pool: &Pool<Sqlite>,
    chain: &ChainKey,
    user_id: UserId,
    wallet: &WalletAddress,
    name: &str,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let stamp = now();

    let renamed = sqlx::query(
        "UPDATE tracking_map SET custom_name = ? WHERE chain_key = ? AND user_id = ? AND wallet = ?",
    )
    .bind(name)
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet.as_str())
    .execute(&mut *tx)
    .await;

    match renamed {
        Err(e) if is_unique_violation(&e) => {
            tx.rollback().await?;
            return Ok(false);
        }
        Err(e) => return Err(e),
        Ok(result) if result.rows_affected() == 0 => {
            tx.rollback().await?;
            return Ok(false);
        }
        Ok(_) => {}
    }

    sqlx::query(
        "UPDATE tracking_map_log SET end_date = ?
         WHERE chain_key = ? AND user_id = ? AND wallet = ? AND end_date IS NULL",
    )
    .bind(&stamp)
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet.as_str())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO tracking_map_log (chain_key, user_id, wallet, custom_name, start_date)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet.as_str())
    .bind(name)
    .bind(&stamp)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Stops one wallet, or every wallet of the user on `chain` when `wallet` is
/// `None`. Returns the number of entries removed.
pub async fn stop_tracking(
    pool: &Pool<Sqlite>,
    chain: &ChainKey,
    user_id: UserId,
    wallet: Option<&WalletAddress>,
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let wallet = wallet.map(WalletAddress::as_str);

    let removed = sqlx::query(
        "DELETE FROM tracking_map
         WHERE chain_key = ? AND user_id = ? AND (? IS NULL OR wallet = ?)",
    )
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet)
    .bind(wallet)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        "UPDATE tracking_map_log SET end_date = ?
         WHERE chain_key = ? AND user_id = ? AND (? IS NULL OR wallet = ?) AND end_date IS NULL",
    )
    .bind(now())
    .bind(chain.as_str())
    .bind(user_id)
    .bind(wallet)
    .bind(wallet)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(removed)
}
