use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{GatewayId, NewTransaction, Transaction, TransactionKind};

/// Insert a settlement/refund fact. The `(gateway, external_id, kind)` unique constraint makes a duplicate insert
/// fail rather than double-count; callers check [`transaction_exists`] first on the idempotent paths.
pub async fn insert_transaction(
    tx: &NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, sqlx::Error> {
    let record: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                order_id, gateway, external_id, kind, gross_amount, gateway_fee, platform_fee, net_amount,
                tier_used, is_fallback, raw_payload, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *;
        "#,
    )
    .bind(tx.order_id)
    .bind(tx.gateway)
    .bind(&tx.external_id)
    .bind(tx.kind)
    .bind(tx.gross_amount)
    .bind(tx.gateway_fee)
    .bind(tx.platform_fee)
    .bind(tx.net_amount)
    .bind(tx.tier_used)
    .bind(tx.is_fallback)
    .bind(&tx.raw_payload)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!(
        "💳️ {} transaction recorded for order {} ({} gross, fallback: {})",
        record.kind, record.order_id, record.gross_amount, record.is_fallback
    );
    Ok(record)
}

pub async fn fetch_transactions_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

pub async fn transaction_exists(
    gateway: GatewayId,
    external_id: &str,
    kind: TransactionKind,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE gateway = $1 AND external_id = $2 AND kind = $3")
            .bind(gateway)
            .bind(external_id)
            .bind(kind)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}
