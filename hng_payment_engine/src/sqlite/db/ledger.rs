use chrono::{Duration, Utc};
use hpg_common::Money;
use sqlx::SqliteConnection;

use crate::db_types::{LedgerEntry, LedgerStatus, PaymentMethod};

pub async fn insert_pending(
    order_id: i64,
    method: PaymentMethod,
    amount: Money,
    reference: &str,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as(
        r#"
            INSERT INTO ledger_entries (order_id, method, status, amount, reference, note, created_at, updated_at)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(method)
    .bind(amount)
    .bind(reference)
    .bind(note)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn update_status_by_reference(
    reference: &str,
    status: LedgerStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE ledger_entries SET status = $1, updated_at = $2 WHERE reference = $3 RETURNING *",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(reference)
    .fetch_optional(conn)
    .await
}

pub async fn stale_pending(
    method: PaymentMethod,
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let cutoff = Utc::now() - older_than;
    sqlx::query_as(
        "SELECT * FROM ledger_entries WHERE method = $1 AND status = 'pending' AND created_at < $2 ORDER BY id",
    )
    .bind(method)
    .bind(cutoff)
    .fetch_all(conn)
    .await
}
