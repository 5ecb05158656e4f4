use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Charge, ChargeStatus, ChargeStatusEntry, GatewayId, NewCharge},
    traits::SettlementDatabaseError,
};

/// Insert a charge and its opening `created` history entry. Callers run this inside a transaction.
pub async fn insert_charge(charge: &NewCharge, conn: &mut SqliteConnection) -> Result<Charge, SettlementDatabaseError> {
    let now = Utc::now();
    let record: Charge = sqlx::query_as(
        r#"
            INSERT INTO charges (order_id, gateway, charge_id, qr_code, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(charge.order_id)
    .bind(charge.gateway)
    .bind(&charge.charge_id)
    .bind(&charge.qr_code)
    .bind(charge.expires_at)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    append_history(record.id, ChargeStatus::Created, conn).await?;
    debug!("🧲️ Charge [{}] opened for order {} via {}", record.charge_id, record.order_id, record.gateway);
    Ok(record)
}

pub async fn fetch_active_charge(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Charge>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM charges WHERE order_id = $1 AND status = 'created' ORDER BY id DESC LIMIT 1")
        .bind(order_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_charge_by_provider_id(
    gateway: GatewayId,
    charge_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Charge>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM charges WHERE gateway = $1 AND charge_id = $2")
        .bind(gateway)
        .bind(charge_id)
        .fetch_optional(conn)
        .await
}

/// Move the charge to `status`, appending a history entry only when the status actually changes.
pub async fn update_charge_status(
    id: i64,
    status: ChargeStatus,
    conn: &mut SqliteConnection,
) -> Result<Charge, SettlementDatabaseError> {
    let current: Option<Charge> =
        sqlx::query_as("SELECT * FROM charges WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?;
    let current = current.ok_or_else(|| SettlementDatabaseError::ChargeNotFound(format!("id {id}")))?;
    if current.status == status {
        return Ok(current);
    }
    let updated: Charge =
        sqlx::query_as("UPDATE charges SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
    append_history(id, status, conn).await?;
    debug!("🧲️ Charge [{}] moved {} → {status}", updated.charge_id, current.status);
    Ok(updated)
}

pub async fn charge_history(id: i64, conn: &mut SqliteConnection) -> Result<Vec<ChargeStatusEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM charge_status_history WHERE charge_id = $1 ORDER BY id")
        .bind(id)
        .fetch_all(conn)
        .await
}

async fn append_history(id: i64, status: ChargeStatus, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO charge_status_history (charge_id, status, created_at) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}
