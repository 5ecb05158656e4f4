use chrono::{Duration, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::GatewayId;

/// Try to record `(gateway, event_id)` as processed. `INSERT OR IGNORE` against the unique constraint means exactly
/// one of any number of concurrent calls observes `true`; the rest see a replay.
pub async fn try_mark_event(
    gateway: GatewayId,
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO webhook_events (gateway, event_id, received_at) VALUES ($1, $2, $3)")
        .bind(gateway)
        .bind(event_id)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    let inserted = result.rows_affected() > 0;
    if !inserted {
        debug!("📥️ Event {event_id} from {gateway} has been seen before");
    }
    Ok(inserted)
}

pub async fn prune_markers(older_than: Duration, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - older_than;
    let result = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1").bind(cutoff).execute(conn).await?;
    let pruned = result.rows_affected();
    if pruned > 0 {
        debug!("📥️ Pruned {pruned} expired idempotency marker(s)");
    }
    Ok(pruned)
}
