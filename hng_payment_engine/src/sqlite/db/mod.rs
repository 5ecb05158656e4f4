//! # Low-level SQLite database methods
//!
//! Simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`. Callers obtain a
//! connection from a pool, or open a transaction and pass `&mut *tx`, so any group of these calls can be made atomic
//! without changing the functions themselves.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod charges;
pub mod ledger;
pub mod orders;
pub mod transactions;
pub mod webhook_events;

const SQLITE_DB_URL: &str = "sqlite://data/hng_store.db";

pub fn db_url() -> String {
    let result = env::var("HPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("HPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
