//! `SqliteDatabase` is the concrete SQLite backend for the settlement engine.
//!
//! It implements [`SettlementDatabase`] and [`Ledger`] over a connection pool; the only interesting logic here is
//! which groups of low-level calls share a transaction.
use std::fmt::Debug;

use chrono::Duration;
use hpg_common::Money;
use log::*;
use sqlx::SqlitePool;

use super::db::{charges, db_url, ledger, new_pool, orders, transactions, webhook_events};
use crate::{
    db_types::{
        Charge,
        ChargeStatus,
        ChargeStatusEntry,
        GatewayId,
        LedgerEntry,
        LedgerStatus,
        NewCharge,
        NewOrder,
        NewOrderItem,
        NewTransaction,
        Order,
        OrderId,
        OrderItem,
        OrderNote,
        OrderStatus,
        PaymentMethod,
        Transaction,
        TransactionKind,
    },
    traits::{Ledger, LedgerError, OrderQueryFilter, SettlementDatabase, SettlementDatabaseError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connect using `HPG_DATABASE_URL`, or the default database path.
    pub async fn new(max_connections: u32) -> Result<Self, SettlementDatabaseError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        items: Vec<NewOrderItem>,
    ) -> Result<(Order, Vec<OrderItem>), SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(&order, &mut tx).await?;
        let mut saved = Vec::with_capacity(items.len());
        for item in &items {
            saved.push(orders::insert_order_item(order.id, item, &mut tx).await?);
        }
        tx.commit().await?;
        debug!("🗃️ Order [{}] committed with {} item(s)", order.order_number, saved.len());
        Ok((order, saved))
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_id(id, &mut conn).await?)
    }

    async fn fetch_order_by_number(&self, order_number: &OrderId) -> Result<Option<Order>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_number(order_number, &mut conn).await?)
    }

    async fn fetch_order_by_payment_id(
        &self,
        gateway: GatewayId,
        payment_id: &str,
    ) -> Result<Option<Order>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_payment_id(gateway, payment_id, &mut conn).await?)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_items(order_id, &mut conn).await?)
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(filter, &mut conn).await?)
    }

    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<Order, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order_status(order_id, status, &mut conn).await
    }

    async fn set_payment_reference(
        &self,
        order_id: i64,
        gateway: GatewayId,
        transaction_id: &str,
    ) -> Result<Order, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::set_payment_reference(order_id, gateway, transaction_id, &mut conn).await
    }

    async fn add_order_note(&self, order_id: i64, note: &str) -> Result<OrderNote, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::add_order_note(order_id, note, &mut conn).await?)
    }

    async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_notes(order_id, &mut conn).await?)
    }

    async fn gmv_for_current_month(&self) -> Result<Money, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::gmv_for_current_month(&mut conn).await?)
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::insert_transaction(&tx, &mut conn).await?)
    }

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<Transaction>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transactions_for_order(order_id, &mut conn).await?)
    }

    async fn transaction_exists(
        &self,
        gateway: GatewayId,
        external_id: &str,
        kind: TransactionKind,
    ) -> Result<bool, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::transaction_exists(gateway, external_id, kind, &mut conn).await?)
    }

    async fn try_mark_event(&self, gateway: GatewayId, event_id: &str) -> Result<bool, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhook_events::try_mark_event(gateway, event_id, &mut conn).await?)
    }

    async fn prune_event_markers(&self, older_than: Duration) -> Result<u64, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhook_events::prune_markers(older_than, &mut conn).await?)
    }

    async fn insert_charge(&self, charge: NewCharge) -> Result<Charge, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let charge = charges::insert_charge(&charge, &mut tx).await?;
        tx.commit().await?;
        Ok(charge)
    }

    async fn fetch_active_charge(&self, order_id: i64) -> Result<Option<Charge>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(charges::fetch_active_charge(order_id, &mut conn).await?)
    }

    async fn fetch_charge_by_provider_id(
        &self,
        gateway: GatewayId,
        charge_id: &str,
    ) -> Result<Option<Charge>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(charges::fetch_charge_by_provider_id(gateway, charge_id, &mut conn).await?)
    }

    async fn update_charge_status(&self, id: i64, status: ChargeStatus) -> Result<Charge, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let charge = charges::update_charge_status(id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(charge)
    }

    async fn charge_history(&self, id: i64) -> Result<Vec<ChargeStatusEntry>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(charges::charge_history(id, &mut conn).await?)
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => LedgerError::EntryNotFound("no matching row".into()),
            other => LedgerError::StorageError(other.to_string()),
        }
    }
}

impl Ledger for SqliteDatabase {
    async fn insert_pending(
        &self,
        order_id: i64,
        method: PaymentMethod,
        amount: Money,
        reference: &str,
        note: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::insert_pending(order_id, method, amount, reference, note, &mut conn).await?)
    }

    async fn update_status_by_reference(
        &self,
        reference: &str,
        status: LedgerStatus,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::update_status_by_reference(reference, status, &mut conn)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(reference.to_string()))
    }

    async fn stale_pending(
        &self,
        method: PaymentMethod,
        older_than: Duration,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::stale_pending(method, older_than, &mut conn).await?)
    }
}
