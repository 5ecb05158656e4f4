use chrono::{DateTime, Utc};
use hpg_common::Money;
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{GatewayId, NewOrder, NewOrderItem, Order, OrderId, OrderItem, OrderNote, OrderStatus},
    helpers::format_order_number,
    traits::{OrderQueryFilter, SettlementDatabaseError},
};

/// Inserts a new order row and assigns its sequential order number from the row id. Not atomic on its own: callers
/// wrap this together with the item inserts in a transaction and pass `&mut *tx`.
///
/// Timestamps are always bound from [`Utc::now`] rather than left to SQLite defaults, so that every stored
/// `created_at`/`updated_at` uses the same text encoding as the cutoffs bound in range queries. The same holds for
/// every other insert in this directory.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, SettlementDatabaseError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO orders (
                customer_id,
                status,
                product_type,
                subtotal,
                shipping_total,
                discount_total,
                total,
                commission,
                currency,
                payment_method,
                billing_first_name,
                billing_last_name,
                billing_email,
                billing_phone,
                billing_cpf,
                billing_postcode,
                billing_address_1,
                billing_city,
                billing_state,
                client_ip,
                user_agent,
                created_at,
                updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21,
                $22, $23
            )
            RETURNING id;
        "#,
    )
    .bind(&order.customer_id)
    .bind(OrderStatus::Pending)
    .bind(order.product_type)
    .bind(order.subtotal)
    .bind(order.shipping_total)
    .bind(order.discount_total)
    .bind(order.total())
    .bind(order.commission)
    .bind(&order.currency)
    .bind(order.payment_method)
    .bind(&order.billing.billing_first_name)
    .bind(&order.billing.billing_last_name)
    .bind(&order.billing.billing_email)
    .bind(&order.billing.billing_phone)
    .bind(&order.billing.billing_cpf)
    .bind(&order.billing.billing_postcode)
    .bind(&order.billing.billing_address_1)
    .bind(&order.billing.billing_city)
    .bind(&order.billing.billing_state)
    .bind(&order.client_ip)
    .bind(&order.user_agent)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    let order_number = format_order_number(id);
    let order: Order = sqlx::query_as("UPDATE orders SET order_number = $1 WHERE id = $2 RETURNING *")
        .bind(&order_number)
        .bind(id)
        .fetch_one(conn)
        .await?;
    debug!("🧾️ Order [{}] inserted with id {id}", order.order_number);
    Ok(order)
}

pub async fn insert_order_item(
    order_id: i64,
    item: &NewOrderItem,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, SettlementDatabaseError> {
    let item: OrderItem = sqlx::query_as(
        r#"
            INSERT INTO order_items (
                order_id, product_id, name, quantity, unit_price, line_subtotal, commission_rate_bps,
                commission_amount, custom_fields
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(&item.name)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.line_subtotal())
    .bind(item.commission_rate_bps)
    .bind(item.commission_amount())
    .bind(&item.custom_fields)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_order_by_number(
    order_number: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(conn)
        .await
}

/// Locate an order via its stored payment reference, falling back to an open charge carrying the provider id.
pub async fn fetch_order_by_payment_id(
    gateway: GatewayId,
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT o.* FROM orders o
            LEFT JOIN charges c ON c.order_id = o.id AND c.gateway = $1 AND c.charge_id = $2
            WHERE (o.gateway = $1 AND o.transaction_id = $2) OR c.id IS NOT NULL
            ORDER BY o.id LIMIT 1
        "#,
    )
    .bind(gateway)
    .bind(payment_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Fetches orders matching the filter, ordered by `created_at` ascending.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if let Some(status) = query.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status.as_str());
    }
    if let Some(gateway) = query.gateway {
        where_clause.push("gateway = ");
        where_clause.push_bind_unseparated(gateway.as_str());
    }
    if let Some(method) = query.payment_method {
        where_clause.push("payment_method = ");
        where_clause.push_bind_unseparated(method.to_string());
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("🧾️ Executing query: {}", builder.sql());
    builder.build_query_as::<Order>().fetch_all(conn).await
}

pub(crate) async fn update_order_status(
    id: i64,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, SettlementDatabaseError> {
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(conn)
            .await?;
    result.ok_or_else(|| SettlementDatabaseError::OrderNotFound(format!("id {id}")))
}

pub(crate) async fn set_payment_reference(
    id: i64,
    gateway: GatewayId,
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, SettlementDatabaseError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET gateway = $1, transaction_id = $2, updated_at = $3 WHERE id = $4 RETURNING *",
    )
    .bind(gateway)
    .bind(transaction_id)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| SettlementDatabaseError::OrderNotFound(format!("id {id}")))
}

pub async fn add_order_note(
    order_id: i64,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<OrderNote, sqlx::Error> {
    sqlx::query_as("INSERT INTO order_notes (order_id, note, created_at) VALUES ($1, $2, $3) RETURNING *")
        .bind(order_id)
        .bind(note)
        .bind(Utc::now())
        .fetch_one(conn)
        .await
}

pub async fn fetch_order_notes(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderNote>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_notes WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Sum of totals over paid orders (completed or processing) created in the current calendar month, UTC.
pub async fn gmv_for_current_month(conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let start: DateTime<Utc> = month_start(Utc::now());
    let cents: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total), 0) FROM orders WHERE status IN ('completed', 'processing') AND created_at >= $1",
    )
    .bind(start)
    .fetch_one(conn)
    .await?;
    Ok(Money::from_cents(cents))
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::{Datelike, NaiveDate, NaiveTime};
    let date = now.date_naive();
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
    DateTime::from_naive_utc_and_offset(first.and_time(NaiveTime::MIN), Utc)
}
