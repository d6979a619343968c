//! Lifecycle queries shared by all four order tables.
//!
//! The tables carry identical payment/delivery columns, so these statements are
//! built against [`OrderKind::table`]. Table names and status strings are
//! compile-time constants; user data only ever travels through binds.

use sqlx::SqlitePool;

use crate::orders::{OrderKind, OrderStatus};

/// Payment evidence attached to a PAID transition. Only fills columns that are
/// still NULL, so the first confirmation wins.
#[derive(Debug, Clone, Default)]
pub struct PaidFields {
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

/// Same-kind orders created inside the given window; used to derive the next
/// daily order-number sequence.
pub async fn count_today(
    pool: &SqlitePool,
    kind: OrderKind,
    start: i64,
    end: i64,
) -> Result<i64, sqlx::Error> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE created_at >= ?1 AND created_at < ?2",
        kind.table()
    );
    sqlx::query_scalar(&sql).bind(start).bind(end).fetch_one(pool).await
}

/// Attach the provider payment reference created at checkout.
pub async fn set_payment_ref(
    pool: &SqlitePool,
    kind: OrderKind,
    order_number: &str,
    payment_id: &str,
    payment_status: &str,
    ecocash_msisdn: Option<&str>,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET payment_id = ?1, payment_status = ?2, ecocash_msisdn = ?3, \
         updated_at = ?4 WHERE order_number = ?5",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(payment_id)
        .bind(payment_status)
        .bind(ecocash_msisdn)
        .bind(now)
        .bind(order_number)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Record the raw provider status for audit. Runs unconditionally, including
/// when the canonical transition is refused.
pub async fn record_payment_status(
    pool: &SqlitePool,
    kind: OrderKind,
    order_number: &str,
    raw_status: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET payment_status = ?1, updated_at = ?2 WHERE order_number = ?3",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(raw_status)
        .bind(now)
        .bind(order_number)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Apply a canonical status transition. The WHERE clause enforces the allowed
/// start states, so a stale or out-of-order event simply affects zero rows.
/// Returns whether the transition was applied.
pub async fn apply_status(
    pool: &SqlitePool,
    kind: OrderKind,
    order_number: &str,
    target: OrderStatus,
    paid: Option<&PaidFields>,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let allowed = target.allowed_from();
    if allowed.is_empty() {
        return Ok(false);
    }
    let from_list = allowed
        .iter()
        .map(|status| format!("'{}'", status.as_db()))
        .collect::<Vec<_>>()
        .join(", ");

    let result = if target == OrderStatus::Paid {
        let fields = paid.cloned().unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET status = 'PAID', paid_at = COALESCE(paid_at, ?1), \
             paid_amount = COALESCE(paid_amount, ?2), \
             paid_currency = COALESCE(paid_currency, ?3), updated_at = ?4 \
             WHERE order_number = ?5 AND status IN ({from_list})",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(now)
            .bind(fields.amount)
            .bind(fields.currency)
            .bind(now)
            .bind(order_number)
            .execute(pool)
            .await?
    } else {
        let sql = format!(
            "UPDATE {} SET status = ?1, updated_at = ?2 \
             WHERE order_number = ?3 AND status IN ({from_list})",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(target.as_db())
            .bind(now)
            .bind(order_number)
            .execute(pool)
            .await?
    };
    Ok(result.rows_affected() > 0)
}

/// Atomically claim an order for delivery. Exactly one caller can move
/// `delivered` from 0 to 1 while the order is PAID; everyone else sees zero
/// rows affected and must not ship.
pub async fn claim_delivery(
    pool: &SqlitePool,
    kind: OrderKind,
    order_number: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET delivered = 1, delivered_at = ?1, updated_at = ?2 \
         WHERE order_number = ?3 AND status = 'PAID' AND delivered = 0",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(order_number)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a successful delivery on a claimed order.
pub async fn finish_delivery(
    pool: &SqlitePool,
    kind: OrderKind,
    order_number: &str,
    delivery_response: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET status = 'DELIVERED', delivery_response = ?1, updated_at = ?2 \
         WHERE order_number = ?3",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(delivery_response)
        .bind(now)
        .bind(order_number)
        .execute(pool)
        .await?;
    Ok(())
}

/// Roll a failed delivery attempt back so the order can be retried: the claim
/// is released and the order is parked at FAILED with the failure note.
pub async fn revert_delivery(
    pool: &SqlitePool,
    kind: OrderKind,
    order_number: &str,
    notes: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET delivered = 0, delivered_at = NULL, status = 'FAILED', \
         delivery_notes = ?1, updated_at = ?2 WHERE order_number = ?3",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(notes)
        .bind(now)
        .bind(order_number)
        .execute(pool)
        .await?;
    Ok(())
}

/// Admin override for the retry path: a FAILED, undelivered order with payment
/// evidence on record goes back to PAID so fulfillment can claim it again.
pub async fn reset_failed_to_paid(
    pool: &SqlitePool,
    kind: OrderKind,
    order_number: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET status = 'PAID', updated_at = ?1 \
         WHERE order_number = ?2 AND status = 'FAILED' AND delivered = 0 \
         AND paid_at IS NOT NULL",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(now)
        .bind(order_number)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Locate an order by the provider payment reference, probing all four tables.
/// Used by callbacks that do not carry our order number.
pub async fn find_by_payment_id(
    pool: &SqlitePool,
    payment_id: &str,
) -> Result<Option<(OrderKind, String)>, sqlx::Error> {
    for kind in OrderKind::all() {
        let sql = format!(
            "SELECT order_number FROM {} WHERE payment_id = ?1",
            kind.table()
        );
        let found: Option<(String,)> = sqlx::query_as(&sql)
            .bind(payment_id)
            .fetch_optional(pool)
            .await?;
        if let Some((order_number,)) = found {
            return Ok(Some((kind, order_number)));
        }
    }
    Ok(None)
}
