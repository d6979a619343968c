//! Prepaid electricity (ZESA) token orders (`ZESA-` numbers).

use sqlx::SqlitePool;

use crate::util::now_millis;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ZesaOrder {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub meter_number: String,
    /// Mobile number that receives the token SMS.
    pub notify_number: String,
    /// Electricity credit bought, before markup.
    pub token_amount: f64,
    pub markup_rate: f64,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub paid_at: Option<i64>,
    pub paid_amount: Option<f64>,
    pub paid_currency: Option<String>,
    pub delivered: bool,
    pub delivered_at: Option<i64>,
    pub delivery_response: Option<String>,
    pub delivery_notes: Option<String>,
    pub ecocash_msisdn: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct NewZesaOrder<'a> {
    pub id: &'a str,
    pub order_number: &'a str,
    pub customer_id: &'a str,
    pub meter_number: &'a str,
    pub notify_number: &'a str,
    pub token_amount: f64,
    pub markup_rate: f64,
    pub amount: f64,
    pub currency: &'a str,
    pub payment_method: &'a str,
}

const COLUMNS: &str = "id, order_number, customer_id, meter_number, notify_number, \
                       token_amount, markup_rate, amount, currency, status, payment_method, \
                       payment_id, payment_status, paid_at, paid_amount, paid_currency, \
                       delivered, delivered_at, delivery_response, delivery_notes, \
                       ecocash_msisdn, created_at, updated_at";

pub async fn create(pool: &SqlitePool, order: &NewZesaOrder<'_>) -> Result<(), sqlx::Error> {
    let now = now_millis();
    sqlx::query(
        "INSERT INTO zesa_orders (id, order_number, customer_id, meter_number, notify_number, \
         token_amount, markup_rate, amount, currency, payment_method, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
    )
    .bind(order.id)
    .bind(order.order_number)
    .bind(order.customer_id)
    .bind(order.meter_number)
    .bind(order.notify_number)
    .bind(order.token_amount)
    .bind(order.markup_rate)
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.payment_method)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_order_number(
    pool: &SqlitePool,
    order_number: &str,
) -> Result<Option<ZesaOrder>, sqlx::Error> {
    sqlx::query_as::<_, ZesaOrder>(&format!(
        "SELECT {COLUMNS} FROM zesa_orders WHERE order_number = ?1"
    ))
    .bind(order_number)
    .fetch_optional(pool)
    .await
}

pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<ZesaOrder>, sqlx::Error> {
    sqlx::query_as::<_, ZesaOrder>(&format!(
        "SELECT {COLUMNS} FROM zesa_orders ORDER BY created_at DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}
