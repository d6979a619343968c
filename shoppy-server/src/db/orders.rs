//! Digital product orders (`SHP-` numbers).

use sqlx::SqlitePool;

use crate::util::now_millis;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub product_id: String,
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

pub struct NewOrder<'a> {
    pub id: &'a str,
    pub order_number: &'a str,
    pub customer_id: &'a str,
    pub product_id: &'a str,
    pub amount: f64,
    pub currency: &'a str,
    pub payment_method: &'a str,
}

const COLUMNS: &str = "id, order_number, customer_id, product_id, amount, currency, status, \
                       payment_method, payment_id, payment_status, paid_at, paid_amount, \
                       paid_currency, delivered, delivered_at, delivery_response, \
                       delivery_notes, ecocash_msisdn, created_at, updated_at";

pub async fn create(pool: &SqlitePool, order: &NewOrder<'_>) -> Result<(), sqlx::Error> {
    let now = now_millis();
    sqlx::query(
        "INSERT INTO orders (id, order_number, customer_id, product_id, amount, currency, \
         payment_method, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
    )
    .bind(order.id)
    .bind(order.order_number)
    .bind(order.customer_id)
    .bind(order.product_id)
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
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {COLUMNS} FROM orders WHERE order_number = ?1"
    ))
    .bind(order_number)
    .fetch_optional(pool)
    .await
}

pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {COLUMNS} FROM orders ORDER BY created_at DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}
