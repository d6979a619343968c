//! Digital product catalog.

use sqlx::SqlitePool;

use crate::util::{new_id, now_millis};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub currency: String,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct NewProduct<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub price: f64,
    pub currency: &'a str,
}

const COLUMNS: &str = "id, name, description, price, currency, active, created_at, updated_at";

pub async fn create(pool: &SqlitePool, product: &NewProduct<'_>) -> Result<Product, sqlx::Error> {
    let id = new_id();
    let now = now_millis();
    sqlx::query(
        "INSERT INTO products (id, name, description, price, currency, active, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
    )
    .bind(&id)
    .bind(product.name)
    .bind(product.description)
    .bind(product.price)
    .bind(product.currency)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, Product>(&format!("SELECT {COLUMNS} FROM products WHERE id = ?1"))
        .bind(&id)
        .fetch_one(pool)
        .await
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!("SELECT {COLUMNS} FROM products WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Storefront view: active products only.
pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {COLUMNS} FROM products WHERE active = 1 ORDER BY name"
    ))
    .fetch_all(pool)
    .await
}

/// Back-office view: everything, newest first.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {COLUMNS} FROM products ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await
}

pub struct UpdateProduct<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub price: f64,
    pub currency: &'a str,
    pub active: bool,
}

pub async fn update(
    pool: &SqlitePool,
    id: &str,
    update: &UpdateProduct<'_>,
) -> Result<Option<Product>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE products SET name = ?1, description = ?2, price = ?3, currency = ?4, \
         active = ?5, updated_at = ?6 WHERE id = ?7",
    )
    .bind(update.name)
    .bind(update.description)
    .bind(update.price)
    .bind(update.currency)
    .bind(update.active)
    .bind(now_millis())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(pool, id).await
}

/// Soft delete: the product disappears from the storefront but stays
/// referenced by past orders.
pub async fn deactivate(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE products SET active = 0, updated_at = ?1 WHERE id = ?2")
        .bind(now_millis())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
