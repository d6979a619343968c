//! Customer records, deduplicated by email.

use sqlx::SqlitePool;

use crate::util::{new_id, now_millis};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub contact_method: Option<String>,
    pub contact_value: Option<String>,
    pub created_at: i64,
}

/// Look a customer up by email, creating the row on first contact. A supplied
/// alternate contact refreshes whatever was stored before.
pub async fn find_or_create(
    pool: &SqlitePool,
    email: &str,
    contact_method: Option<&str>,
    contact_value: Option<&str>,
) -> Result<Customer, sqlx::Error> {
    sqlx::query(
        "INSERT INTO customers (id, email, contact_method, contact_value, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(email) DO NOTHING",
    )
    .bind(new_id())
    .bind(email)
    .bind(contact_method)
    .bind(contact_value)
    .bind(now_millis())
    .execute(pool)
    .await?;

    if contact_method.is_some() {
        sqlx::query("UPDATE customers SET contact_method = ?1, contact_value = ?2 WHERE email = ?3")
            .bind(contact_method)
            .bind(contact_value)
            .bind(email)
            .execute(pool)
            .await?;
    }

    sqlx::query_as::<_, Customer>(
        "SELECT id, email, contact_method, contact_value, created_at \
         FROM customers WHERE email = ?1",
    )
    .bind(email)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Customer>, sqlx::Error> {
    sqlx::query_as::<_, Customer>(
        "SELECT id, email, contact_method, contact_value, created_at \
         FROM customers WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
