//! Webhook delivery dedupe.

use sqlx::SqlitePool;

/// Record a webhook delivery key. Returns `true` when the key is new and the
/// event should be processed, `false` when this exact delivery was seen before.
pub async fn record_once(
    pool: &SqlitePool,
    event_key: &str,
    provider: &str,
    received_at: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO processed_webhook_events (event_key, provider, received_at) \
         VALUES (?1, ?2, ?3) \
         ON CONFLICT DO NOTHING",
    )
    .bind(event_key)
    .bind(provider)
    .bind(received_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
