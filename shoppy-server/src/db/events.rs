//! Events and their ticket types.

use sqlx::SqlitePool;

use crate::util::{new_id, now_millis};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub venue: String,
    pub city: String,
    pub starts_at: i64,
    pub ends_at: Option<i64>,
    pub published: bool,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub capacity: Option<i64>,
    pub active: bool,
}

pub struct NewEvent<'a> {
    pub slug: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub venue: &'a str,
    pub city: &'a str,
    pub starts_at: i64,
    pub ends_at: Option<i64>,
    pub published: bool,
}

pub struct NewTicketType<'a> {
    pub name: &'a str,
    pub price: f64,
    pub currency: &'a str,
    pub capacity: Option<i64>,
}

const EVENT_COLUMNS: &str = "id, slug, name, description, venue, city, starts_at, ends_at, \
                             published, active, created_at, updated_at";
const TYPE_COLUMNS: &str = "id, event_id, name, price, currency, capacity, active";

/// Create an event together with its ticket types in one transaction.
pub async fn create(
    pool: &SqlitePool,
    event: &NewEvent<'_>,
    ticket_types: &[NewTicketType<'_>],
) -> Result<(Event, Vec<TicketType>), sqlx::Error> {
    let event_id = new_id();
    let now = now_millis();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO events (id, slug, name, description, venue, city, starts_at, ends_at, \
         published, active, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
    )
    .bind(&event_id)
    .bind(event.slug)
    .bind(event.name)
    .bind(event.description)
    .bind(event.venue)
    .bind(event.city)
    .bind(event.starts_at)
    .bind(event.ends_at)
    .bind(event.published)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for ticket_type in ticket_types {
        sqlx::query(
            "INSERT INTO event_ticket_types (id, event_id, name, price, currency, capacity, active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
        )
        .bind(new_id())
        .bind(&event_id)
        .bind(ticket_type.name)
        .bind(ticket_type.price)
        .bind(ticket_type.currency)
        .bind(ticket_type.capacity)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let created = sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"
    ))
    .bind(&event_id)
    .fetch_one(pool)
    .await?;
    let types = ticket_types_for(pool, &event_id, false).await?;
    Ok((created, types))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE slug = ?1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await
}

/// Storefront view: published, active, soonest first.
pub async fn list_published(pool: &SqlitePool) -> Result<Vec<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE published = 1 AND active = 1 ORDER BY starts_at"
    ))
    .fetch_all(pool)
    .await
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events ORDER BY starts_at DESC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn ticket_types_for(
    pool: &SqlitePool,
    event_id: &str,
    active_only: bool,
) -> Result<Vec<TicketType>, sqlx::Error> {
    let sql = if active_only {
        format!(
            "SELECT {TYPE_COLUMNS} FROM event_ticket_types \
             WHERE event_id = ?1 AND active = 1 ORDER BY price"
        )
    } else {
        format!("SELECT {TYPE_COLUMNS} FROM event_ticket_types WHERE event_id = ?1 ORDER BY price")
    };
    sqlx::query_as::<_, TicketType>(&sql)
        .bind(event_id)
        .fetch_all(pool)
        .await
}

pub async fn find_ticket_type(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<TicketType>, sqlx::Error> {
    sqlx::query_as::<_, TicketType>(&format!(
        "SELECT {TYPE_COLUMNS} FROM event_ticket_types WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub struct UpdateEvent<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub venue: &'a str,
    pub city: &'a str,
    pub starts_at: i64,
    pub ends_at: Option<i64>,
    pub published: bool,
}

pub async fn update(
    pool: &SqlitePool,
    id: &str,
    update: &UpdateEvent<'_>,
) -> Result<Option<Event>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE events SET name = ?1, description = ?2, venue = ?3, city = ?4, \
         starts_at = ?5, ends_at = ?6, published = ?7, updated_at = ?8 WHERE id = ?9",
    )
    .bind(update.name)
    .bind(update.description)
    .bind(update.venue)
    .bind(update.city)
    .bind(update.starts_at)
    .bind(update.ends_at)
    .bind(update.published)
    .bind(now_millis())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(pool, id).await
}

pub async fn deactivate(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE events SET active = 0, published = 0, updated_at = ?1 WHERE id = ?2")
            .bind(now_millis())
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}
