//! Back-office endpoints, all behind the `x-admin-key` header.
//!
//! Catalog management, order inspection, fulfillment retries and ticket
//! resends. Single shared key, compared verbatim; rotation means restarting
//! with a new `ADMIN_API_KEY`.

use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use super::catalog::EventWithTypes;
use crate::db;
use crate::db::airtime::AirtimeOrder;
use crate::db::events::{NewEvent, NewTicketType, UpdateEvent};
use crate::db::orders::Order;
use crate::db::products::{NewProduct, Product, UpdateProduct};
use crate::db::zesa::ZesaOrder;
use crate::error::{AppError, AppResult};
use crate::fulfillment;
use crate::money::{require_positive_amount, round_money};
use crate::orders::OrderKind;
use crate::state::AppState;

pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok());
    if provided != Some(state.config.admin_api_key.as_str()) {
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}

fn require_text<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value)
}

// ---- products ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

pub async fn list_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(db::products::list_all(&state.pool).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> AppResult<Json<Product>> {
    let name = require_text(&input.name, "product name")?;
    require_positive_amount(input.price, "price")?;
    let product = db::products::create(
        &state.pool,
        &NewProduct {
            name,
            description: input.description.as_deref(),
            price: round_money(input.price),
            currency: require_text(&input.currency, "currency")?,
        },
    )
    .await?;
    tracing::info!(product_id = %product.id, name = %product.name, "Product created");
    Ok(Json(product))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Product>> {
    db::products::find_by_id(&state.pool, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("product {id} not found")))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ProductInput>,
) -> AppResult<Json<Product>> {
    let name = require_text(&input.name, "product name")?;
    require_positive_amount(input.price, "price")?;
    db::products::update(
        &state.pool,
        &id,
        &UpdateProduct {
            name,
            description: input.description.as_deref(),
            price: round_money(input.price),
            currency: require_text(&input.currency, "currency")?,
            active: input.active,
        },
    )
    .await?
    .map(Json)
    .ok_or_else(|| AppError::not_found(format!("product {id} not found")))
}

pub async fn deactivate_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let removed = db::products::deactivate(&state.pool, &id).await?;
    if !removed {
        return Err(AppError::not_found(format!("product {id} not found")));
    }
    tracing::info!(product_id = %id, "Product deactivated");
    Ok(Json(serde_json::json!({ "success": true })))
}

// ---- events ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeInput {
    pub name: String,
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub venue: String,
    pub city: String,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: Option<i64>,
    #[serde(default)]
    pub published: bool,
    pub ticket_types: Vec<TicketTypeInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub venue: String,
    pub city: String,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: Option<i64>,
    #[serde(default)]
    pub published: bool,
}

fn require_slug(slug: &str) -> AppResult<&str> {
    let slug = slug.trim();
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AppError::validation(
            "slug must be lowercase letters, digits and hyphens",
        ));
    }
    Ok(slug)
}

pub async fn list_events(State(state): State<AppState>) -> AppResult<Json<Vec<EventWithTypes>>> {
    let events = db::events::list_all(&state.pool).await?;
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        let ticket_types = db::events::ticket_types_for(&state.pool, &event.id, false).await?;
        out.push(EventWithTypes {
            event,
            ticket_types,
        });
    }
    Ok(Json(out))
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(input): Json<EventInput>,
) -> AppResult<Json<EventWithTypes>> {
    let slug = require_slug(&input.slug)?;
    let name = require_text(&input.name, "event name")?;
    let venue = require_text(&input.venue, "venue")?;
    let city = require_text(&input.city, "city")?;
    if input.ticket_types.is_empty() {
        return Err(AppError::validation("at least one ticket type is required"));
    }

    let mut ticket_types = Vec::with_capacity(input.ticket_types.len());
    for t in &input.ticket_types {
        require_positive_amount(t.price, "ticket price")?;
        if matches!(t.capacity, Some(c) if c < 1) {
            return Err(AppError::validation("ticket capacity must be at least 1"));
        }
        ticket_types.push(NewTicketType {
            name: require_text(&t.name, "ticket type name")?,
            price: round_money(t.price),
            currency: require_text(&t.currency, "currency")?,
            capacity: t.capacity,
        });
    }

    let created = db::events::create(
        &state.pool,
        &NewEvent {
            slug,
            name,
            description: input.description.as_deref(),
            venue,
            city,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            published: input.published,
        },
        &ticket_types,
    )
    .await;

    let (event, ticket_types) = match created {
        Ok(pair) => pair,
        Err(e) if db::is_unique_violation(&e) => {
            return Err(AppError::validation(format!(
                "an event with slug '{slug}' already exists"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(event_id = %event.id, slug = %event.slug, "Event created");
    Ok(Json(EventWithTypes {
        event,
        ticket_types,
    }))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EventWithTypes>> {
    let event = db::events::find_by_id(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("event {id} not found")))?;
    let ticket_types = db::events::ticket_types_for(&state.pool, &event.id, false).await?;
    Ok(Json(EventWithTypes {
        event,
        ticket_types,
    }))
}

pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<EventUpdateInput>,
) -> AppResult<Json<EventWithTypes>> {
    let event = db::events::update(
        &state.pool,
        &id,
        &UpdateEvent {
            name: require_text(&input.name, "event name")?,
            description: input.description.as_deref(),
            venue: require_text(&input.venue, "venue")?,
            city: require_text(&input.city, "city")?,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            published: input.published,
        },
    )
    .await?
    .ok_or_else(|| AppError::not_found(format!("event {id} not found")))?;
    let ticket_types = db::events::ticket_types_for(&state.pool, &event.id, false).await?;
    Ok(Json(EventWithTypes {
        event,
        ticket_types,
    }))
}

pub async fn deactivate_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let removed = db::events::deactivate(&state.pool, &id).await?;
    if !removed {
        return Err(AppError::not_found(format!("event {id} not found")));
    }
    tracing::info!(event_id = %id, "Event deactivated");
    Ok(Json(serde_json::json!({ "success": true })))
}

// ---- orders ----

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

impl ListQuery {
    fn limit(&self) -> i64 {
        self.limit.clamp(1, 500)
    }
}

pub async fn list_product_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(
        db::orders::list_recent(&state.pool, query.limit()).await?,
    ))
}

pub async fn get_product_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<Order>> {
    db::orders::find_by_order_number(&state.pool, &order_number)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("order {order_number} not found")))
}

pub async fn list_airtime_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<AirtimeOrder>>> {
    Ok(Json(
        db::airtime::list_recent(&state.pool, query.limit()).await?,
    ))
}

pub async fn get_airtime_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<AirtimeOrder>> {
    db::airtime::find_by_order_number(&state.pool, &order_number)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("airtime order {order_number} not found")))
}

pub async fn list_zesa_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<ZesaOrder>>> {
    Ok(Json(
        db::zesa::list_recent(&state.pool, query.limit()).await?,
    ))
}

pub async fn get_zesa_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<ZesaOrder>> {
    db::zesa::find_by_order_number(&state.pool, &order_number)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("zesa order {order_number} not found")))
}

pub async fn list_ticket_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<db::tickets::TicketOrder>>> {
    Ok(Json(
        db::tickets::list_recent(&state.pool, query.limit()).await?,
    ))
}

pub async fn get_ticket_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let detail = db::tickets::find_detail(&state.pool, &order_number)
        .await?
        .ok_or_else(|| AppError::not_found(format!("ticket order {order_number} not found")))?;
    Ok(Json(serde_json::json!({
        "order": detail.order,
        "customer": detail.customer,
        "event": detail.event,
        "items": detail.items,
    })))
}

// ---- fulfillment retries ----

async fn retry_order(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
) -> AppResult<Json<serde_json::Value>> {
    let order = fulfillment::retry(state, kind, order_number).await?;
    Ok(Json(serde_json::json!({ "success": true, "order": order })))
}

pub async fn retry_product_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    retry_order(&state, OrderKind::Product, &order_number).await
}

pub async fn retry_airtime_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    retry_order(&state, OrderKind::Airtime, &order_number).await
}

pub async fn retry_zesa_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    retry_order(&state, OrderKind::Zesa, &order_number).await
}

pub async fn retry_ticket_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    retry_order(&state, OrderKind::Ticket, &order_number).await
}

/// Re-send the ticket email for an order that was already delivered, for
/// customers who lost the original. Does not touch delivery state.
pub async fn resend_tickets(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let detail = db::tickets::find_detail(&state.pool, &order_number)
        .await?
        .ok_or_else(|| AppError::not_found(format!("ticket order {order_number} not found")))?;
    if !detail.order.delivered {
        return Err(AppError::validation(
            "tickets can only be resent after delivery",
        ));
    }

    let count = fulfillment::delivery::issue_tickets(&state, &detail).await?;
    tracing::info!(
        order_number = %order_number,
        tickets = count,
        "Ticket email re-sent"
    );
    Ok(Json(serde_json::json!({
        "success": true,
        "ticketsEmailed": count,
    })))
}
