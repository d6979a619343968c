//! Event ticket orders (`EVT-` numbers) and their per-seat items.

use sqlx::SqlitePool;

use super::customers::Customer;
use super::events::Event;
use crate::util::{new_id, now_millis};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketOrder {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub event_id: String,
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

/// One issued ticket, joined with its ticket-type name for rendering.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketItem {
    pub id: String,
    pub ticket_order_id: String,
    pub ticket_type_id: String,
    pub ticket_code: String,
    pub qr_payload: String,
    pub attendee_name: Option<String>,
    pub redeemed: bool,
    pub redeemed_at: Option<i64>,
    pub ticket_type_name: String,
}

pub struct NewTicketOrder<'a> {
    pub id: &'a str,
    pub order_number: &'a str,
    pub customer_id: &'a str,
    pub event_id: &'a str,
    pub amount: f64,
    pub currency: &'a str,
    pub payment_method: &'a str,
}

pub struct NewTicketItem<'a> {
    pub ticket_type_id: &'a str,
    pub ticket_code: String,
    pub qr_payload: String,
    pub attendee_name: Option<&'a str>,
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, event_id, amount, currency, status, \
                             payment_method, payment_id, payment_status, paid_at, paid_amount, \
                             paid_currency, delivered, delivered_at, delivery_response, \
                             delivery_notes, ecocash_msisdn, created_at, updated_at";

/// Insert the order and all of its items in one transaction so a failure never
/// leaves a ticket order without seats.
pub async fn create_with_items(
    pool: &SqlitePool,
    order: &NewTicketOrder<'_>,
    items: &[NewTicketItem<'_>],
) -> Result<(), sqlx::Error> {
    let now = now_millis();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO ticket_orders (id, order_number, customer_id, event_id, amount, currency, \
         payment_method, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
    )
    .bind(order.id)
    .bind(order.order_number)
    .bind(order.customer_id)
    .bind(order.event_id)
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.payment_method)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for item in items {
        sqlx::query(
            "INSERT INTO ticket_order_items (id, ticket_order_id, ticket_type_id, ticket_code, \
             qr_payload, attendee_name) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(new_id())
        .bind(order.id)
        .bind(item.ticket_type_id)
        .bind(&item.ticket_code)
        .bind(&item.qr_payload)
        .bind(item.attendee_name)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

pub async fn find_by_order_number(
    pool: &SqlitePool,
    order_number: &str,
) -> Result<Option<TicketOrder>, sqlx::Error> {
    sqlx::query_as::<_, TicketOrder>(&format!(
        "SELECT {ORDER_COLUMNS} FROM ticket_orders WHERE order_number = ?1"
    ))
    .bind(order_number)
    .fetch_optional(pool)
    .await
}

pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<TicketOrder>, sqlx::Error> {
    sqlx::query_as::<_, TicketOrder>(&format!(
        "SELECT {ORDER_COLUMNS} FROM ticket_orders ORDER BY created_at DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn items_for_order(
    pool: &SqlitePool,
    ticket_order_id: &str,
) -> Result<Vec<TicketItem>, sqlx::Error> {
    sqlx::query_as::<_, TicketItem>(
        "SELECT i.id, i.ticket_order_id, i.ticket_type_id, i.ticket_code, i.qr_payload, \
         i.attendee_name, i.redeemed, i.redeemed_at, t.name AS ticket_type_name \
         FROM ticket_order_items i \
         JOIN event_ticket_types t ON t.id = i.ticket_type_id \
         WHERE i.ticket_order_id = ?1 \
         ORDER BY i.ticket_code",
    )
    .bind(ticket_order_id)
    .fetch_all(pool)
    .await
}

/// Everything ticket issuance needs in one load.
#[derive(Debug, Clone)]
pub struct TicketOrderDetail {
    pub order: TicketOrder,
    pub customer: Customer,
    pub event: Event,
    pub items: Vec<TicketItem>,
}

pub async fn find_detail(
    pool: &SqlitePool,
    order_number: &str,
) -> Result<Option<TicketOrderDetail>, sqlx::Error> {
    let Some(order) = find_by_order_number(pool, order_number).await? else {
        return Ok(None);
    };
    let Some(customer) = super::customers::find_by_id(pool, &order.customer_id).await? else {
        return Ok(None);
    };
    let Some(event) = super::events::find_by_id(pool, &order.event_id).await? else {
        return Ok(None);
    };
    let items = items_for_order(pool, &order.id).await?;
    Ok(Some(TicketOrderDetail {
        order,
        customer,
        event,
        items,
    }))
}
