//! Event ticket checkout: line items priced per ticket type and expanded to
//! one issued ticket per seat at order creation time.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::{
    CheckoutResponse, ORDER_NUMBER_ATTEMPTS, finalize, next_order_number, phone_contact,
    require_email,
};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::money;
use crate::orders::{OrderKind, PaymentMethod};
use crate::state::AppState;
use crate::tickets as ticket_artifacts;
use crate::util::{new_id, now_millis};

/// Seats per order, across all line items.
const MAX_TICKETS_PER_ORDER: u32 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCheckoutRequest {
    pub email: String,
    #[serde(default)]
    pub contact_method: Option<String>,
    #[serde(default)]
    pub contact_value: Option<String>,
    pub payment_method: String,
    pub event_slug: String,
    pub items: Vec<TicketLineItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketLineItem {
    pub ticket_type_id: String,
    pub quantity: u32,
    /// Optional, at most one name per seat.
    #[serde(default)]
    pub attendee_names: Vec<String>,
}

struct PricedLine {
    type_id: String,
    type_name: String,
    quantity: u32,
    attendee_names: Vec<String>,
}

pub async fn checkout(
    state: &AppState,
    request: TicketCheckoutRequest,
) -> AppResult<CheckoutResponse> {
    let email = require_email(&request.email)?;
    let method = PaymentMethod::parse(&request.payment_method)?;

    let payer = phone_contact(
        request.contact_method.as_deref(),
        request.contact_value.as_deref(),
    );
    if method == PaymentMethod::Ecocash && payer.is_none() {
        return Err(AppError::validation(
            "a phone contact is required for EcoCash payments",
        ));
    }

    let event = db::events::find_by_slug(&state.pool, &request.event_slug)
        .await?
        .filter(|e| e.published && e.active)
        .ok_or_else(|| AppError::validation("event not found or not on sale"))?;

    if request.items.is_empty() {
        return Err(AppError::validation("at least one ticket is required"));
    }

    let mut lines = Vec::with_capacity(request.items.len());
    let mut total = Decimal::ZERO;
    let mut seats: u32 = 0;
    for item in &request.items {
        if item.quantity == 0 {
            return Err(AppError::validation("ticket quantity must be at least 1"));
        }
        if item.attendee_names.len() > item.quantity as usize {
            return Err(AppError::validation(
                "more attendee names than tickets requested",
            ));
        }
        let ticket_type = db::events::find_ticket_type(&state.pool, &item.ticket_type_id)
            .await?
            .filter(|t| t.active && t.event_id == event.id)
            .ok_or_else(|| AppError::validation("ticket type not found for this event"))?;

        seats += item.quantity;
        total += money::to_decimal(ticket_type.price) * Decimal::from(item.quantity);
        lines.push(PricedLine {
            type_id: ticket_type.id,
            type_name: ticket_type.name,
            quantity: item.quantity,
            attendee_names: item.attendee_names.clone(),
        });
    }
    if seats > MAX_TICKETS_PER_ORDER {
        return Err(AppError::validation(format!(
            "at most {MAX_TICKETS_PER_ORDER} tickets per order"
        )));
    }
    let amount = money::to_f64(total);

    let customer = db::customers::find_or_create(
        &state.pool,
        email,
        request.contact_method.as_deref(),
        request.contact_value.as_deref(),
    )
    .await?;

    // Codes and QR payloads embed the order number, so each collision retry
    // regenerates the full batch.
    let order_id = new_id();
    let mut attempts = 0u32;
    let order_number = loop {
        let candidate = next_order_number(state, OrderKind::Ticket).await?;

        let mut new_items = Vec::with_capacity(seats as usize);
        for line in &lines {
            for seat in 0..line.quantity {
                let code = ticket_artifacts::generate_ticket_code(now_millis());
                let payload =
                    ticket_artifacts::qr_payload(&candidate, &code, &event.slug, &line.type_name);
                new_items.push(db::tickets::NewTicketItem {
                    ticket_type_id: &line.type_id,
                    ticket_code: code,
                    qr_payload: payload,
                    attendee_name: line
                        .attendee_names
                        .get(seat as usize)
                        .map(|name| name.as_str()),
                });
            }
        }

        let new_order = db::tickets::NewTicketOrder {
            id: &order_id,
            order_number: &candidate,
            customer_id: &customer.id,
            event_id: &event.id,
            amount,
            currency: "USD",
            payment_method: method.as_db(),
        };
        match db::tickets::create_with_items(&state.pool, &new_order, &new_items).await {
            Ok(()) => break candidate,
            Err(e) if db::is_unique_violation(&e) && attempts < ORDER_NUMBER_ATTEMPTS => {
                attempts += 1;
                tracing::warn!(order_number = %candidate, "Ticket order collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    };

    let description = format!("{} x{seats} for {} ({order_number})", event.name, email);
    finalize(
        state,
        OrderKind::Ticket,
        &order_number,
        amount,
        "USD",
        &description,
        email,
        method,
        payer,
    )
    .await
}
