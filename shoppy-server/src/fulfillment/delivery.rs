//! Email-based fulfillment: digital product confirmations and ticket issuance.

use crate::db;
use crate::db::orders::Order;
use crate::db::tickets::{TicketOrder, TicketOrderDetail};
use crate::email::{InlineImage, TicketEmail};
use crate::error::{AppError, AppResult};
use crate::orders::{OrderKind, OrderStatus};
use crate::state::AppState;
use crate::tickets::pdf::TicketPage;
use crate::tickets::{self, TicketError};
use crate::util::now_millis;

pub async fn fulfill_product(state: &AppState, order_number: &str) -> AppResult<Order> {
    let load = || async {
        db::orders::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_number} not found")))
    };

    let order = load().await?;
    if order.delivered || order.status != OrderStatus::Paid.as_db() {
        return Ok(order);
    }

    let product = db::products::find_by_id(&state.pool, &order.product_id)
        .await?
        .ok_or_else(|| {
            AppError::internal(format!("order {order_number} references a missing product"))
        })?;
    let customer = db::customers::find_by_id(&state.pool, &order.customer_id)
        .await?
        .ok_or_else(|| {
            AppError::internal(format!("order {order_number} references a missing customer"))
        })?;

    let claimed =
        db::order_flow::claim_delivery(&state.pool, OrderKind::Product, order_number, now_millis())
            .await?;
    if !claimed {
        return load().await;
    }

    let subject = format!("Your Shoppy order {order_number}");
    let body = format!(
        "Thank you for your purchase.\n\nOrder: {order_number}\nItem: {}\nAmount: {:.2} {}\n\n\
         We are provisioning your purchase and will follow up on this address.",
        product.name, order.amount, order.currency
    );

    match state.mailer.send_text(&customer.email, &subject, &body).await {
        Ok(()) => {
            let response = serde_json::json!({ "emailedTo": customer.email }).to_string();
            db::order_flow::finish_delivery(
                &state.pool,
                OrderKind::Product,
                order_number,
                &response,
                now_millis(),
            )
            .await?;
            tracing::info!(order_number = %order_number, "Product order delivered");
            load().await
        }
        Err(e) => {
            db::order_flow::revert_delivery(
                &state.pool,
                OrderKind::Product,
                order_number,
                &e.to_string(),
                now_millis(),
            )
            .await?;
            Err(AppError::internal(format!("delivery email failed: {e}")))
        }
    }
}

pub async fn fulfill_tickets(state: &AppState, order_number: &str) -> AppResult<TicketOrder> {
    let load = || async {
        db::tickets::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("ticket order {order_number} not found")))
    };

    let order = load().await?;
    if order.delivered || order.status != OrderStatus::Paid.as_db() {
        return Ok(order);
    }

    let detail = db::tickets::find_detail(&state.pool, order_number)
        .await?
        .ok_or_else(|| {
            AppError::internal(format!(
                "ticket order {order_number} is missing its event or customer"
            ))
        })?;

    let claimed =
        db::order_flow::claim_delivery(&state.pool, OrderKind::Ticket, order_number, now_millis())
            .await?;
    if !claimed {
        return load().await;
    }

    match issue_tickets(state, &detail).await {
        Ok(count) => {
            let response = serde_json::json!({
                "ticketsEmailed": count,
                "to": detail.customer.email,
            })
            .to_string();
            db::order_flow::finish_delivery(
                &state.pool,
                OrderKind::Ticket,
                order_number,
                &response,
                now_millis(),
            )
            .await?;
            tracing::info!(
                order_number = %order_number,
                tickets = count,
                "Tickets delivered"
            );
            load().await
        }
        Err(e) => {
            db::order_flow::revert_delivery(
                &state.pool,
                OrderKind::Ticket,
                order_number,
                &e.to_string(),
                now_millis(),
            )
            .await?;
            Err(e)
        }
    }
}

/// Render QR PNGs and the PDF, then send the ticket email. Carries no delivery
/// guard of its own: fulfillment owns the claim, and the admin resend path
/// reuses this for orders that were already delivered.
pub async fn issue_tickets(state: &AppState, detail: &TicketOrderDetail) -> AppResult<usize> {
    let starts_at = format_event_time(detail.event.starts_at);

    let mut inline_images = Vec::with_capacity(detail.items.len());
    let mut pages = Vec::with_capacity(detail.items.len());
    for (index, item) in detail.items.iter().enumerate() {
        let png = tickets::qr_png(&item.qr_payload).map_err(ticket_error)?;
        inline_images.push(InlineImage {
            content_id: format!("qr-{index}"),
            filename: format!("{}.png", item.ticket_code),
            png,
        });
        pages.push(TicketPage {
            event_name: &detail.event.name,
            venue: &detail.event.venue,
            city: &detail.event.city,
            starts_at: &starts_at,
            ticket_type: &item.ticket_type_name,
            ticket_code: &item.ticket_code,
            attendee: item.attendee_name.as_deref(),
            qr_payload: &item.qr_payload,
        });
    }

    let pdf =
        tickets::pdf::render_ticket_pdf(&detail.order.order_number, &pages).map_err(ticket_error)?;

    let email = TicketEmail {
        to: detail.customer.email.clone(),
        subject: format!("Your tickets for {}", detail.event.name),
        html_body: ticket_email_html(detail, &starts_at),
        inline_images,
        pdf_name: format!("tickets-{}.pdf", detail.order.order_number),
        pdf,
    };

    state
        .mailer
        .send_tickets(&email)
        .await
        .map_err(|e| AppError::internal(format!("ticket email failed: {e}")))?;

    Ok(detail.items.len())
}

fn ticket_error(error: TicketError) -> AppError {
    AppError::internal(error.to_string())
}

fn format_event_time(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%a %d %b %Y, %H:%M")
            .to_string(),
        None => "TBA".to_string(),
    }
}

fn ticket_email_html(detail: &TicketOrderDetail, starts_at: &str) -> String {
    let mut blocks = String::new();
    for (index, item) in detail.items.iter().enumerate() {
        let attendee = item
            .attendee_name
            .as_deref()
            .map(|name| format!(" &middot; {name}"))
            .unwrap_or_default();
        blocks.push_str(&format!(
            "<div style=\"margin:24px 0\">\
             <p><strong>{}</strong>{attendee}</p>\
             <p style=\"font-family:monospace\">{}</p>\
             <img src=\"cid:qr-{index}\" alt=\"{}\" width=\"220\" height=\"220\">\
             </div>",
            item.ticket_type_name, item.ticket_code, item.ticket_code,
        ));
    }

    format!(
        "<html><body style=\"font-family:sans-serif\">\
         <h1>{}</h1>\
         <p>{}, {} &middot; {starts_at}</p>\
         <p>Order {} &middot; {} ticket(s)</p>\
         {blocks}\
         <p>A printable PDF is attached. Each code admits one person.</p>\
         </body></html>",
        detail.event.name,
        detail.event.venue,
        detail.event.city,
        detail.order.order_number,
        detail.items.len(),
    )
}
