//! Client-driven EcoCash status polling.
//!
//! The push-payment flow has no signed webhook, so the storefront polls these
//! endpoints while the customer approves the prompt on their handset. Each
//! poll asks the gateway for the transaction status and feeds the answer
//! through the same reconciliation pipeline a webhook would use, so a poll
//! that discovers `SUCCESS` also triggers fulfillment.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use crate::db;
use crate::db::order_flow::PaidFields;
use crate::error::{AppError, AppResult};
use crate::fulfillment;
use crate::orders::{OrderKind, OrderStatus, PaymentMethod};
use crate::reconcile;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPollRequest {
    pub order_number: String,
}

/// The payment-relevant slice of an order row, independent of kind.
struct PollTarget {
    status: String,
    payment_method: String,
    payment_id: Option<String>,
    ecocash_msisdn: Option<String>,
    amount: f64,
    currency: String,
}

pub async fn order_status(
    State(state): State<AppState>,
    Json(request): Json<StatusPollRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let order = db::orders::find_by_order_number(&state.pool, &request.order_number)
        .await?
        .ok_or_else(|| AppError::not_found(format!("order {} not found", request.order_number)))?;
    let target = PollTarget {
        status: order.status,
        payment_method: order.payment_method,
        payment_id: order.payment_id,
        ecocash_msisdn: order.ecocash_msisdn,
        amount: order.amount,
        currency: order.currency,
    };
    poll(&state, OrderKind::Product, &request.order_number, target).await
}

pub async fn airtime_status(
    State(state): State<AppState>,
    Json(request): Json<StatusPollRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let order = db::airtime::find_by_order_number(&state.pool, &request.order_number)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("airtime order {} not found", request.order_number))
        })?;
    let target = PollTarget {
        status: order.status,
        payment_method: order.payment_method,
        payment_id: order.payment_id,
        ecocash_msisdn: order.ecocash_msisdn,
        amount: order.amount,
        currency: order.currency,
    };
    poll(&state, OrderKind::Airtime, &request.order_number, target).await
}

pub async fn zesa_status(
    State(state): State<AppState>,
    Json(request): Json<StatusPollRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let order = db::zesa::find_by_order_number(&state.pool, &request.order_number)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("zesa order {} not found", request.order_number))
        })?;
    let target = PollTarget {
        status: order.status,
        payment_method: order.payment_method,
        payment_id: order.payment_id,
        ecocash_msisdn: order.ecocash_msisdn,
        amount: order.amount,
        currency: order.currency,
    };
    poll(&state, OrderKind::Zesa, &request.order_number, target).await
}

pub async fn ticket_status(
    State(state): State<AppState>,
    Json(request): Json<StatusPollRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let order = db::tickets::find_by_order_number(&state.pool, &request.order_number)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("ticket order {} not found", request.order_number))
        })?;
    let target = PollTarget {
        status: order.status,
        payment_method: order.payment_method,
        payment_id: order.payment_id,
        ecocash_msisdn: order.ecocash_msisdn,
        amount: order.amount,
        currency: order.currency,
    };
    poll(&state, OrderKind::Ticket, &request.order_number, target).await
}

async fn poll(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
    target: PollTarget,
) -> AppResult<Json<serde_json::Value>> {
    // Only orders still waiting on payment hit the gateway; settled orders
    // answer straight from the database.
    let awaiting = matches!(
        OrderStatus::from_db(&target.status),
        Some(OrderStatus::Pending | OrderStatus::Processing | OrderStatus::PartiallyPaid)
    );
    if !awaiting {
        return poll_response(state, kind, order_number).await;
    }

    if target.payment_method != PaymentMethod::Ecocash.as_db() {
        return Err(AppError::validation(format!(
            "{order_number} is not an EcoCash order"
        )));
    }
    let (Some(payment_id), Some(msisdn)) = (target.payment_id, target.ecocash_msisdn) else {
        return Err(AppError::validation(format!(
            "{order_number} has no EcoCash payment attached"
        )));
    };

    let status = state.ecocash.transaction_status(&msisdn, &payment_id).await?;
    tracing::info!(
        order_number = %order_number,
        ecocash_status = %status,
        "EcoCash poll answered"
    );

    // The push amount is the order amount; EcoCash does not echo it back.
    let paid = PaidFields {
        amount: Some(target.amount),
        currency: Some(target.currency),
    };
    reconcile::apply_ecocash_status(state, kind, order_number, &status, Some(paid)).await?;

    poll_response(state, kind, order_number).await
}

async fn poll_response(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
) -> AppResult<Json<serde_json::Value>> {
    let order = fulfillment::load_json(state, kind, order_number).await?;
    let status = order
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or(OrderStatus::Pending.as_db())
        .to_string();
    Ok(Json(serde_json::json!({
        "success": true,
        "status": status,
        "order": order,
    })))
}
