//! Exactly-once delivery of paid orders.
//!
//! Every path runs the same shape: load, pre-check, atomically claim the
//! delivery flag, call the provider, then either finish (DELIVERED) or roll the
//! claim back (FAILED + notes). The claim update is the only arbiter under
//! concurrency; the pre-checks just avoid pointless provider traffic.

pub mod delivery;
pub mod recharge;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::orders::OrderKind;
use crate::state::AppState;
use crate::util::now_millis;

pub async fn dispatch(state: &AppState, kind: OrderKind, order_number: &str) -> AppResult<()> {
    match kind {
        OrderKind::Product => delivery::fulfill_product(state, order_number).await.map(|_| ()),
        OrderKind::Airtime => recharge::fulfill_airtime(state, order_number).await.map(|_| ()),
        OrderKind::Zesa => recharge::fulfill_zesa(state, order_number).await.map(|_| ()),
        OrderKind::Ticket => delivery::fulfill_tickets(state, order_number).await.map(|_| ()),
    }
}

/// Back-office retry. A failed delivery parks the order at FAILED; with payment
/// evidence on record this resets it to PAID (the one sanctioned backward move)
/// and reruns fulfillment. Returns the current order state either way, so the
/// operator sees what happened.
pub async fn retry(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
) -> AppResult<serde_json::Value> {
    let reset =
        db::order_flow::reset_failed_to_paid(&state.pool, kind, order_number, now_millis()).await?;
    if reset {
        tracing::info!(
            order_number = %order_number,
            "Failed order reset to PAID for retry"
        );
    }

    if let Err(e) = dispatch(state, kind, order_number).await {
        tracing::warn!(
            order_number = %order_number,
            error = %e,
            "Retry attempt did not deliver"
        );
    }

    load_json(state, kind, order_number).await
}

/// Current order row as JSON, independent of kind.
pub async fn load_json(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
) -> AppResult<serde_json::Value> {
    let not_found =
        || AppError::not_found(format!("{} order {order_number} not found", kind.label()));
    let value = match kind {
        OrderKind::Product => db::orders::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(not_found)
            .map(|row| serde_json::to_value(row))?,
        OrderKind::Airtime => db::airtime::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(not_found)
            .map(|row| serde_json::to_value(row))?,
        OrderKind::Zesa => db::zesa::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(not_found)
            .map(|row| serde_json::to_value(row))?,
        OrderKind::Ticket => db::tickets::find_by_order_number(&state.pool, order_number)
            .await?
            .ok_or_else(not_found)
            .map(|row| serde_json::to_value(row))?,
    };
    value.map_err(|e| AppError::internal(format!("order serialization failed: {e}")))
}
