//! Applies provider payment events to order state and dispatches fulfillment.
//!
//! Every webhook and every EcoCash poll funnels through here, so the status
//! machine and the fulfillment trigger behave identically no matter which
//! channel a confirmation arrives on.

use crate::db;
use crate::db::order_flow::PaidFields;
use crate::error::{AppError, AppResult};
use crate::fulfillment;
use crate::notify;
use crate::orders::{OrderKind, OrderStatus, canonical_status};
use crate::state::AppState;
use crate::util::now_millis;

/// What a reconciliation pass did with a provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Raw status recorded; the canonical transition was refused by the state
    /// machine (stale or out-of-order event).
    Recorded,
    /// Canonical transition applied, no fulfillment due.
    Applied,
    /// Order is paid and fulfillment completed.
    Fulfilled,
    /// Order is paid but fulfillment failed; the order is parked FAILED with
    /// notes and can be retried from the back office.
    FulfillmentFailed,
}

/// Apply one provider status event. `raw_status` is persisted verbatim for
/// audit; `provider_status` is the normalized term fed to the canonical map.
pub async fn apply_provider_status(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
    raw_status: &str,
    provider_status: &str,
    paid: Option<PaidFields>,
) -> AppResult<ReconcileOutcome> {
    let recorded =
        db::order_flow::record_payment_status(&state.pool, kind, order_number, raw_status, now_millis())
            .await?;
    if !recorded {
        return Err(AppError::not_found(format!(
            "{} order {order_number} not found",
            kind.label()
        )));
    }

    let target = canonical_status(provider_status);
    let paid_fields = if target == OrderStatus::Paid { paid } else { None };
    let applied = db::order_flow::apply_status(
        &state.pool,
        kind,
        order_number,
        target,
        paid_fields.as_ref(),
        now_millis(),
    )
    .await?;

    if target != OrderStatus::Paid {
        if !applied {
            tracing::info!(
                order_number = %order_number,
                raw_status = raw_status,
                target = target.as_db(),
                "Status transition refused, raw status recorded"
            );
            return Ok(ReconcileOutcome::Recorded);
        }
        return Ok(ReconcileOutcome::Applied);
    }

    if !applied {
        // PAID was refused (e.g. the order already expired or was refunded).
        // The raw status stays on record; nothing ships.
        tracing::warn!(
            order_number = %order_number,
            raw_status = raw_status,
            "Late payment confirmation refused by state machine"
        );
        return Ok(ReconcileOutcome::Recorded);
    }

    // The delivery claim inside fulfillment is the exactly-once guard; this
    // call is safe to repeat on duplicate confirmations.
    match fulfillment::dispatch(state, kind, order_number).await {
        Ok(()) => Ok(ReconcileOutcome::Fulfilled),
        Err(e) => {
            tracing::error!(
                order_number = %order_number,
                error = %e,
                "Fulfillment failed after payment"
            );
            notify::ops_alert(
                state.alerts.clone(),
                format!("Fulfillment failed for {order_number}"),
                format!("{e}"),
            );
            Ok(ReconcileOutcome::FulfillmentFailed)
        }
    }
}

/// EcoCash semantics: only `SUCCESS` confirms payment. Every other status is
/// informational and recorded as an `ecocash_*` sub-status without moving the
/// order.
pub async fn apply_ecocash_status(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
    status: &str,
    paid: Option<PaidFields>,
) -> AppResult<ReconcileOutcome> {
    let raw = format!("ecocash_{}", status.to_ascii_lowercase().replace(' ', "_"));
    if status.eq_ignore_ascii_case("SUCCESS") {
        return apply_provider_status(state, kind, order_number, &raw, "success", paid).await;
    }

    let recorded =
        db::order_flow::record_payment_status(&state.pool, kind, order_number, &raw, now_millis())
            .await?;
    if !recorded {
        return Err(AppError::not_found(format!(
            "{} order {order_number} not found",
            kind.label()
        )));
    }
    tracing::info!(
        order_number = %order_number,
        ecocash_status = status,
        "EcoCash status recorded (not a confirmation)"
    );
    Ok(ReconcileOutcome::Recorded)
}
