//! Payment provider webhooks.
//!
//! Every handler takes the raw body because signature verification needs the
//! exact bytes. Once a signature is accepted the answer is 200 no matter what
//! the payload does to order state: a non-2xx only makes the provider retry,
//! and retrying a payload we could not act on will never start succeeding.
//! The raw status is recorded and the state machine decides the rest.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::db;
use crate::db::order_flow::PaidFields;
use crate::orders::OrderKind;
use crate::providers::{nowpayments, plisio, verify_hmac_sha256};
use crate::reconcile;
use crate::state::AppState;
use crate::util::now_millis;

fn ok_ack() -> Response {
    Json(serde_json::json!({ "success": true })).into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "invalid signature" })),
    )
        .into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Record-once guard keyed on provider, external id and raw status. Returns
/// false when the event was seen before or the insert failed; either way the
/// caller acks and stops.
async fn first_sighting(state: &AppState, provider: &str, event_key: &str) -> bool {
    match db::webhook_events::record_once(&state.pool, event_key, provider, now_millis()).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::info!(event_key = event_key, "Duplicate webhook event, skipping");
            false
        }
        Err(e) => {
            tracing::error!(%e, event_key = event_key, "DB error recording webhook event");
            false
        }
    }
}

async fn reconcile_event(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
    raw_status: &str,
    provider_status: &str,
    paid: PaidFields,
) {
    if let Err(e) = reconcile::apply_provider_status(
        state,
        kind,
        order_number,
        raw_status,
        provider_status,
        Some(paid),
    )
    .await
    {
        tracing::warn!(
            order_number = %order_number,
            error = %e,
            "Webhook reconciliation did not complete"
        );
    }
}

/// NOWPayments IPN. Signature is a hex HMAC-SHA512 over the body with sorted
/// keys, in the `x-nowpayments-sig` header.
pub async fn nowpayments(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.config.nowpayments_ipn_secret.as_deref() {
        Some(secret) => {
            let Some(sig) = header(&headers, "x-nowpayments-sig") else {
                tracing::warn!("NOWPayments IPN missing signature header");
                return unauthorized();
            };
            if let Err(e) = nowpayments::verify_ipn_signature(&body, sig, secret) {
                tracing::warn!(error = e, "NOWPayments IPN signature rejected");
                return unauthorized();
            }
        }
        None => {
            tracing::warn!("NOWPAYMENTS_IPN_SECRET not set, accepting IPN unverified");
        }
    }

    let payload: nowpayments::IpnPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%e, "NOWPayments IPN payload did not parse");
            return ok_ack();
        }
    };

    let Some(kind) = OrderKind::from_order_number(&payload.order_id) else {
        tracing::warn!(order_id = %payload.order_id, "IPN for unrecognized order number");
        return ok_ack();
    };

    let event_key = format!("nowpayments:{}:{}", payload.payment_id, payload.payment_status);
    if !first_sighting(&state, nowpayments::PROVIDER, &event_key).await {
        return ok_ack();
    }

    tracing::info!(
        order_number = %payload.order_id,
        status = %payload.payment_status,
        "NOWPayments IPN received"
    );

    let paid = PaidFields {
        amount: payload.actually_paid,
        currency: payload.pay_currency.clone(),
    };
    reconcile_event(
        &state,
        kind,
        &payload.order_id,
        &payload.payment_status,
        &payload.payment_status,
        paid,
    )
    .await;
    ok_ack()
}

/// Plisio callback. The HMAC travels inside the JSON body as `verify_hash`,
/// keyed with our API key, so there is no header to check.
pub async fn plisio(State(state): State<AppState>, body: Bytes) -> Response {
    if let Err(e) = plisio::verify_callback(&body, &state.config.plisio_api_key) {
        tracing::warn!(error = e, "Plisio callback signature rejected");
        return unauthorized();
    }

    let payload: plisio::CallbackPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%e, "Plisio callback payload did not parse");
            return ok_ack();
        }
    };

    let Some(kind) = OrderKind::from_order_number(&payload.order_number) else {
        tracing::warn!(
            order_number = %payload.order_number,
            "Plisio callback for unrecognized order number"
        );
        return ok_ack();
    };

    let event_key = format!("plisio:{}:{}", payload.txn_id, payload.status);
    if !first_sighting(&state, plisio::PROVIDER, &event_key).await {
        return ok_ack();
    }

    tracing::info!(
        order_number = %payload.order_number,
        status = %payload.status,
        "Plisio callback received"
    );

    let paid = PaidFields {
        amount: payload.amount.as_deref().and_then(|a| a.parse().ok()),
        currency: payload.currency.clone(),
    };
    let normalized = plisio::normalize_status(&payload.status);
    reconcile_event(
        &state,
        kind,
        &payload.order_number,
        &payload.status,
        normalized,
        paid,
    )
    .await;
    ok_ack()
}

/// Source-agnostic payment event, HMAC-SHA256 signed with our own shared
/// secret in the `x-signature` header. Lets ops confirm a payment by hand and
/// gives smaller rails one integration point.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenericPaymentEvent {
    order_number: String,
    status: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    paid_amount: Option<f64>,
    #[serde(default)]
    paid_currency: Option<String>,
}

pub async fn generic_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.config.payment_webhook_secret.as_deref() {
        Some(secret) => {
            let Some(sig) = header(&headers, "x-signature") else {
                tracing::warn!("Payment webhook missing x-signature header");
                return unauthorized();
            };
            if let Err(e) = verify_hmac_sha256(&body, sig, secret) {
                tracing::warn!(error = e, "Payment webhook signature rejected");
                return unauthorized();
            }
        }
        None => {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, accepting event unverified");
        }
    }

    let payload: GenericPaymentEvent = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%e, "Payment webhook payload did not parse");
            return ok_ack();
        }
    };

    let Some(kind) = OrderKind::from_order_number(&payload.order_number) else {
        tracing::warn!(
            order_number = %payload.order_number,
            "Payment webhook for unrecognized order number"
        );
        return ok_ack();
    };

    let reference = payload
        .reference
        .as_deref()
        .unwrap_or(&payload.order_number);
    let event_key = format!("payment:{reference}:{}", payload.status);
    if !first_sighting(&state, "payment", &event_key).await {
        return ok_ack();
    }

    tracing::info!(
        order_number = %payload.order_number,
        status = %payload.status,
        "Payment webhook received"
    );

    let paid = PaidFields {
        amount: payload.paid_amount,
        currency: payload.paid_currency.clone(),
    };
    reconcile_event(
        &state,
        kind,
        &payload.order_number,
        &payload.status,
        &payload.status,
        paid,
    )
    .await;
    ok_ack()
}

/// EcoCash callback. The gateway offers no signature, so this is advisory
/// only: it is matched to an order through our own push reference and runs
/// through the same status rules as a poll. Worst case a forged call records
/// a bogus sub-status; it cannot mark an order paid except via `SUCCESS`,
/// which the next poll would produce anyway.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcocashCallback {
    source_reference: String,
    transaction_status: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

pub async fn ecocash(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: EcocashCallback = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%e, "EcoCash callback payload did not parse");
            return ok_ack();
        }
    };

    let (kind, order_number) =
        match db::order_flow::find_by_payment_id(&state.pool, &payload.source_reference).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::warn!(
                    reference = %payload.source_reference,
                    "EcoCash callback for unknown reference"
                );
                return ok_ack();
            }
            Err(e) => {
                tracing::error!(%e, "DB error locating EcoCash callback order");
                return ok_ack();
            }
        };

    let event_key = format!(
        "ecocash:{}:{}",
        payload.source_reference, payload.transaction_status
    );
    if !first_sighting(&state, crate::providers::ecocash::PROVIDER, &event_key).await {
        return ok_ack();
    }

    tracing::info!(
        order_number = %order_number,
        status = %payload.transaction_status,
        "EcoCash callback received"
    );

    let paid = PaidFields {
        amount: payload.amount,
        currency: payload.currency.clone(),
    };
    if let Err(e) = reconcile::apply_ecocash_status(
        &state,
        kind,
        &order_number,
        &payload.transaction_status,
        Some(paid),
    )
    .await
    {
        tracing::warn!(
            order_number = %order_number,
            error = %e,
            "EcoCash callback reconciliation did not complete"
        );
    }
    ok_ack()
}
