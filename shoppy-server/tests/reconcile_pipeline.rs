//! Provider events to order state: webhook signatures, idempotency, the
//! status machine, and exactly-once fulfillment.

mod common;

use std::sync::atomic::Ordering;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use common::{seed_product, test_state};
use shoppy_server::api::ecocash as ecocash_api;
use shoppy_server::api::{admin, webhooks};
use shoppy_server::checkout::airtime::{self, AirtimeCheckoutRequest};
use shoppy_server::checkout::product::{self, ProductCheckoutRequest};
use shoppy_server::checkout::zesa::{self, ZesaCheckoutRequest};
use shoppy_server::db;
use shoppy_server::db::order_flow::PaidFields;
use shoppy_server::fulfillment;
use shoppy_server::orders::{OrderKind, OrderStatus};
use shoppy_server::state::AppState;
use shoppy_server::util::now_millis;

// ---- signing helpers ----

fn sign_sha512_sorted(body: &str, secret: &str) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn sign_sha256(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Plisio puts the HMAC inside the body, computed over the sorted remainder.
fn plisio_body(mut value: serde_json::Value, api_key: &str) -> Vec<u8> {
    let sorted = serde_json::to_string(&value).unwrap();
    let hash = sign_sha256(sorted.as_bytes(), api_key);
    value
        .as_object_mut()
        .unwrap()
        .insert("verify_hash".to_string(), serde_json::Value::String(hash));
    serde_json::to_vec(&value).unwrap()
}

fn ipn_body(order_number: &str, status: &str, actually_paid: f64) -> String {
    // serde_json objects serialize with sorted keys, which is exactly the
    // form the IPN signature covers.
    serde_json::json!({
        "payment_id": 7001,
        "payment_status": status,
        "order_id": order_number,
        "actually_paid": actually_paid,
        "pay_currency": "usdttrc20",
    })
    .to_string()
}

async fn send_ipn(state: &AppState, body: &str, secret: &str) -> StatusCode {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-nowpayments-sig",
        sign_sha512_sorted(body, secret).parse().unwrap(),
    );
    let response = webhooks::nowpayments(
        State(state.clone()),
        headers,
        Bytes::from(body.to_string()),
    )
    .await;
    response.status()
}

// ---- order creation helpers ----

async fn crypto_product_order(state: &AppState, price: f64) -> String {
    let product = seed_product(&state.pool, "eBook bundle", price).await;
    let response = product::checkout(
        state,
        ProductCheckoutRequest {
            email: "kuda@example.com".to_string(),
            contact_method: None,
            contact_value: None,
            payment_method: "crypto".to_string(),
            product_id: product.id,
        },
    )
    .await
    .expect("checkout");
    response.order_number
}

async fn ecocash_airtime_order(state: &AppState) -> String {
    let response = airtime::checkout(
        state,
        AirtimeCheckoutRequest {
            email: "kuda@example.com".to_string(),
            contact_method: None,
            contact_value: None,
            payment_method: "ecocash".to_string(),
            network: "econet".to_string(),
            recipient_msisdn: "+263771234567".to_string(),
            airtime_amount: 10.0,
        },
    )
    .await
    .expect("checkout");
    response.order_number
}

async fn ecocash_zesa_order(state: &AppState) -> String {
    let response = zesa::checkout(
        state,
        ZesaCheckoutRequest {
            email: "kuda@example.com".to_string(),
            contact_method: Some("phone".to_string()),
            contact_value: Some("+263771234567".to_string()),
            payment_method: "ecocash".to_string(),
            meter_number: "04123456789".to_string(),
            notify_number: "+263771234567".to_string(),
            token_amount: 20.0,
        },
    )
    .await
    .expect("checkout");
    response.order_number
}

// ---- NOWPayments IPN ----

#[tokio::test]
async fn finished_ipn_confirms_payment_and_delivers() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let body = ipn_body(&order_number, "finished", 19.98);
    let status = send_ipn(&state, &body, "ipn-secret").await;
    assert_eq!(status, StatusCode::OK);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
    assert!(order.delivered);
    assert!(order.paid_at.is_some());
    assert_eq!(order.paid_amount, Some(19.98));
    assert_eq!(order.paid_currency.as_deref(), Some("usdttrc20"));
    assert!(order.delivery_response.unwrap().contains("emailedTo"));

    let mails = rails.mailer.text_mails.lock().unwrap();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].0, "kuda@example.com");
    assert!(mails[0].1.contains(&order_number));
}

#[tokio::test]
async fn finished_ipn_on_airtime_order_recharges_the_face_value() {
    let (state, rails) = test_state().await;
    let response = airtime::checkout(
        &state,
        AirtimeCheckoutRequest {
            email: "kuda@example.com".to_string(),
            contact_method: None,
            contact_value: None,
            payment_method: "crypto".to_string(),
            network: "econet".to_string(),
            recipient_msisdn: "+263771234567".to_string(),
            airtime_amount: 10.0,
        },
    )
    .await
    .expect("checkout");
    assert_eq!(response.amount_to_pay, 10.2);

    let body = ipn_body(&response.order_number, "finished", 10.2);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);

    let order = db::airtime::find_by_order_number(&state.pool, &response.order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
    assert!(order.delivered);

    // The customer paid the marked-up total; the recipient gets the face value.
    assert_eq!(rails.recharge.airtime_calls.load(Ordering::SeqCst), 1);
    let call = rails.recharge.last_airtime.lock().unwrap().clone().unwrap();
    assert_eq!(call.amount, 10.0);
    assert_eq!(call.target_msisdn, "+263771234567");
    assert_eq!(call.agent_reference, response.order_number);
}

#[tokio::test]
async fn ipn_with_bad_signature_is_unauthorized_and_ignored() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let body = ipn_body(&order_number, "finished", 20.0);
    let status = send_ipn(&state, &body, "wrong-secret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "PENDING");
    assert!(!order.delivered);
    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn duplicate_ipn_event_is_processed_once() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let body = ipn_body(&order_number, "finished", 20.0);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);

    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn late_confirmation_keeps_first_payment_evidence() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let body = ipn_body(&order_number, "finished", 19.98);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);

    // A second confirmation with a different raw status clears dedupe but the
    // state machine refuses to re-enter PAID from DELIVERED.
    let body = ipn_body(&order_number, "confirmed", 999.0);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
    assert_eq!(order.paid_amount, Some(19.98));
    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn payment_after_expiry_is_refused() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let body = ipn_body(&order_number, "expired", 0.0);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);

    let body = ipn_body(&order_number, "finished", 20.0);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    // The raw status is on record for audit, but the order never pays out.
    assert_eq!(order.status, "EXPIRED");
    assert_eq!(order.payment_status.as_deref(), Some("finished"));
    assert!(order.paid_at.is_none());
    assert!(!order.delivered);
    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn partial_payment_parks_order_without_fulfillment() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let body = ipn_body(&order_number, "partially_paid", 7.5);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "PARTIALLY_PAID");
    assert!(order.paid_at.is_none());
    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 0);

    // The remainder arriving later still completes the order.
    let body = ipn_body(&order_number, "finished", 20.0);
    assert_eq!(send_ipn(&state, &body, "ipn-secret").await, StatusCode::OK);
    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
}

// ---- Plisio callbacks ----

#[tokio::test]
async fn plisio_completed_callback_delivers() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 12.5).await;

    let body = plisio_body(
        serde_json::json!({
            "txn_id": "plisio-txn-1",
            "order_number": order_number,
            "status": "completed",
            "amount": "12.50",
            "currency": "LTC",
        }),
        "plisio-key",
    );
    let response = webhooks::plisio(State(state.clone()), Bytes::from(body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
    assert_eq!(order.payment_status.as_deref(), Some("completed"));
    assert_eq!(order.paid_amount, Some(12.5));
    assert_eq!(order.paid_currency.as_deref(), Some("LTC"));
    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn plisio_callback_with_bad_hash_is_unauthorized() {
    let (state, _rails) = test_state().await;
    let order_number = crypto_product_order(&state, 12.5).await;

    let body = plisio_body(
        serde_json::json!({
            "txn_id": "plisio-txn-1",
            "order_number": order_number,
            "status": "completed",
        }),
        "some-other-key",
    );
    let response = webhooks::plisio(State(state.clone()), Bytes::from(body)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "PENDING");
}

// ---- generic payment webhook ----

#[tokio::test]
async fn generic_webhook_confirms_with_shared_secret() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let body = serde_json::json!({
        "orderNumber": order_number,
        "status": "paid",
        "reference": "manual-0001",
        "paidAmount": 20.0,
        "paidCurrency": "USD",
    })
    .to_string();

    let mut headers = HeaderMap::new();
    headers.insert(
        "x-signature",
        sign_sha256(body.as_bytes(), "webhook-secret").parse().unwrap(),
    );
    let response = webhooks::generic_payment(
        State(state.clone()),
        headers,
        Bytes::from(body.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 1);

    // Unsigned replay with the wrong key is refused outright.
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-signature",
        sign_sha256(body.as_bytes(), "not-the-secret").parse().unwrap(),
    );
    let response =
        webhooks::generic_payment(State(state.clone()), headers, Bytes::from(body)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---- EcoCash callback and polling ----

#[tokio::test]
async fn ecocash_callback_success_confirms_and_fulfills() {
    let (state, rails) = test_state().await;
    let order_number = ecocash_airtime_order(&state).await;
    let order = db::airtime::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    let reference = order.payment_id.clone().unwrap();

    let body = serde_json::json!({
        "sourceReference": reference,
        "transactionStatus": "SUCCESS",
        "amount": 10.2,
        "currency": "USD",
    })
    .to_string();
    let response = webhooks::ecocash(State(state.clone()), Bytes::from(body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = db::airtime::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
    assert_eq!(order.payment_status.as_deref(), Some("ecocash_success"));
    assert_eq!(rails.recharge.airtime_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ecocash_callback_failure_only_records_substatus() {
    let (state, rails) = test_state().await;
    let order_number = ecocash_airtime_order(&state).await;
    let order = db::airtime::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    let reference = order.payment_id.clone().unwrap();

    let body = serde_json::json!({
        "sourceReference": reference,
        "transactionStatus": "INSUFFICIENT FUNDS",
    })
    .to_string();
    let response = webhooks::ecocash(State(state.clone()), Bytes::from(body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = db::airtime::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "PENDING");
    assert_eq!(
        order.payment_status.as_deref(),
        Some("ecocash_insufficient_funds")
    );
    assert_eq!(rails.recharge.airtime_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ecocash_poll_confirms_and_fulfills_zesa() {
    let (state, rails) = test_state().await;
    let order_number = ecocash_zesa_order(&state).await;

    // While the subscriber is approving, polls record the sub-status and the
    // order stays pending.
    let Json(pending) = ecocash_api::zesa_status(
        State(state.clone()),
        Json(ecocash_api::StatusPollRequest {
            order_number: order_number.clone(),
        }),
    )
    .await
    .expect("poll");
    assert_eq!(pending["status"], "PENDING");

    rails.ecocash.set_status("SUCCESS");
    let Json(done) = ecocash_api::zesa_status(
        State(state.clone()),
        Json(ecocash_api::StatusPollRequest {
            order_number: order_number.clone(),
        }),
    )
    .await
    .expect("poll");
    assert_eq!(done["status"], "DELIVERED");

    let order = db::zesa::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
    assert_eq!(order.paid_amount, Some(20.2));
    assert!(order.delivery_response.unwrap().contains("token"));
    assert_eq!(rails.recharge.zesa_calls.load(Ordering::SeqCst), 1);

    // The reseller is asked for the token value, not the marked-up total.
    let request = rails.recharge.last_zesa.lock().unwrap().clone().unwrap();
    assert_eq!(request.amount, 20.0);
    assert_eq!(request.meter_number, "04123456789");
    assert_eq!(request.agent_reference, order_number);
}

#[tokio::test]
async fn poll_on_settled_order_answers_without_gateway_roundtrip() {
    let (state, rails) = test_state().await;
    let order_number = ecocash_zesa_order(&state).await;

    rails.ecocash.set_status("SUCCESS");
    ecocash_api::zesa_status(
        State(state.clone()),
        Json(ecocash_api::StatusPollRequest {
            order_number: order_number.clone(),
        }),
    )
    .await
    .expect("poll");

    // Flip the gateway to a status that would corrupt state if consulted.
    rails.ecocash.set_status("FAILED");
    let Json(answer) = ecocash_api::zesa_status(
        State(state.clone()),
        Json(ecocash_api::StatusPollRequest {
            order_number: order_number.clone(),
        }),
    )
    .await
    .expect("poll");
    assert_eq!(answer["status"], "DELIVERED");
    assert_eq!(rails.recharge.zesa_calls.load(Ordering::SeqCst), 1);
}

// ---- failure parking and admin retry ----

#[tokio::test]
async fn recharge_failure_parks_failed_and_admin_retry_delivers() {
    let (state, rails) = test_state().await;
    let order_number = ecocash_airtime_order(&state).await;

    rails.recharge.fail.store(true, Ordering::SeqCst);
    rails.ecocash.set_status("SUCCESS");
    let Json(parked) = ecocash_api::airtime_status(
        State(state.clone()),
        Json(ecocash_api::StatusPollRequest {
            order_number: order_number.clone(),
        }),
    )
    .await
    .expect("poll");
    assert_eq!(parked["status"], "FAILED");

    let order = db::airtime::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "FAILED");
    assert!(!order.delivered);
    assert!(order.paid_at.is_some(), "payment evidence must survive");
    assert!(order.delivery_notes.unwrap().contains("forced failure"));

    // Back office retries once the reseller recovers.
    rails.recharge.fail.store(false, Ordering::SeqCst);
    let Json(result) = admin::retry_airtime_order(
        State(state.clone()),
        Path(order_number.clone()),
    )
    .await
    .expect("retry");
    assert_eq!(result["success"], true);
    assert_eq!(result["order"]["status"], "DELIVERED");

    let request = rails.recharge.last_airtime.lock().unwrap().clone().unwrap();
    assert_eq!(request.amount, 10.0, "reseller gets the face value");
    assert_eq!(request.product_id, 1);
    assert_eq!(request.target_msisdn, "+263771234567");
    assert_eq!(request.agent_reference, order_number);
    assert_eq!(rails.recharge.airtime_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_without_payment_evidence_stays_unpaid() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let Json(result) = admin::retry_product_order(
        State(state.clone()),
        Path(order_number.clone()),
    )
    .await
    .expect("retry");
    // Nothing to reset and nothing deliverable: the order is returned as-is.
    assert_eq!(result["order"]["status"], "PENDING");
    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn concurrent_dispatch_delivers_once() {
    let (state, rails) = test_state().await;
    let order_number = crypto_product_order(&state, 20.0).await;

    let paid = PaidFields {
        amount: Some(20.0),
        currency: Some("USD".to_string()),
    };
    db::order_flow::apply_status(
        &state.pool,
        OrderKind::Product,
        &order_number,
        OrderStatus::Paid,
        Some(&paid),
        now_millis(),
    )
    .await
    .unwrap();

    let (a, b) = tokio::join!(
        fulfillment::dispatch(&state, OrderKind::Product, &order_number),
        fulfillment::dispatch(&state, OrderKind::Product, &order_number),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(rails.mailer.text_mails.lock().unwrap().len(), 1);

    let order = db::orders::find_by_order_number(&state.pool, &order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "DELIVERED");
}
