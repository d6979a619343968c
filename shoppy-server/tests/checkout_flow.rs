//! Checkout pipeline: validation, pricing, order numbering and payment
//! initiation across all four order kinds.

mod common;

use std::sync::atomic::Ordering;

use common::{seed_event, seed_product, test_state};
use shoppy_server::checkout::airtime::{self, AirtimeCheckoutRequest};
use shoppy_server::checkout::product::{self, ProductCheckoutRequest};
use shoppy_server::checkout::tickets::{self, TicketCheckoutRequest, TicketLineItem};
use shoppy_server::checkout::zesa::{self, ZesaCheckoutRequest};
use shoppy_server::db;
use shoppy_server::error::AppError;

fn product_request(product_id: &str, method: &str) -> ProductCheckoutRequest {
    ProductCheckoutRequest {
        email: "kuda@example.com".to_string(),
        contact_method: None,
        contact_value: None,
        payment_method: method.to_string(),
        product_id: product_id.to_string(),
    }
}

fn airtime_request(method: &str, amount: f64) -> AirtimeCheckoutRequest {
    AirtimeCheckoutRequest {
        email: "kuda@example.com".to_string(),
        contact_method: None,
        contact_value: None,
        payment_method: method.to_string(),
        network: "econet".to_string(),
        recipient_msisdn: "+263771234567".to_string(),
        airtime_amount: amount,
    }
}

fn zesa_request(amount: f64) -> ZesaCheckoutRequest {
    ZesaCheckoutRequest {
        email: "kuda@example.com".to_string(),
        contact_method: None,
        contact_value: None,
        payment_method: "crypto".to_string(),
        meter_number: "04123456789".to_string(),
        notify_number: "+263771234567".to_string(),
        token_amount: amount,
    }
}

#[tokio::test]
async fn product_checkout_creates_pending_order_with_invoice() {
    let (state, rails) = test_state().await;
    let product = seed_product(&state.pool, "eBook bundle", 15.99).await;

    let response = product::checkout(&state, product_request(&product.id, "crypto"))
        .await
        .expect("checkout");

    assert!(response.success);
    assert!(response.order_number.starts_with("SHP-"));
    assert_eq!(response.payment_url, "https://pay.test/inv-1");
    assert_eq!(response.payment_method, "crypto");
    assert_eq!(response.amount_to_pay, 15.99);

    let order = db::orders::find_by_order_number(&state.pool, &response.order_number)
        .await
        .unwrap()
        .expect("order row");
    assert_eq!(order.status, "PENDING");
    assert_eq!(order.amount, 15.99);
    assert_eq!(order.payment_id.as_deref(), Some("inv-1"));
    assert_eq!(order.payment_status.as_deref(), Some("invoice_created"));
    assert!(!order.delivered);

    let invoice = rails.crypto.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(invoice.order_number, response.order_number);
    assert_eq!(invoice.amount, 15.99);
    assert!(invoice.success_url.contains(&response.order_number));
}

#[tokio::test]
async fn product_checkout_rejects_missing_or_inactive_product() {
    let (state, _rails) = test_state().await;
    let product = seed_product(&state.pool, "eBook bundle", 15.99).await;
    db::products::deactivate(&state.pool, &product.id)
        .await
        .unwrap();

    let err = product::checkout(&state, product_request(&product.id, "crypto"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = product::checkout(&state, product_request("no-such-id", "crypto"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn product_checkout_validates_email_and_method() {
    let (state, _rails) = test_state().await;
    let product = seed_product(&state.pool, "eBook bundle", 15.99).await;

    let mut bad_email = product_request(&product.id, "crypto");
    bad_email.email = "not-an-email".to_string();
    let err = product::checkout(&state, bad_email).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = product::checkout(&state, product_request(&product.id, "card"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not available"));
}

#[tokio::test]
async fn ecocash_checkout_requires_phone_contact() {
    let (state, rails) = test_state().await;
    let product = seed_product(&state.pool, "eBook bundle", 15.99).await;

    let err = product::checkout(&state, product_request(&product.id, "ecocash"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(rails.ecocash.pushes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ecocash_checkout_sends_push_and_parks_order_pending() {
    let (state, rails) = test_state().await;
    let product = seed_product(&state.pool, "eBook bundle", 20.0).await;

    let mut request = product_request(&product.id, "ecocash");
    request.contact_method = Some("phone".to_string());
    request.contact_value = Some("+263771234567".to_string());

    let response = product::checkout(&state, request).await.expect("checkout");
    assert!(response.payment_url.contains("/payment/pending?order="));
    assert_eq!(rails.ecocash.pushes.load(Ordering::SeqCst), 1);

    let order = db::orders::find_by_order_number(&state.pool, &response.order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "PENDING");
    assert_eq!(order.payment_status.as_deref(), Some("ecocash_initiated"));
    assert_eq!(order.ecocash_msisdn.as_deref(), Some("+263771234567"));

    // The push reference is what every later status poll keys on.
    let push = rails.ecocash.last_push.lock().unwrap().clone().unwrap();
    assert_eq!(Some(push.source_reference), order.payment_id);
    assert_eq!(push.amount, 20.0);
}

#[tokio::test]
async fn order_numbers_increment_within_the_day() {
    let (state, _rails) = test_state().await;
    let product = seed_product(&state.pool, "eBook bundle", 5.0).await;

    let today = chrono::Local::now().format("%Y%m%d").to_string();
    let first = product::checkout(&state, product_request(&product.id, "crypto"))
        .await
        .unwrap();
    let second = product::checkout(&state, product_request(&product.id, "crypto"))
        .await
        .unwrap();

    assert_eq!(first.order_number, format!("SHP-{today}-001"));
    assert_eq!(second.order_number, format!("SHP-{today}-002"));
}

#[tokio::test]
async fn failed_invoice_leaves_order_as_support_evidence() {
    let (state, rails) = test_state().await;
    let product = seed_product(&state.pool, "eBook bundle", 15.99).await;
    rails.crypto.fail.store(true, Ordering::SeqCst);

    let err = product::checkout(&state, product_request(&product.id, "crypto"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Provider(_)));

    let orders = db::orders::list_recent(&state.pool, 10).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, "PENDING");
    assert!(orders[0].payment_id.is_none());
}

#[tokio::test]
async fn airtime_checkout_applies_two_percent_markup() {
    let (state, rails) = test_state().await;

    let response = airtime::checkout(&state, airtime_request("crypto", 10.0))
        .await
        .expect("checkout");

    assert!(response.order_number.starts_with("AIR-"));
    assert_eq!(response.amount_to_pay, 10.2);

    let order = db::airtime::find_by_order_number(&state.pool, &response.order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.airtime_amount, 10.0);
    assert_eq!(order.amount, 10.2);
    assert_eq!(order.markup_rate, 0.02);
    assert_eq!(order.network, "econet");

    // The invoice is for the marked-up total, not the face value.
    let invoice = rails.crypto.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(invoice.amount, 10.2);
}

#[tokio::test]
async fn airtime_checkout_validates_network_and_recipient() {
    let (state, _rails) = test_state().await;

    let mut request = airtime_request("crypto", 10.0);
    request.network = "vodacom".to_string();
    let err = airtime::checkout(&state, request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut request = airtime_request("crypto", 10.0);
    request.recipient_msisdn = "12ab".to_string();
    let err = airtime::checkout(&state, request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = airtime::checkout(&state, airtime_request("crypto", 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn zesa_checkout_enforces_minimum_and_marks_up_one_percent() {
    let (state, _rails) = test_state().await;

    let err = zesa::checkout(&state, zesa_request(4.99)).await.unwrap_err();
    assert!(err.to_string().contains("minimum ZESA purchase"));

    let response = zesa::checkout(&state, zesa_request(20.0))
        .await
        .expect("checkout");
    assert!(response.order_number.starts_with("ZESA-"));
    assert_eq!(response.amount_to_pay, 20.2);

    let order = db::zesa::find_by_order_number(&state.pool, &response.order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.token_amount, 20.0);
    assert_eq!(order.amount, 20.2);
    assert_eq!(order.meter_number, "04123456789");
}

#[tokio::test]
async fn zesa_checkout_rejects_bad_meter_numbers() {
    let (state, _rails) = test_state().await;

    let mut request = zesa_request(10.0);
    request.meter_number = "12a".to_string();
    let err = zesa::checkout(&state, request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn ticket_checkout_prices_lines_and_expands_seats() {
    let (state, rails) = test_state().await;
    let (event, types) = seed_event(&state.pool).await;
    let general = types.iter().find(|t| t.name == "General").unwrap();
    let vip = types.iter().find(|t| t.name == "VIP").unwrap();

    let request = TicketCheckoutRequest {
        email: "kuda@example.com".to_string(),
        contact_method: None,
        contact_value: None,
        payment_method: "crypto".to_string(),
        event_slug: event.slug.clone(),
        items: vec![
            TicketLineItem {
                ticket_type_id: general.id.clone(),
                quantity: 2,
                attendee_names: vec!["Alice Moyo".to_string(), "Bob Ncube".to_string()],
            },
            TicketLineItem {
                ticket_type_id: vip.id.clone(),
                quantity: 1,
                attendee_names: vec![],
            },
        ],
    };

    let response = tickets::checkout(&state, request).await.expect("checkout");
    assert!(response.order_number.starts_with("EVT-"));
    // 2 x 10.00 + 1 x 25.00
    assert_eq!(response.amount_to_pay, 45.0);

    let order = db::tickets::find_by_order_number(&state.pool, &response.order_number)
        .await
        .unwrap()
        .unwrap();
    let items = db::tickets::items_for_order(&state.pool, &order.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 3);

    let mut codes: Vec<&str> = items.iter().map(|i| i.ticket_code.as_str()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), 3, "ticket codes must be unique");

    for item in &items {
        assert!(item.qr_payload.contains(&response.order_number));
        assert!(item.qr_payload.contains(&event.slug));
        assert!(!item.redeemed);
    }

    let general_names: Vec<_> = items
        .iter()
        .filter(|i| i.ticket_type_name == "General")
        .map(|i| i.attendee_name.clone().unwrap())
        .collect();
    assert_eq!(general_names.len(), 2);
    assert!(general_names.contains(&"Alice Moyo".to_string()));
    assert!(general_names.contains(&"Bob Ncube".to_string()));

    let vip_item = items.iter().find(|i| i.ticket_type_name == "VIP").unwrap();
    assert!(vip_item.attendee_name.is_none());

    let invoice = rails.crypto.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(invoice.amount, 45.0);
}

#[tokio::test]
async fn ticket_checkout_rejects_bad_requests() {
    let (state, _rails) = test_state().await;
    let (event, types) = seed_event(&state.pool).await;
    let general = &types[0];

    let base = |items: Vec<TicketLineItem>| TicketCheckoutRequest {
        email: "kuda@example.com".to_string(),
        contact_method: None,
        contact_value: None,
        payment_method: "crypto".to_string(),
        event_slug: event.slug.clone(),
        items,
    };

    // No items.
    let err = tickets::checkout(&state, base(vec![])).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Unknown ticket type.
    let err = tickets::checkout(
        &state,
        base(vec![TicketLineItem {
            ticket_type_id: "nope".to_string(),
            quantity: 1,
            attendee_names: vec![],
        }]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // More names than seats.
    let err = tickets::checkout(
        &state,
        base(vec![TicketLineItem {
            ticket_type_id: general.id.clone(),
            quantity: 1,
            attendee_names: vec!["A".to_string(), "B".to_string()],
        }]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Over the per-order cap.
    let err = tickets::checkout(
        &state,
        base(vec![TicketLineItem {
            ticket_type_id: general.id.clone(),
            quantity: 21,
            attendee_names: vec![],
        }]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Unpublished event sells nothing.
    db::events::deactivate(&state.pool, &event.id).await.unwrap();
    let err = tickets::checkout(
        &state,
        base(vec![TicketLineItem {
            ticket_type_id: general.id.clone(),
            quantity: 1,
            attendee_names: vec![],
        }]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
