//! HTTP routes: storefront checkout, payment webhooks, EcoCash status polling,
//! the public catalog, and the key-guarded back office.

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod ecocash;
pub mod health;
pub mod webhooks;

use axum::routing::{get, post};
use axum::{Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Public storefront (no auth)
    let storefront = Router::new()
        .route("/checkout/product", post(checkout::product))
        .route("/checkout/airtime", post(checkout::airtime))
        .route("/checkout/zesa", post(checkout::zesa))
        .route("/checkout/tickets", post(checkout::tickets))
        .route("/products", get(catalog::list_products))
        .route("/events", get(catalog::list_events))
        .route("/events/{slug}", get(catalog::event_by_slug));

    // Provider callbacks (signature-verified, raw body)
    let webhooks = Router::new()
        .route("/webhooks/nowpayments", post(webhooks::nowpayments))
        .route("/webhooks/plisio", post(webhooks::plisio))
        .route("/webhooks/payment", post(webhooks::generic_payment))
        .route("/webhooks/ecocash", post(webhooks::ecocash));

    // Client-driven EcoCash polling while the push prompt is open
    let polling = Router::new()
        .route("/ecocash/order-status", post(ecocash::order_status))
        .route("/ecocash/airtime-status", post(ecocash::airtime_status))
        .route("/ecocash/zesa-status", post(ecocash::zesa_status))
        .route("/ecocash/ticket-status", post(ecocash::ticket_status));

    // Back office (x-admin-key)
    let admin = Router::new()
        .route(
            "/admin/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/admin/products/{id}",
            get(admin::get_product)
                .put(admin::update_product)
                .delete(admin::deactivate_product),
        )
        .route(
            "/admin/events",
            get(admin::list_events).post(admin::create_event),
        )
        .route(
            "/admin/events/{id}",
            get(admin::get_event)
                .put(admin::update_event)
                .delete(admin::deactivate_event),
        )
        .route("/admin/orders", get(admin::list_product_orders))
        .route("/admin/orders/{order_number}", get(admin::get_product_order))
        .route(
            "/admin/orders/{order_number}/retry",
            post(admin::retry_product_order),
        )
        .route("/admin/airtime-orders", get(admin::list_airtime_orders))
        .route(
            "/admin/airtime-orders/{order_number}",
            get(admin::get_airtime_order),
        )
        .route(
            "/admin/airtime-orders/{order_number}/retry",
            post(admin::retry_airtime_order),
        )
        .route("/admin/zesa-orders", get(admin::list_zesa_orders))
        .route(
            "/admin/zesa-orders/{order_number}",
            get(admin::get_zesa_order),
        )
        .route(
            "/admin/zesa-orders/{order_number}/retry",
            post(admin::retry_zesa_order),
        )
        .route("/admin/ticket-orders", get(admin::list_ticket_orders))
        .route(
            "/admin/ticket-orders/{order_number}",
            get(admin::get_ticket_order),
        )
        .route(
            "/admin/ticket-orders/{order_number}/retry",
            post(admin::retry_ticket_order),
        )
        .route(
            "/admin/ticket-orders/{order_number}/resend",
            post(admin::resend_tickets),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin_key,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(storefront)
        .merge(webhooks)
        .merge(polling)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
