//! Storefront checkout endpoints.
//!
//! Thin handlers: JSON in, the checkout pipeline does the work, JSON out.

use axum::Json;
use axum::extract::State;

use crate::checkout::airtime::AirtimeCheckoutRequest;
use crate::checkout::product::ProductCheckoutRequest;
use crate::checkout::tickets::TicketCheckoutRequest;
use crate::checkout::zesa::ZesaCheckoutRequest;
use crate::checkout::{self, CheckoutResponse};
use crate::error::AppResult;
use crate::state::AppState;

pub async fn product(
    State(state): State<AppState>,
    Json(request): Json<ProductCheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    checkout::product::checkout(&state, request).await.map(Json)
}

pub async fn airtime(
    State(state): State<AppState>,
    Json(request): Json<AirtimeCheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    checkout::airtime::checkout(&state, request).await.map(Json)
}

pub async fn zesa(
    State(state): State<AppState>,
    Json(request): Json<ZesaCheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    checkout::zesa::checkout(&state, request).await.map(Json)
}

pub async fn tickets(
    State(state): State<AppState>,
    Json(request): Json<TicketCheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    checkout::tickets::checkout(&state, request).await.map(Json)
}
