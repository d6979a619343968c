//! Digital product checkout: catalog price, no markup.

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
use crate::util::new_id;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCheckoutRequest {
    pub email: String,
    #[serde(default)]
    pub contact_method: Option<String>,
    #[serde(default)]
    pub contact_value: Option<String>,
    pub payment_method: String,
    pub product_id: String,
}

pub async fn checkout(
    state: &AppState,
    request: ProductCheckoutRequest,
) -> AppResult<CheckoutResponse> {
    let email = require_email(&request.email)?;
    let method = PaymentMethod::parse(&request.payment_method)?;

    let product = db::products::find_by_id(&state.pool, &request.product_id)
        .await?
        .filter(|p| p.active)
        .ok_or_else(|| AppError::validation("product not found or unavailable"))?;
    let amount = money::round_money(product.price);

    let payer = phone_contact(
        request.contact_method.as_deref(),
        request.contact_value.as_deref(),
    );
    if method == PaymentMethod::Ecocash && payer.is_none() {
        return Err(AppError::validation(
            "a phone contact is required for EcoCash payments",
        ));
    }

    let customer = db::customers::find_or_create(
        &state.pool,
        email,
        request.contact_method.as_deref(),
        request.contact_value.as_deref(),
    )
    .await?;

    let order_id = new_id();
    let mut attempts = 0u32;
    let order_number = loop {
        let candidate = next_order_number(state, OrderKind::Product).await?;
        let new_order = db::orders::NewOrder {
            id: &order_id,
            order_number: &candidate,
            customer_id: &customer.id,
            product_id: &product.id,
            amount,
            currency: &product.currency,
            payment_method: method.as_db(),
        };
        match db::orders::create(&state.pool, &new_order).await {
            Ok(()) => break candidate,
            Err(e) if db::is_unique_violation(&e) && attempts < ORDER_NUMBER_ATTEMPTS => {
                attempts += 1;
                tracing::warn!(order_number = %candidate, "Order number collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    };

    let description = format!("{} ({order_number})", product.name);
    finalize(
        state,
        OrderKind::Product,
        &order_number,
        amount,
        &product.currency,
        &description,
        email,
        method,
        payer,
    )
    .await
}
