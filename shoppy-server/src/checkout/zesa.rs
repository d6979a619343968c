//! ZESA prepaid electricity checkout: token value plus 1% markup, 5 USD
//! minimum.

use serde::Deserialize;

use super::{
    CheckoutResponse, ORDER_NUMBER_ATTEMPTS, finalize, next_order_number, phone_contact,
    require_email, require_msisdn,
};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::money;
use crate::orders::{OrderKind, PaymentMethod};
use crate::state::AppState;
use crate::util::new_id;

pub const ZESA_MARKUP_RATE: f64 = 0.01;
pub const ZESA_MINIMUM_USD: f64 = 5.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZesaCheckoutRequest {
    pub email: String,
    #[serde(default)]
    pub contact_method: Option<String>,
    #[serde(default)]
    pub contact_value: Option<String>,
    pub payment_method: String,
    pub meter_number: String,
    /// Number that receives the token SMS.
    pub notify_number: String,
    /// Electricity credit to buy, before markup.
    pub token_amount: f64,
}

pub async fn checkout(state: &AppState, request: ZesaCheckoutRequest) -> AppResult<CheckoutResponse> {
    let email = require_email(&request.email)?;
    let method = PaymentMethod::parse(&request.payment_method)?;

    let meter = request.meter_number.trim();
    if meter.len() < 6 || !meter.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("meterNumber must be a valid meter number"));
    }
    let notify = require_msisdn(&request.notify_number, "notifyNumber")?;

    money::require_positive_amount(request.token_amount, "tokenAmount")?;
    if request.token_amount < ZESA_MINIMUM_USD {
        return Err(AppError::validation(format!(
            "minimum ZESA purchase is {ZESA_MINIMUM_USD:.2} USD"
        )));
    }

    let token_value = money::round_money(request.token_amount);
    let amount = money::compute_markup_amount(token_value, ZESA_MARKUP_RATE);

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
        let candidate = next_order_number(state, OrderKind::Zesa).await?;
        let new_order = db::zesa::NewZesaOrder {
            id: &order_id,
            order_number: &candidate,
            customer_id: &customer.id,
            meter_number: meter,
            notify_number: notify,
            token_amount: token_value,
            markup_rate: ZESA_MARKUP_RATE,
            amount,
            currency: "USD",
            payment_method: method.as_db(),
        };
        match db::zesa::create(&state.pool, &new_order).await {
            Ok(()) => break candidate,
            Err(e) if db::is_unique_violation(&e) && attempts < ORDER_NUMBER_ATTEMPTS => {
                attempts += 1;
                tracing::warn!(order_number = %candidate, "Order number collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    };

    let payer = phone_contact(
        request.contact_method.as_deref(),
        request.contact_value.as_deref(),
    )
    .unwrap_or(notify);

    let description = format!("ZESA token {token_value:.2} USD for meter {meter} ({order_number})");
    finalize(
        state,
        OrderKind::Zesa,
        &order_number,
        amount,
        "USD",
        &description,
        email,
        method,
        Some(payer),
    )
    .await
}
