//! Airtime checkout: face value plus 2% service markup.

use serde::Deserialize;

use super::{
    CheckoutResponse, ORDER_NUMBER_ATTEMPTS, finalize, next_order_number, phone_contact,
    require_email, require_msisdn,
};
use crate::db;
use crate::error::AppResult;
use crate::money;
use crate::orders::{Network, OrderKind, PaymentMethod};
use crate::state::AppState;
use crate::util::new_id;

pub const AIRTIME_MARKUP_RATE: f64 = 0.02;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirtimeCheckoutRequest {
    pub email: String,
    #[serde(default)]
    pub contact_method: Option<String>,
    #[serde(default)]
    pub contact_value: Option<String>,
    pub payment_method: String,
    pub network: String,
    pub recipient_msisdn: String,
    /// Face value to top up, before markup.
    pub airtime_amount: f64,
}

pub async fn checkout(
    state: &AppState,
    request: AirtimeCheckoutRequest,
) -> AppResult<CheckoutResponse> {
    let email = require_email(&request.email)?;
    let method = PaymentMethod::parse(&request.payment_method)?;
    let network = Network::parse(&request.network)?;
    let recipient = require_msisdn(&request.recipient_msisdn, "recipientMsisdn")?;
    money::require_positive_amount(request.airtime_amount, "airtimeAmount")?;

    let face_value = money::round_money(request.airtime_amount);
    let amount = money::compute_markup_amount(face_value, AIRTIME_MARKUP_RATE);

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
        let candidate = next_order_number(state, OrderKind::Airtime).await?;
        let new_order = db::airtime::NewAirtimeOrder {
            id: &order_id,
            order_number: &candidate,
            customer_id: &customer.id,
            network: network.as_db(),
            recipient_msisdn: recipient,
            airtime_amount: face_value,
            markup_rate: AIRTIME_MARKUP_RATE,
            amount,
            currency: "USD",
            payment_method: method.as_db(),
        };
        match db::airtime::create(&state.pool, &new_order).await {
            Ok(()) => break candidate,
            Err(e) if db::is_unique_violation(&e) && attempts < ORDER_NUMBER_ATTEMPTS => {
                attempts += 1;
                tracing::warn!(order_number = %candidate, "Order number collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    };

    // The EcoCash prompt goes to the phone contact when given, otherwise to
    // the handset being topped up.
    let payer = phone_contact(
        request.contact_method.as_deref(),
        request.contact_value.as_deref(),
    )
    .unwrap_or(recipient);

    let description = format!(
        "{} airtime {:.2} USD for {recipient} ({order_number})",
        network.as_db(),
        face_value
    );
    finalize(
        state,
        OrderKind::Airtime,
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
