//! Checkout pipeline: validate, price, persist a PENDING order, initiate
//! payment, answer with the payment URL.
//!
//! Payment initiation happens after the order row exists. If the provider call
//! fails the order stays PENDING and the client gets the provider error; the
//! row is evidence for support.

pub mod airtime;
pub mod product;
pub mod tickets;
pub mod zesa;

use serde::Serialize;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::notify;
use crate::orders::{OrderKind, PaymentMethod, format_order_number, local_day_bounds};
use crate::providers::{InvoiceRequest, PushPaymentRequest};
use crate::state::AppState;
use crate::util::{new_id, now_millis};

/// Attempts at regenerating an order number after a UNIQUE collision.
pub(crate) const ORDER_NUMBER_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_number: String,
    pub payment_url: String,
    pub payment_method: String,
    pub amount_to_pay: f64,
}

/// Next candidate order number: 1 + count of same-kind orders created in the
/// server-local day. Collisions under concurrency are resolved by the caller's
/// retry loop around the UNIQUE insert.
pub(crate) async fn next_order_number(state: &AppState, kind: OrderKind) -> AppResult<String> {
    let now = chrono::Local::now();
    let (start, end) = local_day_bounds(now);
    let count = db::order_flow::count_today(&state.pool, kind, start, end).await?;
    Ok(format_order_number(kind, now.date_naive(), count + 1))
}

pub(crate) struct PaymentInit {
    pub payment_id: String,
    pub payment_status: &'static str,
    pub payment_url: String,
    pub ecocash_msisdn: Option<String>,
}

pub(crate) async fn initiate_payment(
    state: &AppState,
    order_number: &str,
    amount: f64,
    currency: &str,
    description: &str,
    customer_email: &str,
    method: PaymentMethod,
    payer_msisdn: Option<&str>,
) -> AppResult<PaymentInit> {
    match method {
        PaymentMethod::Crypto => {
            let request = InvoiceRequest {
                amount,
                currency: currency.to_string(),
                order_number: order_number.to_string(),
                description: description.to_string(),
                customer_email: customer_email.to_string(),
                success_url: format!(
                    "{}/payment/success?order={order_number}",
                    state.config.public_base_url
                ),
                cancel_url: format!(
                    "{}/payment/cancelled?order={order_number}",
                    state.config.public_base_url
                ),
            };
            let invoice = state.crypto.create_invoice(&request).await?;
            Ok(PaymentInit {
                payment_id: invoice.external_id,
                payment_status: "invoice_created",
                payment_url: invoice.invoice_url,
                ecocash_msisdn: None,
            })
        }
        PaymentMethod::Ecocash => {
            let msisdn = payer_msisdn.ok_or_else(|| {
                AppError::validation("a phone number is required for EcoCash payments")
            })?;
            // Our reference for the push payment; every status poll needs it.
            let source_reference = new_id();
            let push = PushPaymentRequest {
                msisdn: msisdn.to_string(),
                amount,
                currency: currency.to_string(),
                reason: description.to_string(),
                source_reference: source_reference.clone(),
            };
            state.ecocash.create_push_payment(&push).await?;
            Ok(PaymentInit {
                payment_id: source_reference,
                payment_status: "ecocash_initiated",
                payment_url: format!(
                    "{}/payment/pending?order={order_number}",
                    state.config.public_base_url
                ),
                ecocash_msisdn: Some(msisdn.to_string()),
            })
        }
    }
}

/// Shared tail of every checkout: initiate payment, attach the reference,
/// notify ops, build the response.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn finalize(
    state: &AppState,
    kind: OrderKind,
    order_number: &str,
    amount: f64,
    currency: &str,
    description: &str,
    customer_email: &str,
    method: PaymentMethod,
    payer_msisdn: Option<&str>,
) -> AppResult<CheckoutResponse> {
    let init = initiate_payment(
        state,
        order_number,
        amount,
        currency,
        description,
        customer_email,
        method,
        payer_msisdn,
    )
    .await?;

    db::order_flow::set_payment_ref(
        &state.pool,
        kind,
        order_number,
        &init.payment_id,
        init.payment_status,
        init.ecocash_msisdn.as_deref(),
        now_millis(),
    )
    .await?;

    tracing::info!(
        order_number = %order_number,
        kind = kind.label(),
        amount = amount,
        method = method.as_db(),
        "Checkout created"
    );

    notify::ops_alert(
        state.alerts.clone(),
        format!("New {} order {order_number}", kind.label()),
        format!(
            "{description}\nAmount: {amount:.2} {currency}\nPayment: {}\nCustomer: {customer_email}",
            method.as_db()
        ),
    );

    Ok(CheckoutResponse {
        success: true,
        order_number: order_number.to_string(),
        payment_url: init.payment_url,
        payment_method: method.as_db().to_string(),
        amount_to_pay: amount,
    })
}

pub(crate) fn require_email(email: &str) -> AppResult<&str> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("a valid email address is required"));
    }
    Ok(email)
}

/// Loose MSISDN check: optional +, digits, plausible length for local and
/// international forms.
pub(crate) fn require_msisdn<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let value = value.trim();
    let digits = value.strip_prefix('+').unwrap_or(value);
    if digits.is_empty()
        || !digits.chars().all(|c| c.is_ascii_digit())
        || !(9..=13).contains(&digits.len())
    {
        return Err(AppError::validation(format!(
            "{field} must be a valid mobile number"
        )));
    }
    Ok(value)
}

/// The customer's phone contact, when the alternate contact is a phone.
pub(crate) fn phone_contact<'a>(
    contact_method: Option<&'a str>,
    contact_value: Option<&'a str>,
) -> Option<&'a str> {
    match (contact_method, contact_value) {
        (Some("phone"), Some(value)) if !value.trim().is_empty() => Some(value.trim()),
        _ => None,
    }
}
