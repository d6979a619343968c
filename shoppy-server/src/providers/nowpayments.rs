//! NOWPayments hosted-invoice gateway.
//!
//! Invoices are created with `POST /invoice`; payment progress arrives through
//! IPN callbacks signed with HMAC-SHA512 over the callback JSON re-serialized
//! with sorted keys (the provider documents a `ksort` before signing).

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use super::{CryptoGateway, Invoice, InvoiceRequest, ProviderError};

pub const PROVIDER: &str = "nowpayments";

pub struct NowPayments {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NowPayments {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    id: String,
    invoice_url: String,
}

#[async_trait::async_trait]
impl CryptoGateway for NowPayments {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError> {
        let body = serde_json::json!({
            "price_amount": request.amount,
            "price_currency": request.currency,
            "order_id": request.order_number,
            "order_description": request.description,
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
        });

        let response = self
            .client
            .post(format!("{}/invoice", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::http(PROVIDER, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::http(PROVIDER, e))?;

        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: InvoiceResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::decode(PROVIDER, format!("{e}; body: {text}")))?;

        tracing::info!(
            order_number = %request.order_number,
            invoice_id = %parsed.id,
            "NOWPayments invoice created"
        );

        Ok(Invoice {
            provider: PROVIDER,
            external_id: parsed.id,
            invoice_url: parsed.invoice_url,
        })
    }
}

/// IPN callback payload. `payment_status` uses the provider vocabulary the
/// canonical status map already understands (waiting, confirming, confirmed,
/// sending, partially_paid, finished, failed, refunded, expired).
#[derive(Debug, Deserialize)]
pub struct IpnPayload {
    pub payment_id: i64,
    pub payment_status: String,
    pub order_id: String,
    #[serde(default)]
    pub actually_paid: Option<f64>,
    #[serde(default)]
    pub pay_currency: Option<String>,
}

/// Verify the `x-nowpayments-sig` header: hex HMAC-SHA512 over the body
/// re-serialized with sorted keys. serde_json objects are BTreeMap-backed, so
/// a parse-and-reserialize pass yields exactly the provider's sorted form.
pub fn verify_ipn_signature(body: &[u8], sig_header: &str, secret: &str) -> Result<(), &'static str> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| "IPN body is not JSON")?;
    let sorted =
        serde_json::to_string(&value).map_err(|_| "IPN body re-serialization failed")?;

    let mut mac =
        Hmac::<Sha512>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(sorted.as_bytes());

    let signature = hex::decode(sig_header).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&signature)
        .map_err(|_| "IPN signature mismatch")
}
