//! Plisio hosted-invoice gateway, the alternative crypto processor.
//!
//! Invoices are created with `GET /invoices/new`. Callbacks carry a
//! `verify_hash` field: HMAC-SHA256 (hex) over the callback JSON with that
//! field removed and keys sorted, keyed by the API key.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::{CryptoGateway, Invoice, InvoiceRequest, ProviderError};

pub const PROVIDER: &str = "plisio";

pub struct Plisio {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Plisio {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InvoiceData {
    txn_id: String,
    invoice_url: String,
}

#[async_trait::async_trait]
impl CryptoGateway for Plisio {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError> {
        let response = self
            .client
            .get(format!("{}/invoices/new", self.base_url))
            .query(&[
                ("source_currency", request.currency.as_str()),
                ("source_amount", &format!("{:.2}", request.amount)),
                ("order_number", request.order_number.as_str()),
                ("order_name", request.description.as_str()),
                ("email", request.customer_email.as_str()),
                ("success_callback_url", request.success_url.as_str()),
                ("fail_callback_url", request.cancel_url.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
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

        // Plisio wraps everything in {status, data}; errors come back with
        // HTTP 200 and status "error".
        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| ProviderError::decode(PROVIDER, format!("{e}; body: {text}")))?;
        if envelope.status != "success" {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let data: InvoiceData = serde_json::from_value(envelope.data)
            .map_err(|e| ProviderError::decode(PROVIDER, format!("{e}; body: {text}")))?;

        tracing::info!(
            order_number = %request.order_number,
            txn_id = %data.txn_id,
            "Plisio invoice created"
        );

        Ok(Invoice {
            provider: PROVIDER,
            external_id: data.txn_id,
            invoice_url: data.invoice_url,
        })
    }
}

/// Callback body. Amounts arrive as strings.
#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    pub txn_id: String,
    pub order_number: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Map Plisio's callback vocabulary onto the shared provider vocabulary the
/// canonical status map understands. Anything unrecognized maps to `waiting`,
/// which the canonical map keeps at PENDING.
pub fn normalize_status(raw: &str) -> &'static str {
    match raw {
        "new" => "waiting",
        "pending" | "pending internal" => "confirming",
        "completed" => "finished",
        "mismatch" => "partially_paid",
        "error" | "cancelled" => "failed",
        "expired" => "expired",
        _ => "waiting",
    }
}

/// Verify a callback: pop `verify_hash`, re-serialize the remainder with
/// sorted keys, HMAC-SHA256 with the API key.
pub fn verify_callback(body: &[u8], api_key: &str) -> Result<(), &'static str> {
    let mut value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| "callback body is not JSON")?;
    let object = value
        .as_object_mut()
        .ok_or("callback body is not a JSON object")?;

    let provided = object
        .remove("verify_hash")
        .ok_or("callback missing verify_hash")?;
    let provided = provided.as_str().ok_or("verify_hash is not a string")?;

    let sorted =
        serde_json::to_string(&value).map_err(|_| "callback re-serialization failed")?;

    let mut mac =
        Hmac::<Sha256>::new_from_slice(api_key.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(sorted.as_bytes());

    let signature = hex::decode(provided).map_err(|_| "Invalid verify_hash hex")?;
    mac.verify_slice(&signature)
        .map_err(|_| "verify_hash mismatch")
}
