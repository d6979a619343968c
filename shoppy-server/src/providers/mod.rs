//! External rails: crypto invoice gateways, EcoCash, and the recharge reseller.
//!
//! Every rail sits behind a trait held in [`crate::state::AppState`], so the
//! checkout and reconciliation pipelines can be driven end to end by mocks.

pub mod ecocash;
pub mod hotrecharge;
pub mod nowpayments;
pub mod plisio;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} sent an unreadable response: {detail}")]
    Decode {
        provider: &'static str,
        detail: String,
    },
}

impl ProviderError {
    pub fn http(provider: &'static str, source: reqwest::Error) -> Self {
        ProviderError::Http { provider, source }
    }

    pub fn decode(provider: &'static str, detail: impl Into<String>) -> Self {
        ProviderError::Decode {
            provider,
            detail: detail.into(),
        }
    }
}

/// Request to create a hosted payment invoice.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub amount: f64,
    pub currency: String,
    pub order_number: String,
    pub description: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created invoice the customer gets redirected to.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub provider: &'static str,
    pub external_id: String,
    pub invoice_url: String,
}

#[async_trait]
pub trait CryptoGateway: Send + Sync {
    fn name(&self) -> &'static str;
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError>;
}

/// USSD push-payment prompt sent to a subscriber's handset.
#[derive(Debug, Clone)]
pub struct PushPaymentRequest {
    pub msisdn: String,
    pub amount: f64,
    pub currency: String,
    pub reason: String,
    /// Our reference, stored on the order as `payment_id` and required for
    /// every later status poll.
    pub source_reference: String,
}

#[async_trait]
pub trait EcocashApi: Send + Sync {
    /// Initiate the prompt. Success only acknowledges delivery of the prompt;
    /// payment is confirmed later via polling.
    async fn create_push_payment(&self, request: &PushPaymentRequest) -> Result<(), ProviderError>;

    /// Raw transaction status for a previously initiated payment, e.g.
    /// `SUCCESS`, `PENDING SUBSCRIBER VALIDATION`, `FAILED`.
    async fn transaction_status(
        &self,
        msisdn: &str,
        source_reference: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct AirtimeRechargeRequest {
    pub product_id: i64,
    pub amount: f64,
    pub target_msisdn: String,
    /// Our order number, passed through as the reseller-side reference.
    pub agent_reference: String,
}

#[derive(Debug, Clone)]
pub struct ZesaRechargeRequest {
    pub meter_number: String,
    pub amount: f64,
    pub notify_msisdn: String,
    pub agent_reference: String,
}

/// What the reseller returned for a completed recharge. `raw` is persisted on
/// the order verbatim; for ZESA it carries the token the customer needs.
#[derive(Debug, Clone)]
pub struct RechargeReceipt {
    pub reference: String,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait RechargeApi: Send + Sync {
    async fn recharge_airtime(
        &self,
        request: &AirtimeRechargeRequest,
    ) -> Result<RechargeReceipt, ProviderError>;

    async fn recharge_zesa(
        &self,
        request: &ZesaRechargeRequest,
    ) -> Result<RechargeReceipt, ProviderError>;
}

/// Verify a hex-encoded HMAC-SHA256 signature over a raw request body. Used by
/// the generic payment webhook.
pub fn verify_hmac_sha256(body: &[u8], signature_hex: &str, secret: &str) -> Result<(), &'static str> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(body);
    let signature = hex::decode(signature_hex).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&signature).map_err(|_| "Signature mismatch")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn hmac_verification_accepts_matching_signature() {
        let body = br#"{"orderNumber":"SHP-20250301-001","status":"paid"}"#;
        let signature = sign(body, "topsecret");
        assert!(verify_hmac_sha256(body, &signature, "topsecret").is_ok());
    }

    #[test]
    fn hmac_verification_rejects_tampered_body_and_wrong_key() {
        let body = br#"{"orderNumber":"SHP-20250301-001","status":"paid"}"#;
        let signature = sign(body, "topsecret");
        assert!(verify_hmac_sha256(b"{}", &signature, "topsecret").is_err());
        assert!(verify_hmac_sha256(body, &signature, "othersecret").is_err());
        assert!(verify_hmac_sha256(body, "zz-not-hex", "topsecret").is_err());
    }
}
