//! EcoCash open-API client: C2B push payments and status polling.

use serde::Deserialize;

use super::{EcocashApi, ProviderError, PushPaymentRequest};

pub const PROVIDER: &str = "ecocash";

pub struct EcocashClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EcocashClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[async_trait::async_trait]
impl EcocashApi for EcocashClient {
    async fn create_push_payment(&self, request: &PushPaymentRequest) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "customerMsisdn": request.msisdn,
            "amount": request.amount,
            "reason": request.reason,
            "currency": request.currency,
            "sourceReference": request.source_reference,
        });

        let response = self
            .client
            .post(format!("{}/api/v2/payment/instant/c2b", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::http(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| ProviderError::http(PROVIDER, e))?;
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        // A 2xx only means the USSD prompt went out; settlement is confirmed
        // later through transaction_status.
        tracing::info!(
            source_reference = %request.source_reference,
            "EcoCash push payment initiated"
        );
        Ok(())
    }

    async fn transaction_status(
        &self,
        msisdn: &str,
        source_reference: &str,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "sourceMobileNumber": msisdn,
            "sourceReference": source_reference,
        });

        let response = self
            .client
            .post(format!("{}/api/v1/transaction/c2b/status", self.base_url))
            .header("X-API-KEY", &self.api_key)
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

        let parsed: StatusResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::decode(PROVIDER, format!("{e}; body: {text}")))?;

        Ok(parsed.status)
    }
}
