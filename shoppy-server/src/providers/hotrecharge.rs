//! Recharge reseller client (airtime and ZESA tokens) with a cached bearer
//! token.

use serde::Deserialize;
use tokio::sync::Mutex;

use super::{
    AirtimeRechargeRequest, ProviderError, RechargeApi, RechargeReceipt, ZesaRechargeRequest,
};
use crate::orders::Network;
use crate::util::now_millis;

pub const PROVIDER: &str = "hotrecharge";

/// Reseller product code for an airtime top-up on each network.
pub fn airtime_product_id(network: Network) -> i64 {
    match network {
        Network::Econet => 1,
        Network::Netone => 2,
        Network::Telecel => 3,
    }
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    /// Epoch millis after which the token must not be used.
    pub expires_at: i64,
}

/// Tokens are refreshed this long before their stated expiry.
const EXPIRY_MARGIN_MS: i64 = 30_000;

/// Bearer-token cache with single-flight refresh: the mutex is held across the
/// refresh await, so concurrent callers wait for one login instead of each
/// issuing their own.
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub async fn get_or_refresh<F, Fut>(&self, now: i64, refresh: F) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CachedToken, ProviderError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.expires_at - EXPIRY_MARGIN_MS > now {
                return Ok(cached.token.clone());
            }
        }

        let fresh = refresh().await?;
        let token = fresh.token.clone();
        *slot = Some(fresh);
        Ok(token)
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HotRecharge {
    client: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    token_cache: TokenCache,
}

impl HotRecharge {
    pub fn new(client: reqwest::Client, base_url: String, email: String, password: String) -> Self {
        Self {
            client,
            base_url,
            email,
            password,
            token_cache: TokenCache::new(),
        }
    }

    async fn login(&self) -> Result<CachedToken, ProviderError> {
        #[derive(Debug, Deserialize)]
        struct LoginResponse {
            token: String,
            /// Validity in seconds.
            expires_in: i64,
        }

        let body = serde_json::json!({
            "email": self.email,
            "password": self.password,
        });

        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
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

        let parsed: LoginResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::decode(PROVIDER, format!("{e}; body: {text}")))?;

        tracing::info!("Recharge reseller login succeeded");
        Ok(CachedToken {
            token: parsed.token,
            expires_at: now_millis() + parsed.expires_in * 1000,
        })
    }

    async fn bearer(&self) -> Result<String, ProviderError> {
        self.token_cache
            .get_or_refresh(now_millis(), || self.login())
            .await
    }

    async fn post_recharge(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<RechargeReceipt, ProviderError> {
        #[derive(Debug, Deserialize)]
        struct RechargeResponse {
            reference: String,
        }

        let token = self.bearer().await?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
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

        let raw: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::decode(PROVIDER, format!("{e}; body: {text}")))?;
        let parsed: RechargeResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::decode(PROVIDER, format!("{e}; body: {text}")))?;

        Ok(RechargeReceipt {
            reference: parsed.reference,
            raw,
        })
    }
}

#[async_trait::async_trait]
impl RechargeApi for HotRecharge {
    async fn recharge_airtime(
        &self,
        request: &AirtimeRechargeRequest,
    ) -> Result<RechargeReceipt, ProviderError> {
        let body = serde_json::json!({
            "productId": request.product_id,
            "amount": request.amount,
            "targetMobile": request.target_msisdn,
            "agentReference": request.agent_reference,
        });
        let receipt = self.post_recharge("/airtime", body).await?;
        tracing::info!(
            agent_reference = %request.agent_reference,
            reference = %receipt.reference,
            "Airtime recharge accepted"
        );
        Ok(receipt)
    }

    async fn recharge_zesa(
        &self,
        request: &ZesaRechargeRequest,
    ) -> Result<RechargeReceipt, ProviderError> {
        let body = serde_json::json!({
            "meterNumber": request.meter_number,
            "amount": request.amount,
            "notifyMobile": request.notify_msisdn,
            "agentReference": request.agent_reference,
        });
        let receipt = self.post_recharge("/zesa", body).await?;
        tracing::info!(
            agent_reference = %request.agent_reference,
            reference = %receipt.reference,
            "ZESA recharge accepted"
        );
        Ok(receipt)
    }
}
