//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_sesv2::Client as SesClient;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::email::{Mailer, SesMailer};
use crate::error::AppError;
use crate::notify::{AlertSink, EmailAlerts};
use crate::providers::ecocash::EcocashClient;
use crate::providers::hotrecharge::HotRecharge;
use crate::providers::nowpayments::NowPayments;
use crate::providers::plisio::Plisio;
use crate::providers::{CryptoGateway, EcocashApi, RechargeApi};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub crypto: Arc<dyn CryptoGateway>,
    pub ecocash: Arc<dyn EcocashApi>,
    pub recharge: Arc<dyn RechargeApi>,
    pub mailer: Arc<dyn Mailer>,
    pub alerts: Arc<dyn AlertSink>,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self, AppError> {
        let pool = db::connect(&config.database_url).await?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;

        let crypto: Arc<dyn CryptoGateway> = match config.crypto_provider.as_str() {
            "nowpayments" => Arc::new(NowPayments::new(
                http.clone(),
                config.nowpayments_base_url.clone(),
                config.nowpayments_api_key.clone(),
            )),
            "plisio" => Arc::new(Plisio::new(
                http.clone(),
                config.plisio_base_url.clone(),
                config.plisio_api_key.clone(),
            )),
            other => {
                return Err(AppError::internal(format!(
                    "unknown CRYPTO_PROVIDER '{other}' (expected nowpayments or plisio)"
                )));
            }
        };

        let ecocash: Arc<dyn EcocashApi> = Arc::new(EcocashClient::new(
            http.clone(),
            config.ecocash_base_url.clone(),
            config.ecocash_api_key.clone(),
        ));

        let recharge: Arc<dyn RechargeApi> = Arc::new(HotRecharge::new(
            http,
            config.hotrecharge_base_url.clone(),
            config.hotrecharge_email.clone(),
            config.hotrecharge_password.clone(),
        ));

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let ses = SesClient::new(&aws_config);
        let mailer: Arc<dyn Mailer> = Arc::new(SesMailer::new(ses, config.ses_from_email.clone()));
        let alerts: Arc<dyn AlertSink> = Arc::new(EmailAlerts::new(
            mailer.clone(),
            config.ops_alert_email.clone(),
        ));

        Ok(Self {
            pool,
            config: config.clone(),
            crypto,
            ecocash,
            recharge,
            mailer,
            alerts,
        })
    }
}
