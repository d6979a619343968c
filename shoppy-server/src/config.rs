//! Service configuration loaded from environment variables.

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub http_port: u16,
    pub database_url: String,
    /// Public origin of the storefront, used in payment redirect URLs.
    pub public_base_url: String,
    pub admin_api_key: String,

    /// Which hosted crypto-invoice gateway to use: `nowpayments` or `plisio`.
    pub crypto_provider: String,
    pub nowpayments_base_url: String,
    pub nowpayments_api_key: String,
    /// IPN HMAC secret. When unset, IPN signatures are not enforced (dev only).
    pub nowpayments_ipn_secret: Option<String>,
    pub plisio_base_url: String,
    pub plisio_api_key: String,
    /// Shared secret for the generic payment webhook. When unset, that route
    /// accepts unsigned posts (dev only).
    pub payment_webhook_secret: Option<String>,

    pub ecocash_base_url: String,
    pub ecocash_api_key: String,

    pub hotrecharge_base_url: String,
    pub hotrecharge_email: String,
    pub hotrecharge_password: String,

    pub ses_from_email: String,
    pub ops_alert_email: String,
}

/// Read a required secret, with a development fallback so local boots don't
/// need every provider credential filled in.
fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ if environment == "development" => {
            tracing::warn!("{} not set, using development placeholder", name);
            Ok(format!("dev-{name}-not-for-production"))
        }
        _ => Err(format!("{name} must be set (environment: {environment})").into()),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, BoxError> {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let http_port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "sqlite:shoppy.db".to_string());

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{http_port}"));

        let crypto_provider = std::env::var("CRYPTO_PROVIDER")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "nowpayments".to_string());

        Ok(Config {
            admin_api_key: require_secret("ADMIN_API_KEY", &environment)?,

            nowpayments_base_url: std::env::var("NOWPAYMENTS_BASE_URL")
                .unwrap_or_else(|_| "https://api.nowpayments.io/v1".to_string()),
            nowpayments_api_key: require_secret("NOWPAYMENTS_API_KEY", &environment)?,
            nowpayments_ipn_secret: optional("NOWPAYMENTS_IPN_SECRET"),

            plisio_base_url: std::env::var("PLISIO_BASE_URL")
                .unwrap_or_else(|_| "https://api.plisio.net/api/v1".to_string()),
            plisio_api_key: require_secret("PLISIO_API_KEY", &environment)?,

            payment_webhook_secret: optional("PAYMENT_WEBHOOK_SECRET"),

            ecocash_base_url: std::env::var("ECOCASH_BASE_URL")
                .unwrap_or_else(|_| "https://developers.ecocash.co.zw/api/ecocash_pay".to_string()),
            ecocash_api_key: require_secret("ECOCASH_API_KEY", &environment)?,

            hotrecharge_base_url: std::env::var("HOTRECHARGE_BASE_URL")
                .unwrap_or_else(|_| "https://ssl.hot.co.zw/api/v4".to_string()),
            hotrecharge_email: std::env::var("HOTRECHARGE_EMAIL")
                .unwrap_or_else(|_| "ops@shoppy.co.zw".to_string()),
            hotrecharge_password: require_secret("HOTRECHARGE_PASSWORD", &environment)?,

            ses_from_email: std::env::var("SES_FROM_EMAIL")
                .unwrap_or_else(|_| "Shoppy <no-reply@shoppy.co.zw>".to_string()),
            ops_alert_email: std::env::var("OPS_ALERT_EMAIL")
                .unwrap_or_else(|_| "ops@shoppy.co.zw".to_string()),

            environment,
            http_port,
            database_url,
            public_base_url,
            crypto_provider,
        })
    }
}
