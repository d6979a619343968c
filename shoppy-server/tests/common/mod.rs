#![allow(dead_code)]
//! Shared test fixtures: in-memory database, mock payment rails, seed data.

use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use shoppy_server::config::Config;
use shoppy_server::db;
use shoppy_server::db::events::{Event, NewEvent, NewTicketType, TicketType};
use shoppy_server::db::products::{NewProduct, Product};
use shoppy_server::email::{MailError, Mailer, TicketEmail};
use shoppy_server::notify::AlertSink;
use shoppy_server::providers::{
    AirtimeRechargeRequest, CryptoGateway, EcocashApi, Invoice, InvoiceRequest, ProviderError,
    PushPaymentRequest, RechargeApi, RechargeReceipt, ZesaRechargeRequest,
};
use shoppy_server::state::AppState;
use shoppy_server::util::now_millis;

// ---- mock rails ----

#[derive(Default)]
pub struct MockCrypto {
    pub invoices: AtomicUsize,
    pub fail: AtomicBool,
    pub last_request: Mutex<Option<InvoiceRequest>>,
}

#[async_trait]
impl CryptoGateway for MockCrypto {
    fn name(&self) -> &'static str {
        "mock-crypto"
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                provider: "mock-crypto",
                status: 500,
                body: "forced failure".to_string(),
            });
        }
        let n = self.invoices.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(Invoice {
            provider: "mock-crypto",
            external_id: format!("inv-{n}"),
            invoice_url: format!("https://pay.test/inv-{n}"),
        })
    }
}

pub struct MockEcocash {
    pub pushes: AtomicUsize,
    pub fail_push: AtomicBool,
    pub status: Mutex<String>,
    pub last_push: Mutex<Option<PushPaymentRequest>>,
}

impl Default for MockEcocash {
    fn default() -> Self {
        Self {
            pushes: AtomicUsize::new(0),
            fail_push: AtomicBool::new(false),
            status: Mutex::new("PENDING SUBSCRIBER VALIDATION".to_string()),
            last_push: Mutex::new(None),
        }
    }
}

impl MockEcocash {
    pub fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = status.to_string();
    }
}

#[async_trait]
impl EcocashApi for MockEcocash {
    async fn create_push_payment(&self, request: &PushPaymentRequest) -> Result<(), ProviderError> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                provider: "mock-ecocash",
                status: 500,
                body: "forced failure".to_string(),
            });
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);
        *self.last_push.lock().unwrap() = Some(request.clone());
        Ok(())
    }

    async fn transaction_status(
        &self,
        _msisdn: &str,
        _source_reference: &str,
    ) -> Result<String, ProviderError> {
        Ok(self.status.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MockRecharge {
    pub airtime_calls: AtomicUsize,
    pub zesa_calls: AtomicUsize,
    pub fail: AtomicBool,
    pub last_airtime: Mutex<Option<AirtimeRechargeRequest>>,
    pub last_zesa: Mutex<Option<ZesaRechargeRequest>>,
}

#[async_trait]
impl RechargeApi for MockRecharge {
    async fn recharge_airtime(
        &self,
        request: &AirtimeRechargeRequest,
    ) -> Result<RechargeReceipt, ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                provider: "mock-recharge",
                status: 503,
                body: "forced failure".to_string(),
            });
        }
        let n = self.airtime_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_airtime.lock().unwrap() = Some(request.clone());
        Ok(RechargeReceipt {
            reference: format!("HR-A{n}"),
            raw: serde_json::json!({ "reference": format!("HR-A{n}"), "balance": 420.0 }),
        })
    }

    async fn recharge_zesa(
        &self,
        request: &ZesaRechargeRequest,
    ) -> Result<RechargeReceipt, ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                provider: "mock-recharge",
                status: 503,
                body: "forced failure".to_string(),
            });
        }
        let n = self.zesa_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_zesa.lock().unwrap() = Some(request.clone());
        Ok(RechargeReceipt {
            reference: format!("HR-Z{n}"),
            raw: serde_json::json!({
                "reference": format!("HR-Z{n}"),
                "token": "1234-5678-9012-3456",
            }),
        })
    }
}

#[derive(Default)]
pub struct MockMailer {
    pub fail: AtomicBool,
    pub text_mails: Mutex<Vec<(String, String, String)>>,
    pub ticket_mails: Mutex<Vec<TicketEmail>>,
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError("forced mail failure".to_string()));
        }
        self.text_mails.lock().unwrap().push((
            to.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }

    async fn send_tickets(&self, email: &TicketEmail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError("forced mail failure".to_string()));
        }
        self.ticket_mails.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Counts alerts without delivering anything. Alert sends are spawned
/// fire-and-forget, so tests never assert on this counter.
#[derive(Default)]
pub struct MockAlerts {
    pub alerts: AtomicUsize,
}

#[async_trait]
impl AlertSink for MockAlerts {
    async fn send(&self, _subject: &str, _body: &str) -> Result<(), MailError> {
        self.alerts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---- state construction ----

pub struct TestRails {
    pub crypto: Arc<MockCrypto>,
    pub ecocash: Arc<MockEcocash>,
    pub recharge: Arc<MockRecharge>,
    pub mailer: Arc<MockMailer>,
}

fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        http_port: 0,
        database_url: "sqlite::memory:".to_string(),
        public_base_url: "http://localhost:8080".to_string(),
        admin_api_key: "test-admin-key".to_string(),
        crypto_provider: "nowpayments".to_string(),
        nowpayments_base_url: "http://127.0.0.1:1".to_string(),
        nowpayments_api_key: "test-key".to_string(),
        nowpayments_ipn_secret: Some("ipn-secret".to_string()),
        plisio_base_url: "http://127.0.0.1:1".to_string(),
        plisio_api_key: "plisio-key".to_string(),
        payment_webhook_secret: Some("webhook-secret".to_string()),
        ecocash_base_url: "http://127.0.0.1:1".to_string(),
        ecocash_api_key: "test-key".to_string(),
        hotrecharge_base_url: "http://127.0.0.1:1".to_string(),
        hotrecharge_email: "agent@test".to_string(),
        hotrecharge_password: "test-pass".to_string(),
        ses_from_email: "Shoppy <no-reply@test>".to_string(),
        ops_alert_email: "ops@test".to_string(),
    }
}

/// Fresh app state on an in-memory database with every rail mocked. The pool
/// is capped at one connection so the in-memory database is shared.
pub async fn test_state() -> (AppState, TestRails) {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("sqlite options")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory database");
    db::MIGRATOR.run(&pool).await.expect("migrations");

    let crypto = Arc::new(MockCrypto::default());
    let ecocash = Arc::new(MockEcocash::default());
    let recharge = Arc::new(MockRecharge::default());
    let mailer = Arc::new(MockMailer::default());
    let alerts = Arc::new(MockAlerts::default());

    let state = AppState {
        pool,
        config: test_config(),
        crypto: crypto.clone(),
        ecocash: ecocash.clone(),
        recharge: recharge.clone(),
        mailer: mailer.clone(),
        alerts,
    };

    (
        state,
        TestRails {
            crypto,
            ecocash,
            recharge,
            mailer,
        },
    )
}

// ---- seed data ----

pub async fn seed_product(pool: &SqlitePool, name: &str, price: f64) -> Product {
    db::products::create(
        pool,
        &NewProduct {
            name,
            description: Some("Seeded for tests"),
            price,
            currency: "USD",
        },
    )
    .await
    .expect("seed product")
}

pub async fn seed_event(pool: &SqlitePool) -> (Event, Vec<TicketType>) {
    db::events::create(
        pool,
        &NewEvent {
            slug: "jam-festival",
            name: "Jam Festival",
            description: Some("Two stages, one night"),
            venue: "Glamis Arena",
            city: "Harare",
            starts_at: now_millis() + 30 * 24 * 3600 * 1000,
            ends_at: None,
            published: true,
        },
        &[
            NewTicketType {
                name: "General",
                price: 10.0,
                currency: "USD",
                capacity: Some(500),
            },
            NewTicketType {
                name: "VIP",
                price: 25.0,
                currency: "USD",
                capacity: Some(50),
            },
        ],
    )
    .await
    .expect("seed event")
}
