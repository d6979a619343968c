//! Operational alerts for the back office.

use std::sync::Arc;

use async_trait::async_trait;

use crate::email::{MailError, Mailer};

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Alerts delivered as plain emails to the ops inbox.
pub struct EmailAlerts {
    mailer: Arc<dyn Mailer>,
    ops_email: String,
}

impl EmailAlerts {
    pub fn new(mailer: Arc<dyn Mailer>, ops_email: String) -> Self {
        Self { mailer, ops_email }
    }
}

#[async_trait]
impl AlertSink for EmailAlerts {
    async fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
        self.mailer.send_text(&self.ops_email, subject, body).await
    }
}

/// Fire-and-forget ops alert on a background task. Alerting must never block
/// or fail the request that triggered it.
pub fn ops_alert(alerts: Arc<dyn AlertSink>, subject: String, body: String) {
    tokio::spawn(async move {
        if let Err(e) = alerts.send(&subject, &body).await {
            tracing::warn!(error = %e, subject = %subject, "Ops alert failed");
        }
    });
}
