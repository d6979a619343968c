//! Outbound email: plain notifications and the multipart ticket delivery.
//!
//! Delivery goes through SESv2. The ticket email is raw MIME so the QR PNGs can
//! be referenced inline from the HTML via `cid:` while the PDF rides along as
//! an attachment.

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::primitives::Blob;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message, RawMessage};
use base64::Engine;

#[derive(Debug, thiserror::Error)]
#[error("email send failed: {0}")]
pub struct MailError(pub String);

#[derive(Debug, Clone)]
pub struct InlineImage {
    /// Referenced from the HTML as `cid:<content_id>`.
    pub content_id: String,
    pub filename: String,
    pub png: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TicketEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub inline_images: Vec<InlineImage>,
    pub pdf_name: String,
    pub pdf: Vec<u8>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
    async fn send_tickets(&self, email: &TicketEmail) -> Result<(), MailError>;
}

pub struct SesMailer {
    client: SesClient,
    from: String,
}

impl SesMailer {
    pub fn new(client: SesClient, from: String) -> Self {
        Self { client, from }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let subject = Content::builder()
            .data(subject)
            .build()
            .map_err(|e| MailError(e.to_string()))?;
        let text = Content::builder()
            .data(body)
            .build()
            .map_err(|e| MailError(e.to_string()))?;

        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().text(text).build())
            .build();

        self.client
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| MailError(e.to_string()))?;

        tracing::info!(to = to, "Email sent");
        Ok(())
    }

    async fn send_tickets(&self, email: &TicketEmail) -> Result<(), MailError> {
        let mime = build_ticket_mime(&self.from, email);
        let raw = RawMessage::builder()
            .data(Blob::new(mime))
            .build()
            .map_err(|e| MailError(e.to_string()))?;

        self.client
            .send_email()
            .destination(Destination::builder().to_addresses(&email.to).build())
            .content(EmailContent::builder().raw(raw).build())
            .send()
            .await
            .map_err(|e| MailError(e.to_string()))?;

        tracing::info!(
            to = %email.to,
            tickets = email.inline_images.len(),
            "Ticket email sent"
        );
        Ok(())
    }
}

const MIXED_BOUNDARY: &str = "shoppy-mixed-boundary";
const RELATED_BOUNDARY: &str = "shoppy-related-boundary";

/// Hand-assembled multipart/mixed message:
/// multipart/related [html + inline PNGs] + PDF attachment.
pub fn build_ticket_mime(from: &str, email: &TicketEmail) -> Vec<u8> {
    let mut mime = String::new();
    mime.push_str(&format!("From: {from}\r\n"));
    mime.push_str(&format!("To: {}\r\n", email.to));
    mime.push_str(&format!("Subject: {}\r\n", email.subject));
    mime.push_str("MIME-Version: 1.0\r\n");
    mime.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{MIXED_BOUNDARY}\"\r\n\r\n"
    ));

    mime.push_str(&format!("--{MIXED_BOUNDARY}\r\n"));
    mime.push_str(&format!(
        "Content-Type: multipart/related; boundary=\"{RELATED_BOUNDARY}\"\r\n\r\n"
    ));

    mime.push_str(&format!("--{RELATED_BOUNDARY}\r\n"));
    mime.push_str("Content-Type: text/html; charset=UTF-8\r\n");
    mime.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    mime.push_str(&encode_base64_wrapped(email.html_body.as_bytes()));
    mime.push_str("\r\n");

    for image in &email.inline_images {
        mime.push_str(&format!("--{RELATED_BOUNDARY}\r\n"));
        mime.push_str(&format!(
            "Content-Type: image/png; name=\"{}\"\r\n",
            image.filename
        ));
        mime.push_str("Content-Transfer-Encoding: base64\r\n");
        mime.push_str(&format!("Content-ID: <{}>\r\n", image.content_id));
        mime.push_str(&format!(
            "Content-Disposition: inline; filename=\"{}\"\r\n\r\n",
            image.filename
        ));
        mime.push_str(&encode_base64_wrapped(&image.png));
        mime.push_str("\r\n");
    }
    mime.push_str(&format!("--{RELATED_BOUNDARY}--\r\n\r\n"));

    mime.push_str(&format!("--{MIXED_BOUNDARY}\r\n"));
    mime.push_str(&format!(
        "Content-Type: application/pdf; name=\"{}\"\r\n",
        email.pdf_name
    ));
    mime.push_str("Content-Transfer-Encoding: base64\r\n");
    mime.push_str(&format!(
        "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
        email.pdf_name
    ));
    mime.push_str(&encode_base64_wrapped(&email.pdf));
    mime.push_str("\r\n");
    mime.push_str(&format!("--{MIXED_BOUNDARY}--\r\n"));

    mime.into_bytes()
}

/// Base64 wrapped at 76 columns with CRLF, per RFC 2045.
fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 76 * 2 + 2);
    for chunk in encoded.as_bytes().chunks(76) {
        // SAFETY: base64 output is ASCII
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ASCII"));
        out.push_str("\r\n");
    }
    out
}
