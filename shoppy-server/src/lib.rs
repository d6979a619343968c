//! Shoppy: storefront and back-office service for a Zimbabwean digital
//! goods reseller.
//!
//! Long-running service that:
//! - Sells digital products, airtime top-ups, ZESA electricity tokens and
//!   event tickets
//! - Takes payment through hosted crypto invoices (NOWPayments or Plisio) or
//!   EcoCash push payments
//! - Reconciles provider webhooks and client polls into one order state
//!   machine with exactly-once fulfillment
//! - Delivers recharges through Hot Recharge and tickets/confirmations over
//!   SES email
//!
//! # Module structure
//!
//! ```text
//! shoppy-server/src/
//! ├── api/          # HTTP routes and handlers
//! ├── checkout/     # Validation, pricing, order creation, payment initiation
//! ├── providers/    # Payment and recharge gateway clients
//! ├── reconcile/    # Provider status events -> order state machine
//! ├── fulfillment/  # Exactly-once delivery per order kind
//! ├── tickets/      # Ticket codes, QR PNGs, PDF rendering
//! ├── email/        # SES mailer, multipart ticket emails
//! ├── db/           # SQLite storage layer
//! └── orders/       # Order kinds, statuses, numbering
//! ```

pub mod api;
pub mod checkout;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod fulfillment;
pub mod money;
pub mod notify;
pub mod orders;
pub mod providers;
pub mod reconcile;
pub mod state;
pub mod tickets;
pub mod util;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
