//! Order domain: kinds, the shared status machine, payment methods, mobile
//! networks, and human-readable order numbers.
//!
//! The four order kinds (digital products, airtime, ZESA electricity, event
//! tickets) live in separate tables but share one lifecycle. Everything here is
//! pure; persistence lives under [`crate::db`].

use chrono::{DateTime, Local, LocalResult, NaiveDate, TimeZone, Utc};

use crate::error::AppError;

/// Which storefront pipeline an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Product,
    Airtime,
    Zesa,
    Ticket,
}

impl OrderKind {
    /// Order-number prefix, also used to route webhook callbacks back to a table.
    pub fn prefix(&self) -> &'static str {
        match self {
            OrderKind::Product => "SHP",
            OrderKind::Airtime => "AIR",
            OrderKind::Zesa => "ZESA",
            OrderKind::Ticket => "EVT",
        }
    }

    /// Backing table name. Table names are static strings, safe to interpolate
    /// into SQL.
    pub fn table(&self) -> &'static str {
        match self {
            OrderKind::Product => "orders",
            OrderKind::Airtime => "airtime_orders",
            OrderKind::Zesa => "zesa_orders",
            OrderKind::Ticket => "ticket_orders",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderKind::Product => "product",
            OrderKind::Airtime => "airtime",
            OrderKind::Zesa => "zesa",
            OrderKind::Ticket => "ticket",
        }
    }

    /// Recover the kind from an order number such as `AIR-20250301-004`.
    pub fn from_order_number(order_number: &str) -> Option<OrderKind> {
        match order_number.split('-').next() {
            Some("SHP") => Some(OrderKind::Product),
            Some("AIR") => Some(OrderKind::Airtime),
            Some("ZESA") => Some(OrderKind::Zesa),
            Some("EVT") => Some(OrderKind::Ticket),
            _ => None,
        }
    }

    pub fn all() -> [OrderKind; 4] {
        [
            OrderKind::Product,
            OrderKind::Airtime,
            OrderKind::Zesa,
            OrderKind::Ticket,
        ]
    }
}

/// Canonical order status. Stored as its uppercase string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processing,
    Paid,
    PartiallyPaid,
    Failed,
    Expired,
    Refunded,
    Delivered,
}

impl OrderStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Paid => "PAID",
            OrderStatus::PartiallyPaid => "PARTIALLY_PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Delivered => "DELIVERED",
        }
    }

    pub fn from_db(value: &str) -> Option<OrderStatus> {
        match value {
            "PENDING" => Some(OrderStatus::Pending),
            "PROCESSING" => Some(OrderStatus::Processing),
            "PAID" => Some(OrderStatus::Paid),
            "PARTIALLY_PAID" => Some(OrderStatus::PartiallyPaid),
            "FAILED" => Some(OrderStatus::Failed),
            "EXPIRED" => Some(OrderStatus::Expired),
            "REFUNDED" => Some(OrderStatus::Refunded),
            "DELIVERED" => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    /// Statuses a transition into `self` may start from. A provider event whose
    /// target is not reachable from the current status is recorded for audit but
    /// does not move the order; in particular nothing moves backward out of PAID
    /// or DELIVERED except an explicit refund.
    pub fn allowed_from(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Pending],
            OrderStatus::Processing => &[OrderStatus::Pending, OrderStatus::Processing],
            OrderStatus::Paid => &[
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::PartiallyPaid,
                OrderStatus::Paid,
            ],
            OrderStatus::PartiallyPaid => &[
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::PartiallyPaid,
            ],
            OrderStatus::Failed => &[
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::PartiallyPaid,
                OrderStatus::Failed,
            ],
            OrderStatus::Expired => &[
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::PartiallyPaid,
                OrderStatus::Expired,
            ],
            OrderStatus::Refunded => &[
                OrderStatus::Paid,
                OrderStatus::Delivered,
                OrderStatus::PartiallyPaid,
                OrderStatus::Refunded,
            ],
            // DELIVERED is only ever set by the fulfillment claim, never by a
            // provider status event.
            OrderStatus::Delivered => &[],
        }
    }
}

/// Map a provider payment status (already normalized to the shared vocabulary)
/// onto the canonical order status. Unknown values deliberately land on
/// `Pending`: an unrecognized provider string must never mark an order paid.
pub fn canonical_status(provider_status: &str) -> OrderStatus {
    match provider_status {
        "waiting" | "pending" => OrderStatus::Pending,
        "confirming" | "sending" | "processing" => OrderStatus::Processing,
        "confirmed" | "finished" | "success" | "paid" => OrderStatus::Paid,
        "partially_paid" => OrderStatus::PartiallyPaid,
        "failed" => OrderStatus::Failed,
        "expired" => OrderStatus::Expired,
        "refunded" => OrderStatus::Refunded,
        _ => OrderStatus::Pending,
    }
}

/// How the customer pays. `card` is reserved in the API but not yet wired to a
/// processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Crypto,
    Ecocash,
}

impl PaymentMethod {
    pub fn as_db(&self) -> &'static str {
        match self {
            PaymentMethod::Crypto => "crypto",
            PaymentMethod::Ecocash => "ecocash",
        }
    }

    pub fn parse(value: &str) -> Result<PaymentMethod, AppError> {
        match value {
            "crypto" => Ok(PaymentMethod::Crypto),
            "ecocash" => Ok(PaymentMethod::Ecocash),
            "card" => Err(AppError::validation(
                "card payments are not available yet",
            )),
            other => Err(AppError::validation(format!(
                "unknown payment method '{other}' (expected crypto or ecocash)"
            ))),
        }
    }
}

/// Mobile networks we can top up through the recharge reseller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Econet,
    Netone,
    Telecel,
}

impl Network {
    pub fn as_db(&self) -> &'static str {
        match self {
            Network::Econet => "econet",
            Network::Netone => "netone",
            Network::Telecel => "telecel",
        }
    }

    pub fn from_db(value: &str) -> Option<Network> {
        match value {
            "econet" => Some(Network::Econet),
            "netone" => Some(Network::Netone),
            "telecel" => Some(Network::Telecel),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Result<Network, AppError> {
        Network::from_db(&value.to_ascii_lowercase()).ok_or_else(|| {
            AppError::validation(format!(
                "unknown network '{value}' (expected econet, netone or telecel)"
            ))
        })
    }
}

/// Format an order number: `PREFIX-YYYYMMDD-NNN`, where NNN is the 1-based
/// sequence of same-kind orders created on the server-local day.
pub fn format_order_number(kind: OrderKind, date: NaiveDate, sequence: i64) -> String {
    format!(
        "{}-{}-{:03}",
        kind.prefix(),
        date.format("%Y%m%d"),
        sequence
    )
}

/// Millisecond bounds `[start, end)` of the server-local day containing `now`.
/// Used to count today's orders when generating order numbers.
pub fn local_day_bounds(now: DateTime<Local>) -> (i64, i64) {
    let date = now.date_naive();
    let start = local_midnight_millis(date);
    let end = local_midnight_millis(date + chrono::Days::new(1));
    (start, end)
}

fn local_midnight_millis(date: NaiveDate) -> i64 {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        // DST gap or fold: take the earliest instant.
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => Utc
            .from_utc_datetime(&midnight)
            .timestamp_millis(),
    }
}
