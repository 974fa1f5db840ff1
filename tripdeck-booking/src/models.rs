use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Case-insensitive parse of a stored status value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Only `pending` and `confirmed` bookings move to `cancelled`.
    pub fn can_cancel(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trip price as upstream writers send it: "$1,200" or 1200.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Amount(Number),
    Text(String),
}

impl Price {
    /// Whole currency units. Text keeps only its digits; numbers truncate.
    /// Anything unparsable counts as 0.
    pub fn amount(&self) -> i64 {
        match self {
            Price::Text(text) => parse_digits(text),
            Price::Amount(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(0),
        }
    }
}

/// Reads every digit in `text` as one number, ignoring everything else.
/// No digits gives 0; values past `i64::MAX` saturate.
pub fn parse_digits(text: &str) -> i64 {
    text.chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0i64, |acc, digit| acc.saturating_mul(10).saturating_add(i64::from(digit)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passengers {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
}

impl Default for Passengers {
    fn default() -> Self {
        Self { adults: 1, children: 0, infants: 0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flights {
    pub outbound: Option<String>,
    #[serde(rename = "return")]
    pub return_leg: Option<String>,
}

/// One entry of a booking's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationEntry {
    pub modified_at: DateTime<Utc>,
    pub changes: Map<String, Value>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: String,
    pub reason: String,
}

/// The canonical shape every stored booking is read into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBooking {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub trip_id: Option<String>,
    pub destination: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub price: Option<Price>,
    pub destination_image: Option<String>,
    pub passengers: Passengers,
    pub activities: Vec<String>,
    pub hotel: Option<String>,
    pub flights: Option<Flights>,
    pub status: BookingStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NormalizedBooking {
    pub fn price_amount(&self) -> i64 {
        self.price.as_ref().map(Price::amount).unwrap_or(0)
    }
}
