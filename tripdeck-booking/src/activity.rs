use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;

use crate::models::{BookingStatus, NormalizedBooking};

/// How many bookings feed the activity list.
pub const RECENT_ACTIVITY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Booking,
    Completed,
    Cancellation,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub title: String,
    pub time: String,
    pub icon: String,
    pub color: String,
}

impl ActivityEntry {
    /// Shown when a user has no bookings yet.
    pub fn welcome() -> Self {
        Self {
            kind: ActivityKind::Profile,
            title: "Profile created".to_string(),
            time: "Welcome".to_string(),
            icon: "user".to_string(),
            color: "purple".to_string(),
        }
    }

    fn from_booking(booking: &NormalizedBooking, now: DateTime<Utc>) -> Self {
        let (kind, verb, icon, color) = match booking.status {
            BookingStatus::Cancelled => (ActivityKind::Cancellation, "Cancelled", "x-circle", "red"),
            BookingStatus::Completed => (ActivityKind::Completed, "Completed", "check-circle", "green"),
            BookingStatus::Pending | BookingStatus::Confirmed => {
                (ActivityKind::Booking, "Booked", "plane", "blue")
            }
        };
        let title = match booking.destination.trim() {
            "" => format!("{} a trip", verb),
            destination => format!("{} trip to {}", verb, destination),
        };
        let time = match booking.created_at {
            Some(created_at) => relative_time(created_at, now),
            None => "Recently".to_string(),
        };

        Self {
            kind,
            title,
            time,
            icon: icon.to_string(),
            color: color.to_string(),
        }
    }
}

/// "Today", "Yesterday", "3 days ago", "2 weeks ago", "1 month ago".
/// Timestamps in the future read as today.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - then).num_days().max(0);
    match days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{} days ago", days),
        7..=29 => plural(days / 7, "week"),
        _ => plural(days / 30, "month"),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// The activity list for the most recently created bookings, newest first.
/// Never empty: a user without bookings gets the welcome entry.
pub fn build_feed(bookings: &[NormalizedBooking], now: DateTime<Utc>) -> Vec<ActivityEntry> {
    let mut recent: Vec<&NormalizedBooking> = bookings.iter().collect();
    recent.sort_by_key(|b| Reverse(b.created_at));

    let feed: Vec<ActivityEntry> = recent
        .into_iter()
        .take(RECENT_ACTIVITY_LIMIT)
        .map(|b| ActivityEntry::from_booking(b, now))
        .collect();

    if feed.is_empty() {
        vec![ActivityEntry::welcome()]
    } else {
        feed
    }
}
