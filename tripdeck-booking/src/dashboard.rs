use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::info;
use tripdeck_core::identity::Identity;
use tripdeck_core::pii::Masked;
use tripdeck_core::{CoreError, CoreResult};

use crate::activity::{build_feed, ActivityEntry};
use crate::models::NormalizedBooking;
use crate::normalize::normalize_all;
use crate::stats::{aggregate, TripStats};
use crate::store::BookingStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_trips: usize,
    pub next_trip: Option<NormalizedBooking>,
    pub last_trip: Option<NormalizedBooking>,
}

/// Everything a user's dashboard shows, in one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub trips: Vec<NormalizedBooking>,
    pub stats: TripStats,
    pub recent_activity: Vec<ActivityEntry>,
    pub summary: DashboardSummary,
}

/// Earliest trip that has not started yet.
pub fn next_trip(trips: &[NormalizedBooking], now: DateTime<Utc>) -> Option<&NormalizedBooking> {
    trips
        .iter()
        .filter_map(|t| t.start_date.filter(|start| *start > now).map(|start| (start, t)))
        .min_by_key(|(start, _)| *start)
        .map(|(_, t)| t)
}

/// Most recently finished trip.
pub fn last_trip(trips: &[NormalizedBooking], now: DateTime<Utc>) -> Option<&NormalizedBooking> {
    trips
        .iter()
        .filter_map(|t| t.end_date.filter(|end| *end < now).map(|end| (end, t)))
        .min_by_key(|(end, _)| Reverse(*end))
        .map(|(_, t)| t)
}

pub fn compose(trips: Vec<NormalizedBooking>, now: DateTime<Utc>) -> Dashboard {
    let stats = aggregate(&trips, now);
    let recent_activity = build_feed(&trips, now);
    let summary = DashboardSummary {
        total_trips: stats.total_trips,
        next_trip: next_trip(&trips, now).cloned(),
        last_trip: last_trip(&trips, now).cloned(),
    };

    Dashboard {
        trips,
        stats,
        recent_activity,
        summary,
    }
}

pub struct DashboardComposer {
    store: Arc<BookingStore>,
}

impl DashboardComposer {
    pub fn new(store: Arc<BookingStore>) -> Self {
        Self { store }
    }

    /// Builds the dashboard of `target_email` for `identity`, who must be
    /// that same user.
    pub async fn load(&self, identity: &Identity, target_email: &str) -> CoreResult<Dashboard> {
        if !identity.has_email(target_email) {
            return Err(CoreError::Forbidden(
                "Dashboards are only visible to their owner".to_string(),
            ));
        }

        let raw = self.store.find_by_user(target_email.trim()).await?;
        let dashboard = compose(normalize_all(&raw), Utc::now());

        info!(
            "Dashboard composed for {}: {} trips",
            Masked(target_email),
            dashboard.stats.total_trips
        );
        Ok(dashboard)
    }
}
