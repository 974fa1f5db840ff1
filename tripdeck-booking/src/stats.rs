use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::models::NormalizedBooking;

/// Per-user trip statistics shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStats {
    pub total_trips: usize,
    pub upcoming_trips: usize,
    pub completed_trips: usize,
    pub total_spent: i64,
    pub average_trip_cost: i64,
    pub favorite_destination: Option<String>,
    pub total_countries: usize,
    pub total_cities: usize,
}

/// Destinations are written "City, Country". The country is whatever follows
/// the first comma; a destination without a comma is its own country.
pub fn country_of(destination: &str) -> &str {
    match destination.split_once(',') {
        Some((_, country)) => country.trim(),
        None => destination.trim(),
    }
}

/// The part before the first comma, when there is one and it is not blank.
pub fn city_of(destination: &str) -> Option<&str> {
    let city = match destination.split_once(',') {
        Some((city, _)) => city,
        None => destination,
    }
    .trim();
    (!city.is_empty()).then_some(city)
}

pub fn aggregate(bookings: &[NormalizedBooking], now: DateTime<Utc>) -> TripStats {
    let total_trips = bookings.len();
    let upcoming_trips = bookings
        .iter()
        .filter(|b| b.start_date.is_some_and(|start| start > now))
        .count();
    let completed_trips = bookings
        .iter()
        .filter(|b| b.end_date.is_some_and(|end| end < now))
        .count();

    let total_spent = bookings
        .iter()
        .map(NormalizedBooking::price_amount)
        .fold(0i64, i64::saturating_add);
    let average_trip_cost = if total_trips == 0 {
        0
    } else {
        (total_spent as f64 / total_trips as f64).round() as i64
    };

    let destinations: Vec<&str> = bookings
        .iter()
        .map(|b| b.destination.trim())
        .filter(|d| !d.is_empty())
        .collect();

    let countries: HashSet<&str> = destinations.iter().map(|d| country_of(d)).collect();
    let cities: HashSet<&str> = destinations.iter().filter_map(|d| city_of(d)).collect();

    TripStats {
        total_trips,
        upcoming_trips,
        completed_trips,
        total_spent,
        average_trip_cost,
        favorite_destination: favorite_country(&destinations),
        total_countries: countries.len(),
        total_cities: cities.len(),
    }
}

// Most frequent country; ties go to the one seen first.
fn favorite_country(destinations: &[&str]) -> Option<String> {
    let mut buckets: Vec<(&str, usize)> = Vec::new();
    for destination in destinations {
        let country = country_of(destination);
        match buckets.iter_mut().find(|(name, _)| *name == country) {
            Some((_, count)) => *count += 1,
            None => buckets.push((country, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (country, count) in buckets {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((country, count));
        }
    }
    best.map(|(country, _)| country.to_string())
}
