//! Reads raw booking documents into [`NormalizedBooking`].
//!
//! Two writers have fed the `bookings` collection over time: the current one
//! uses camelCase keys (`destination`, `startDate`), an older one PascalCase
//! (`Destination`, `StartDate`). Every field is resolved through an explicit
//! priority list: the camelCase key, then the PascalCase key, then a default.
//! A key holding `null` or a value of the wrong type is skipped. Nothing here
//! fails.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::{BookingStatus, Flights, NormalizedBooking, Passengers, Price};

const ID: &[&str] = &["_id", "id", "Id"];
const TRIP_ID: &[&str] = &["tripId", "TripId"];
const DESTINATION: &[&str] = &["destination", "Destination"];
const START_DATE: &[&str] = &["startDate", "StartDate"];
const END_DATE: &[&str] = &["endDate", "EndDate"];
const DURATION: &[&str] = &["duration", "Duration"];
const PRICE: &[&str] = &["price", "Price"];
const DESTINATION_IMAGE: &[&str] = &["destinationImage", "DestinationImage"];
const PASSENGERS: &[&str] = &["passengers", "Passengers"];
const ADULTS: &[&str] = &["adults", "Adults"];
const CHILDREN: &[&str] = &["children", "Children"];
const INFANTS: &[&str] = &["infants", "Infants"];
const ACTIVITIES: &[&str] = &["activities", "Activities"];
const HOTEL: &[&str] = &["hotel", "Hotel"];
const HOTEL_NAME: &[&str] = &["name", "Name"];
const FLIGHTS: &[&str] = &["flights", "Flights"];
const OUTBOUND: &[&str] = &["outbound", "Outbound"];
const RETURN: &[&str] = &["return", "Return"];
const STATUS: &[&str] = &["status", "Status"];
const CREATED_AT: &[&str] = &["createdAt", "CreatedAt"];
const UPDATED_AT: &[&str] = &["updatedAt", "UpdatedAt"];

/// Status of a record that never stored one. Freshly created bookings are
/// `pending`, but legacy records without a status read as `confirmed`.
pub const DEFAULT_STATUS: BookingStatus = BookingStatus::Confirmed;

pub fn normalize(raw: &Value) -> NormalizedBooking {
    NormalizedBooking {
        id: pick(raw, ID, identifier),
        trip_id: pick(raw, TRIP_ID, text),
        destination: pick(raw, DESTINATION, text).unwrap_or_default(),
        start_date: pick(raw, START_DATE, parse_instant),
        end_date: pick(raw, END_DATE, parse_instant),
        duration: pick(raw, DURATION, duration),
        price: pick(raw, PRICE, price),
        destination_image: pick(raw, DESTINATION_IMAGE, text),
        passengers: pick(raw, PASSENGERS, passengers).unwrap_or_default(),
        activities: pick(raw, ACTIVITIES, activities).unwrap_or_default(),
        hotel: pick(raw, HOTEL, hotel),
        flights: pick(raw, FLIGHTS, flights),
        status: status_of(raw),
        created_at: pick(raw, CREATED_AT, parse_instant),
        updated_at: pick(raw, UPDATED_AT, parse_instant),
    }
}

pub fn normalize_all(raw: &[Value]) -> Vec<NormalizedBooking> {
    raw.iter().map(normalize).collect()
}

/// The effective status of a raw document, with the read-side default.
pub fn status_of(raw: &Value) -> BookingStatus {
    pick(raw, STATUS, |v| v.as_str().and_then(BookingStatus::parse)).unwrap_or(DEFAULT_STATUS)
}

pub fn destination_of(raw: &Value) -> Option<String> {
    pick(raw, DESTINATION, text)
}

pub fn price_of(raw: &Value) -> Option<&Value> {
    PRICE.iter().filter_map(|key| raw.get(*key)).find(|v| !v.is_null())
}

pub fn start_date_of(raw: &Value) -> Option<&Value> {
    START_DATE.iter().filter_map(|key| raw.get(*key)).find(|v| !v.is_null())
}

pub fn end_date_of(raw: &Value) -> Option<&Value> {
    END_DATE.iter().filter_map(|key| raw.get(*key)).find(|v| !v.is_null())
}

pub fn created_at_of(raw: &Value) -> Option<DateTime<Utc>> {
    pick(raw, CREATED_AT, parse_instant)
}

/// Reads an instant from the shapes the store has held: RFC 3339 strings,
/// naive ISO timestamps (taken as UTC), plain `YYYY-MM-DD` dates (midnight
/// UTC), epoch milliseconds and `{"$date": ...}` wrappers.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(naive.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => map.get("$date").and_then(parse_instant),
        _ => None,
    }
}

fn pick<'a, T>(raw: &'a Value, keys: &[&str], read: impl Fn(&'a Value) -> Option<T>) -> Option<T> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter(|v| !v.is_null())
        .find_map(read)
}

fn text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn duration(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn price(value: &Value) -> Option<Price> {
    match value {
        Value::String(s) => Some(Price::Text(s.clone())),
        Value::Number(n) => Some(Price::Amount(n.clone())),
        _ => None,
    }
}

fn count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn passengers(value: &Value) -> Option<Passengers> {
    if !value.is_object() {
        return None;
    }
    let defaults = Passengers::default();
    Some(Passengers {
        adults: pick(value, ADULTS, count).unwrap_or(defaults.adults),
        children: pick(value, CHILDREN, count).unwrap_or(defaults.children),
        infants: pick(value, INFANTS, count).unwrap_or(defaults.infants),
    })
}

fn activities(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(text).collect())
}

// Some writers stored the selected hotel object instead of its name.
fn hotel(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => pick(value, HOTEL_NAME, text),
        _ => None,
    }
}

fn flights(value: &Value) -> Option<Flights> {
    if !value.is_object() {
        return None;
    }
    Some(Flights {
        outbound: pick(value, OUTBOUND, text),
        return_leg: pick(value, RETURN, text),
    })
}
