use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use tripdeck_core::identity::Identity;
use tripdeck_core::pii::Masked;
use tripdeck_core::repository::{BookingRepository, RepoError};
use tripdeck_core::{CoreError, CoreResult, ValidationErrors};

use crate::models::{BookingStatus, Cancellation, ModificationEntry};
use crate::normalize::{self, parse_instant};
use crate::ownership;

const TRIP_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TRIP_ID_SUFFIX_LEN: usize = 9;

pub const DEFAULT_UPDATE_REASON: &str = "Updated by system";
pub const DEFAULT_CANCEL_REASON: &str = "Cancelled by user";

/// Keys the engine owns. Clients cannot set them on create or change them on update.
const PROTECTED_KEYS: &[&str] = &[
    "_id",
    "tripId",
    "TripId",
    "createdAt",
    "CreatedAt",
    "updatedAt",
    "UpdatedAt",
    "modificationHistory",
    "cancellation",
];

/// `TRIP-<unix millis>-<9 uppercase alphanumerics>`
pub fn generate_trip_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TRIP_ID_SUFFIX_LEN)
        .map(|_| TRIP_ID_ALPHABET[rng.gen_range(0..TRIP_ID_ALPHABET.len())] as char)
        .collect();
    format!("TRIP-{}-{}", now.timestamp_millis(), suffix)
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339())
}

fn persistence(operation: &str, err: RepoError) -> CoreError {
    error!("Booking store {} failed: {}", operation, err);
    CoreError::Persistence(err.to_string())
}

/// Create, read, update, cancel and delete operations over booking documents.
/// Owns the modification log and the cancellation metadata.
pub struct BookingStore {
    repo: Arc<dyn BookingRepository>,
}

impl BookingStore {
    pub fn new(repo: Arc<dyn BookingRepository>) -> Self {
        Self { repo }
    }

    /// Validates a raw booking payload and stores it as a new `pending` booking.
    pub async fn create(&self, data: Value) -> CoreResult<Value> {
        let Value::Object(mut document) = data else {
            return Err(CoreError::invalid("body", "Booking payload must be a JSON object"));
        };
        validate_new_booking(&Value::Object(document.clone()))?;

        for key in PROTECTED_KEYS.iter().chain(["status", "Status"].iter()) {
            document.remove(*key);
        }

        let now = Utc::now();
        let trip_id = generate_trip_id(now);
        document.insert("tripId".to_string(), Value::String(trip_id.clone()));
        document.insert("status".to_string(), Value::String(BookingStatus::Pending.to_string()));
        document.insert("modificationHistory".to_string(), Value::Array(Vec::new()));
        document.insert("createdAt".to_string(), timestamp(now));
        document.insert("updatedAt".to_string(), timestamp(now));

        let stored = self
            .repo
            .insert(Value::Object(document))
            .await
            .map_err(|e| persistence("create", e))?;

        info!("Booking created: {}", trip_id);
        Ok(stored)
    }

    pub async fn find(&self, booking_id: &str) -> CoreResult<Value> {
        self.repo
            .find(booking_id)
            .await
            .map_err(|e| persistence("find", e))?
            .ok_or_else(|| CoreError::NotFound(booking_id.to_string()))
    }

    /// Bookings owned by an email or a user id, newest first.
    pub async fn find_by_user(&self, identifier: &str) -> CoreResult<Vec<Value>> {
        let documents = self
            .repo
            .find_by_user(identifier)
            .await
            .map_err(|e| persistence("find_by_user", e))?;
        tracing::debug!("Found {} bookings for {}", documents.len(), Masked(identifier));
        Ok(documents)
    }

    /// Applies `delta` and appends one entry to the booking's modification log.
    ///
    /// An optional `reason` key in the delta is recorded on the log entry
    /// rather than written to the booking.
    pub async fn update(&self, booking_id: &str, delta: Value) -> CoreResult<Value> {
        let Value::Object(mut changes) = delta else {
            return Err(CoreError::invalid("body", "Update payload must be a JSON object"));
        };

        let reason = match changes.remove("reason") {
            Some(Value::String(reason)) if !reason.trim().is_empty() => reason,
            _ => DEFAULT_UPDATE_REASON.to_string(),
        };
        for key in PROTECTED_KEYS {
            changes.remove(*key);
        }
        canonicalize_status(&mut changes)?;

        let now = Utc::now();
        let entry = ModificationEntry {
            modified_at: now,
            changes: changes.clone(),
            reason,
        };
        let entry = serde_json::to_value(&entry).map_err(|e| persistence("update", e.into()))?;

        let updated = self
            .repo
            .apply_changes(booking_id, &changes, &entry, now)
            .await
            .map_err(|e| persistence("update", e))?;

        let Some(updated) = updated else {
            // Either the booking is gone or it is cancelled and the delta
            // tried to move its status.
            let current = self.find(booking_id).await?;
            return Err(match normalize::status_of(&current) {
                BookingStatus::Cancelled => {
                    CoreError::invalid("status", "Cancelled bookings cannot change status")
                }
                _ => CoreError::NotFound(booking_id.to_string()),
            });
        };

        info!("Booking updated: {} ({} fields)", booking_id, changes.len());
        Ok(updated)
    }

    /// Moves a `pending` or `confirmed` booking to `cancelled`.
    ///
    /// Cancelling an already cancelled booking returns it untouched; the
    /// original cancellation metadata is kept. Completed trips cannot be
    /// cancelled.
    pub async fn cancel(
        &self,
        booking_id: &str,
        acting_user_id: &str,
        reason: Option<&str>,
    ) -> CoreResult<Value> {
        let current = self.find(booking_id).await?;
        if let Some(settled) = settled_cancellation(booking_id, current)? {
            return Ok(settled);
        }

        let now = Utc::now();
        let cancellation = Cancellation {
            cancelled_at: now,
            cancelled_by: acting_user_id.to_string(),
            reason: reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_CANCEL_REASON)
                .to_string(),
        };
        let cancellation =
            serde_json::to_value(&cancellation).map_err(|e| persistence("cancel", e.into()))?;

        let cancelled = self
            .repo
            .cancel_active(booking_id, &cancellation, now)
            .await
            .map_err(|e| persistence("cancel", e))?;

        match cancelled {
            Some(document) => {
                info!("Booking cancelled: {} by {}", booking_id, acting_user_id);
                Ok(document)
            }
            // Another writer moved the status first; judge what is stored now.
            None => {
                let current = self.find(booking_id).await?;
                settled_cancellation(booking_id, current)?.ok_or_else(|| {
                    CoreError::Persistence(format!("Cancellation of {} did not apply", booking_id))
                })
            }
        }
    }

    /// Hard delete, permitted to the booking's owner or an administrator.
    pub async fn delete(&self, booking_id: &str, identity: &Identity) -> CoreResult<()> {
        let current = self.find(booking_id).await?;
        ensure_access(&current, identity)?;

        let removed = self
            .repo
            .remove(booking_id)
            .await
            .map_err(|e| persistence("delete", e))?;
        if !removed {
            return Err(CoreError::NotFound(booking_id.to_string()));
        }

        info!("Booking deleted: {} by {}", booking_id, identity.actor());
        Ok(())
    }
}

/// `Some` when a cancel has nothing left to do (already cancelled), an error
/// when the booking can never be cancelled, `None` when it still can be.
fn settled_cancellation(booking_id: &str, current: Value) -> CoreResult<Option<Value>> {
    match normalize::status_of(&current) {
        BookingStatus::Cancelled => {
            info!("Booking {} already cancelled, nothing to do", booking_id);
            Ok(Some(current))
        }
        BookingStatus::Completed => Err(CoreError::invalid(
            "status",
            "Completed bookings cannot be cancelled",
        )),
        BookingStatus::Pending | BookingStatus::Confirmed => Ok(None),
    }
}

/// Owners and administrators may act on a booking; everyone else is refused.
pub fn ensure_access(document: &Value, identity: &Identity) -> CoreResult<()> {
    if identity.is_admin() || ownership::is_owned_by(document, identity) {
        Ok(())
    } else {
        Err(CoreError::Forbidden("Booking does not belong to you".to_string()))
    }
}

fn validate_new_booking(document: &Value) -> CoreResult<()> {
    let mut errors = ValidationErrors::default();

    match normalize::destination_of(document) {
        Some(destination) if !destination.trim().is_empty() => {}
        _ => errors.add("destination", "Destination is required"),
    }

    if !ownership::has_owner(document) {
        errors.add("email", "An owner email or user id is required");
    }

    if let Some(price) = normalize::price_of(document) {
        if !(price.is_string() || price.is_number()) {
            errors.add("price", "Price must be a string or a number");
        }
    }

    let start = normalize::start_date_of(document).map(|v| (v, parse_instant(v)));
    let end = normalize::end_date_of(document).map(|v| (v, parse_instant(v)));
    if let Some((_, None)) = start {
        errors.add("startDate", "Start date is not a valid date");
    }
    if let Some((_, None)) = end {
        errors.add("endDate", "End date is not a valid date");
    }
    if let (Some((_, Some(start))), Some((_, Some(end)))) = (start, end) {
        if end < start {
            errors.add("endDate", "End date must not be before the start date");
        }
    }

    errors.into_result()
}

/// Rejects unknown statuses in an update and stores known ones lowercased.
/// `cancelled` is only reachable through [`BookingStore::cancel`].
fn canonicalize_status(changes: &mut Map<String, Value>) -> CoreResult<()> {
    for key in ["status", "Status"] {
        let Some(value) = changes.get_mut(key) else {
            continue;
        };
        let status = value
            .as_str()
            .and_then(BookingStatus::parse)
            .ok_or_else(|| {
                CoreError::invalid(
                    "status",
                    "Status must be one of pending, confirmed, completed, cancelled",
                )
            })?;
        if status == BookingStatus::Cancelled {
            return Err(CoreError::invalid(
                "status",
                "Use cancel to cancel a booking",
            ));
        }
        *value = Value::String(status.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBookingRepository;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use tripdeck_core::identity::Role;
    use tripdeck_core::repository::RepoResult;

    fn store() -> (BookingStore, Arc<InMemoryBookingRepository>) {
        let repo = Arc::new(InMemoryBookingRepository::new());
        (BookingStore::new(repo.clone()), repo)
    }

    fn paris() -> Value {
        json!({
            "email": "ana@example.com",
            "destination": "Paris, France",
            "startDate": "2030-05-01",
            "endDate": "2030-05-07",
            "price": "$1200",
            "status": "confirmed",
            "tripId": "TRIP-client-supplied"
        })
    }

    fn history_len(document: &Value) -> usize {
        document["modificationHistory"].as_array().map(Vec::len).unwrap_or(0)
    }

    fn is_trip_id(id: &str) -> bool {
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        parts.len() == 3
            && parts[0] == "TRIP"
            && !parts[1].is_empty()
            && parts[1].chars().all(|c| c.is_ascii_digit())
            && parts[2].len() == 9
            && parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    }

    #[test]
    fn test_trip_id_format_and_uniqueness() {
        let now = Utc::now();
        let ids: HashSet<String> = (0..10_000).map(|_| generate_trip_id(now)).collect();

        assert_eq!(ids.len(), 10_000);
        assert!(ids.iter().all(|id| is_trip_id(id)));
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_pending_status() {
        let (store, _) = store();

        let created = store.create(paris()).await.unwrap();

        let trip_id = created["tripId"].as_str().unwrap();
        assert!(is_trip_id(trip_id));
        assert_ne!(trip_id, "TRIP-client-supplied");
        assert_eq!(created["status"], "pending");
        assert_eq!(created["createdAt"], created["updatedAt"]);
        assert_eq!(history_len(&created), 0);
        assert!(created["_id"].is_string());
    }

    #[tokio::test]
    async fn test_create_reports_field_errors() {
        let (store, _) = store();

        let err = store
            .create(json!({ "price": { "amount": 5 }, "startDate": "2030-05-07", "endDate": "2030-05-01" }))
            .await
            .unwrap_err();

        let CoreError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.get("destination").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("price").is_some());
        assert!(errors.get("endDate").is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_non_object() {
        let (store, _) = store();
        assert!(matches!(store.create(json!([1, 2])).await, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_surfaces_storage_failure() {
        let (store, repo) = store();
        repo.set_offline(true);

        assert!(matches!(store.create(paris()).await, Err(CoreError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_each_update_appends_one_log_entry() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        let first = store
            .update(&trip_id, json!({ "hotel": "Le Meurice", "reason": "Guest upgrade" }))
            .await
            .unwrap();
        let second = store.update(&trip_id, json!({ "status": "CONFIRMED" })).await.unwrap();

        assert_eq!(history_len(&first), 1);
        assert_eq!(history_len(&second), 2);
        assert_eq!(second["hotel"], "Le Meurice");
        assert_eq!(second["status"], "confirmed");
        assert!(second.get("reason").is_none());

        let log = second["modificationHistory"].as_array().unwrap();
        assert_eq!(log[0]["reason"], "Guest upgrade");
        assert_eq!(log[0]["changes"], json!({ "hotel": "Le Meurice" }));
        assert_eq!(log[1]["reason"], DEFAULT_UPDATE_REASON);

        let created_at = parse_instant(&second["createdAt"]).unwrap();
        let updated_at = parse_instant(&second["updatedAt"]).unwrap();
        assert!(updated_at >= created_at);
    }

    #[tokio::test]
    async fn test_update_cannot_touch_protected_fields() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        let updated = store
            .update(
                &trip_id,
                json!({
                    "tripId": "TRIP-0-HIJACKED0",
                    "createdAt": "1999-01-01T00:00:00Z",
                    "modificationHistory": [],
                    "price": "$1500"
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated["tripId"], trip_id.as_str());
        assert_eq!(updated["createdAt"], created["createdAt"]);
        assert_eq!(updated["price"], "$1500");
        assert_eq!(history_len(&updated), 1);
    }

    #[tokio::test]
    async fn test_update_validates_status_and_existence() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        assert!(matches!(
            store.update(&trip_id, json!({ "status": "teleported" })).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            store.update("TRIP-0-MISSING00", json!({ "hotel": "x" })).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        let cancelled = store.cancel(&trip_id, "u-1", Some("Change of plans")).await.unwrap();
        assert_eq!(cancelled["status"], "cancelled");
        assert_eq!(cancelled["cancellation"]["cancelledBy"], "u-1");
        assert_eq!(cancelled["cancellation"]["reason"], "Change of plans");

        let again = store.cancel(&trip_id, "u-2", Some("Second try")).await.unwrap();
        assert_eq!(again["cancellation"], cancelled["cancellation"]);
        assert_eq!(again["updatedAt"], cancelled["updatedAt"]);
    }

    #[tokio::test]
    async fn test_cancel_defaults_reason_and_refuses_completed() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        let cancelled = store.cancel(&trip_id, "u-1", None).await.unwrap();
        assert_eq!(cancelled["cancellation"]["reason"], DEFAULT_CANCEL_REASON);

        let other = store.create(paris()).await.unwrap();
        let other_id = other["tripId"].as_str().unwrap().to_string();
        store.update(&other_id, json!({ "status": "completed" })).await.unwrap();
        assert!(matches!(
            store.cancel(&other_id, "u-1", None).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            store.cancel("TRIP-0-MISSING00", "u-1", None).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_cannot_cancel() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        let err = store
            .update(&trip_id, json!({ "Status": "Cancelled" }))
            .await
            .unwrap_err();
        let CoreError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.get("status").is_some());
        assert_eq!(history_len(&store.find(&trip_id).await.unwrap()), 0);

        let cancelled = store.cancel(&trip_id, "u-1", Some("first")).await.unwrap();
        assert_eq!(cancelled["cancellation"]["cancelledBy"], "u-1");
        assert_eq!(cancelled["cancellation"]["reason"], "first");
    }

    #[tokio::test]
    async fn test_cancelled_booking_cannot_be_reopened() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();
        let cancelled = store.cancel(&trip_id, "u-1", Some("first")).await.unwrap();

        assert!(matches!(
            store.update(&trip_id, json!({ "status": "pending" })).await,
            Err(CoreError::Validation(_))
        ));
        let noted = store
            .update(&trip_id, json!({ "notes": "refund issued" }))
            .await
            .unwrap();
        assert_eq!(noted["status"], "cancelled");
        assert_eq!(noted["cancellation"], cancelled["cancellation"]);

        let again = store.cancel(&trip_id, "u-2", Some("second")).await.unwrap();
        assert_eq!(again["cancellation"], cancelled["cancellation"]);
    }

    /// Completes the booking just before the guarded cancel write lands.
    struct CompletedMidCancel(InMemoryBookingRepository);

    #[async_trait]
    impl BookingRepository for CompletedMidCancel {
        async fn insert(&self, document: Value) -> RepoResult<Value> {
            self.0.insert(document).await
        }

        async fn find(&self, booking_id: &str) -> RepoResult<Option<Value>> {
            self.0.find(booking_id).await
        }

        async fn find_by_user(&self, identifier: &str) -> RepoResult<Vec<Value>> {
            self.0.find_by_user(identifier).await
        }

        async fn apply_changes(
            &self,
            booking_id: &str,
            changes: &Map<String, Value>,
            entry: &Value,
            at: DateTime<Utc>,
        ) -> RepoResult<Option<Value>> {
            self.0.apply_changes(booking_id, changes, entry, at).await
        }

        async fn cancel_active(
            &self,
            booking_id: &str,
            cancellation: &Value,
            at: DateTime<Utc>,
        ) -> RepoResult<Option<Value>> {
            let mut completed = Map::new();
            completed.insert("status".to_string(), json!("completed"));
            self.0
                .apply_changes(booking_id, &completed, &json!({ "reason": "trip ended" }), at)
                .await?;
            self.0.cancel_active(booking_id, cancellation, at).await
        }

        async fn remove(&self, booking_id: &str) -> RepoResult<bool> {
            self.0.remove(booking_id).await
        }
    }

    #[tokio::test]
    async fn test_cancel_losing_to_completion_is_refused() {
        let store = BookingStore::new(Arc::new(CompletedMidCancel(InMemoryBookingRepository::new())));
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        let err = store.cancel(&trip_id, "u-1", None).await.unwrap_err();
        let CoreError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.get("status").is_some());
        assert_eq!(store.find(&trip_id).await.unwrap()["status"], "completed");
    }

    #[tokio::test]
    async fn test_delete_by_stranger_is_forbidden_and_keeps_record() {
        let (store, _) = store();
        let created = store.create(paris()).await.unwrap();
        let trip_id = created["tripId"].as_str().unwrap().to_string();

        let stranger = Identity::new("u-99", "mallory@example.com", Role::User);
        assert!(matches!(
            store.delete(&trip_id, &stranger).await,
            Err(CoreError::Forbidden(_))
        ));
        assert_eq!(store.find(&trip_id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_delete_by_owner_or_admin() {
        let (store, _) = store();
        let first = store.create(paris()).await.unwrap();
        let second = store.create(paris()).await.unwrap();
        let first_id = first["tripId"].as_str().unwrap().to_string();
        let second_id = second["_id"].as_str().unwrap().to_string();

        store.delete(&first_id, &Identity::from_email("ana@example.com")).await.unwrap();
        let admin = Identity::new("admin-1", "ops@example.com", Role::Admin);
        store.delete(&second_id, &admin).await.unwrap();

        assert!(matches!(store.find(&first_id).await, Err(CoreError::NotFound(_))));
        assert!(matches!(
            store.delete(&second_id, &admin).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_user_matches_every_owner_field_newest_first() {
        let (store, _) = store();
        store.create(json!({ "email": "ana@example.com", "destination": "Rome, Italy" })).await.unwrap();
        store.create(json!({ "userEmail": "ana@example.com", "destination": "Oslo, Norway" })).await.unwrap();
        store
            .create(json!({ "user": { "email": "ana@example.com" }, "destination": "Lima, Peru" }))
            .await
            .unwrap();
        store.create(json!({ "email": "bob@example.com", "destination": "Cairo, Egypt" })).await.unwrap();

        let found = store.find_by_user("ana@example.com").await.unwrap();

        let destinations: Vec<&str> = found.iter().map(|d| d["destination"].as_str().unwrap()).collect();
        assert_eq!(destinations, vec!["Lima, Peru", "Oslo, Norway", "Rome, Italy"]);
    }
}
