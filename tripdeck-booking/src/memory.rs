// In-memory booking repository.
//
// Exercises the booking store and the HTTP surface without a database.
// Documents are kept in insertion order; `set_offline` simulates an
// unreachable store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tripdeck_core::repository::{BookingRepository, RepoResult};
use uuid::Uuid;

use crate::models::BookingStatus;
use crate::normalize;
use crate::ownership;

#[derive(Default)]
pub struct InMemoryBookingRepository {
    documents: RwLock<Vec<Value>>,
    offline: AtomicBool,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds raw documents as-is, e.g. records written by a legacy producer.
    pub async fn seed(&self, documents: impl IntoIterator<Item = Value>) {
        self.documents.write().await.extend(documents);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> RepoResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("Booking store offline".into());
        }
        Ok(())
    }
}

fn is_booking(document: &Value, booking_id: &str) -> bool {
    ["_id", "tripId", "TripId"]
        .iter()
        .any(|key| document.get(*key).and_then(Value::as_str) == Some(booking_id))
}

fn stamp(document: &mut Value, at: DateTime<Utc>) {
    document["updatedAt"] = Value::String(at.to_rfc3339());
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, mut document: Value) -> RepoResult<Value> {
        self.check_online()?;
        if !document.is_object() {
            return Err("Booking document must be an object".into());
        }
        if document.get("_id").is_none() {
            document["_id"] = Value::String(Uuid::new_v4().to_string());
        }
        self.documents.write().await.push(document.clone());
        Ok(document)
    }

    async fn find(&self, booking_id: &str) -> RepoResult<Option<Value>> {
        self.check_online()?;
        let documents = self.documents.read().await;
        Ok(documents.iter().find(|d| is_booking(d, booking_id)).cloned())
    }

    async fn find_by_user(&self, identifier: &str) -> RepoResult<Vec<Value>> {
        self.check_online()?;
        let documents = self.documents.read().await;
        // Walk newest-inserted first so the stable sort breaks ties that way.
        let mut owned: Vec<Value> = documents
            .iter()
            .rev()
            .filter(|d| ownership::matches_identifier(d, identifier))
            .cloned()
            .collect();
        owned.sort_by_key(|d| Reverse(normalize::created_at_of(d)));
        Ok(owned)
    }

    async fn apply_changes(
        &self,
        booking_id: &str,
        changes: &Map<String, Value>,
        entry: &Value,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Value>> {
        self.check_online()?;
        let sets_status = changes.contains_key("status") || changes.contains_key("Status");
        let mut documents = self.documents.write().await;
        let Some(document) = documents.iter_mut().find(|d| {
            is_booking(d, booking_id)
                && !(sets_status && normalize::status_of(d) == BookingStatus::Cancelled)
        }) else {
            return Ok(None);
        };

        if let Some(fields) = document.as_object_mut() {
            for (key, value) in changes {
                fields.insert(key.clone(), value.clone());
            }
            let history = fields
                .entry("modificationHistory")
                .or_insert_with(|| Value::Array(Vec::new()));
            if !history.is_array() {
                *history = Value::Array(Vec::new());
            }
            if let Value::Array(entries) = history {
                entries.push(entry.clone());
            }
        }
        stamp(document, at);
        Ok(Some(document.clone()))
    }

    async fn cancel_active(
        &self,
        booking_id: &str,
        cancellation: &Value,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Value>> {
        self.check_online()?;
        let mut documents = self.documents.write().await;
        let Some(document) = documents
            .iter_mut()
            .find(|d| is_booking(d, booking_id) && normalize::status_of(d).can_cancel())
        else {
            return Ok(None);
        };

        document["status"] = Value::String("cancelled".to_string());
        document["cancellation"] = cancellation.clone();
        stamp(document, at);
        Ok(Some(document.clone()))
    }

    async fn remove(&self, booking_id: &str) -> RepoResult<bool> {
        self.check_online()?;
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| !is_booking(d, booking_id));
        Ok(documents.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_storage_key() {
        let repo = InMemoryBookingRepository::new();
        let stored = repo.insert(json!({ "tripId": "TRIP-1-AAAAAAAAA" })).await.unwrap();

        let key = stored["_id"].as_str().unwrap();
        assert!(Uuid::parse_str(key).is_ok());
        assert_eq!(repo.find(key).await.unwrap(), Some(stored.clone()));
        assert_eq!(repo.find("TRIP-1-AAAAAAAAA").await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_legacy_status_guards_cancellation() {
        let repo = InMemoryBookingRepository::new();
        repo.seed([
            json!({ "_id": "a", "Status": "Completed" }),
            json!({ "_id": "b" }),
        ])
        .await;
        let cancellation = json!({ "cancelledBy": "u-1" });

        assert!(repo.cancel_active("a", &cancellation, Utc::now()).await.unwrap().is_none());
        let cancelled = repo.cancel_active("b", &cancellation, Utc::now()).await.unwrap().unwrap();
        assert_eq!(cancelled["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_cancelled_status_is_frozen() {
        let repo = InMemoryBookingRepository::new();
        repo.seed([json!({ "_id": "a", "Status": " Cancelled " })]).await;
        let entry = json!({ "reason": "x" });

        let mut reopen = Map::new();
        reopen.insert("status".to_string(), json!("pending"));
        assert!(repo.apply_changes("a", &reopen, &entry, Utc::now()).await.unwrap().is_none());

        let mut rename = Map::new();
        rename.insert("hotel".to_string(), json!("Ritz"));
        let updated = repo.apply_changes("a", &rename, &entry, Utc::now()).await.unwrap().unwrap();
        assert_eq!(updated["hotel"], "Ritz");
        assert_eq!(updated["Status"], " Cancelled ");
    }

    #[tokio::test]
    async fn test_mistyped_history_is_reset() {
        let repo = InMemoryBookingRepository::new();
        repo.seed([json!({ "_id": "a", "modificationHistory": "n/a" })]).await;

        let updated = repo
            .apply_changes("a", &Map::new(), &json!({ "reason": "x" }), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["modificationHistory"], json!([{ "reason": "x" }]));
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let repo = InMemoryBookingRepository::new();
        repo.set_offline(true);
        assert!(repo.find_by_user("ana@example.com").await.is_err());
        repo.set_offline(false);
        assert!(repo.find_by_user("ana@example.com").await.unwrap().is_empty());
    }
}
