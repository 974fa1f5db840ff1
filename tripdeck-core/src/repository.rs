use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;
pub type RepoResult<T> = Result<T, RepoError>;

/// Document access for the `bookings` collection.
///
/// Documents are stored as loosely-shaped JSON objects because older writers
/// used a different field casing. A `booking_id` may be either the trip
/// identifier (`tripId`) or the storage key (`_id`).
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Stores a new document, assigning its `_id`, and returns it as stored.
    async fn insert(&self, document: Value) -> RepoResult<Value>;

    async fn find(&self, booking_id: &str) -> RepoResult<Option<Value>>;

    /// Documents owned by `identifier`, an email or a user id, newest first.
    ///
    /// Ownership is matched on `email`, `userEmail`, `user.email` and on the
    /// user reference (`userId`, `user`, `user.id`).
    async fn find_by_user(&self, identifier: &str) -> RepoResult<Vec<Value>>;

    /// Merges `changes` into the document, appends `entry` to its
    /// `modificationHistory` and sets `updatedAt`, as one atomic write.
    /// When `changes` sets `status`/`Status`, the write only applies while the
    /// stored status is not `cancelled`. Returns `None` when the booking does
    /// not exist or the status guard refused the write.
    async fn apply_changes(
        &self,
        booking_id: &str,
        changes: &Map<String, Value>,
        entry: &Value,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Value>>;

    /// Marks the booking cancelled only while its status is `pending` or
    /// `confirmed` (an absent status reads as `confirmed`). Returns `None` when
    /// nothing matched the guard.
    async fn cancel_active(
        &self,
        booking_id: &str,
        cancellation: &Value,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Value>>;

    /// Hard delete. Returns whether a document was removed.
    async fn remove(&self, booking_id: &str) -> RepoResult<bool>;
}
