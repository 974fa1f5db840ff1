use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use tripdeck_booking::normalize::created_at_of;
use tripdeck_core::repository::{BookingRepository, RepoResult};
use uuid::Uuid;

/// Bookings kept as JSONB documents. `trip_id` and `created_at` are lifted
/// into columns for lookups and ordering; the document stays authoritative.
///
/// `created_at` is lifted once, on insert, with the normalizer's date reading.
/// Rows written by other producers straight into the table keep whatever
/// column value they were given, so their ordering can differ from the
/// in-memory adapter's.
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn trip_id_of(document: &Value) -> Option<String> {
    ["tripId", "TripId"]
        .iter()
        .find_map(|key| document.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

const MATCH_BOOKING: &str = "(trip_id = $1 OR id::text = $1)";

// Same reading as `normalize::status_of`: canonical key first, trimmed,
// case-insensitive, absent means `confirmed`.
const STORED_STATUS: &str =
    "lower(btrim(COALESCE(doc->>'status', doc->>'Status', 'confirmed')))";

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, mut document: Value) -> RepoResult<Value> {
        if !document.is_object() {
            return Err("Booking document must be an object".into());
        }
        let id = Uuid::new_v4();
        document["_id"] = Value::String(id.to_string());
        let created_at = created_at_of(&document).unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
            INSERT INTO bookings (id, trip_id, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(id)
        .bind(trip_id_of(&document))
        .bind(Json(&document))
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(document)
    }

    async fn find(&self, booking_id: &str) -> RepoResult<Option<Value>> {
        let doc = sqlx::query_scalar::<_, Json<Value>>(&format!(
            "SELECT doc FROM bookings WHERE {}",
            MATCH_BOOKING
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc.map(|Json(doc)| doc))
    }

    async fn find_by_user(&self, identifier: &str) -> RepoResult<Vec<Value>> {
        // Emails compare case-insensitively; user references exactly. An email
        // also reaches bookings that only reference the user's id.
        let docs = sqlx::query_scalar::<_, Json<Value>>(
            r#"
            WITH account AS (
                SELECT id::text AS user_id FROM users WHERE lower(email) = lower($1)
            )
            SELECT doc FROM bookings
            WHERE lower(doc->>'email') = lower($1)
               OR lower(doc->>'userEmail') = lower($1)
               OR lower(doc#>>'{user,email}') = lower($1)
               OR doc->>'userId' = $1
               OR (jsonb_typeof(doc->'user') = 'string' AND doc->>'user' = $1)
               OR doc#>>'{user,id}' = $1
               OR doc->>'userId' IN (SELECT user_id FROM account)
               OR (jsonb_typeof(doc->'user') = 'string' AND doc->>'user' IN (SELECT user_id FROM account))
               OR doc#>>'{user,id}' IN (SELECT user_id FROM account)
            ORDER BY created_at DESC
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;

        Ok(docs.into_iter().map(|Json(doc)| doc).collect())
    }

    async fn apply_changes(
        &self,
        booking_id: &str,
        changes: &Map<String, Value>,
        entry: &Value,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Value>> {
        // One statement, so concurrent updates each land their own log entry.
        let doc = sqlx::query_scalar::<_, Json<Value>>(&format!(
            r#"
            UPDATE bookings
            SET doc = (doc || $2::jsonb) || jsonb_build_object(
                    'modificationHistory',
                    CASE WHEN jsonb_typeof(doc->'modificationHistory') = 'array'
                         THEN doc->'modificationHistory'
                         ELSE '[]'::jsonb
                    END || jsonb_build_array($3::jsonb),
                    'updatedAt', $4::text
                ),
                updated_at = $5
            WHERE {}
              AND (NOT ($2::jsonb ?| array['status', 'Status']) OR {} <> 'cancelled')
            RETURNING doc
            "#,
            MATCH_BOOKING, STORED_STATUS
        ))
        .bind(booking_id)
        .bind(Json(changes))
        .bind(Json(entry))
        .bind(at.to_rfc3339())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc.map(|Json(doc)| doc))
    }

    async fn cancel_active(
        &self,
        booking_id: &str,
        cancellation: &Value,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Value>> {
        // A missing status reads as `confirmed`, which is cancellable.
        let doc = sqlx::query_scalar::<_, Json<Value>>(&format!(
            r#"
            UPDATE bookings
            SET doc = doc || jsonb_build_object(
                    'status', 'cancelled',
                    'cancellation', $2::jsonb,
                    'updatedAt', $3::text
                ),
                updated_at = $4
            WHERE {}
              AND {} NOT IN ('cancelled', 'completed')
            RETURNING doc
            "#,
            MATCH_BOOKING, STORED_STATUS
        ))
        .bind(booking_id)
        .bind(Json(cancellation))
        .bind(at.to_rfc3339())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc.map(|Json(doc)| doc))
    }

    async fn remove(&self, booking_id: &str) -> RepoResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM bookings WHERE {}", MATCH_BOOKING))
            .bind(booking_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
