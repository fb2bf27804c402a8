//! Stored platform events (append-only audit ledger).

use serde::Serialize;
use sqlx::FromRow;
use tuneforge_core::types::{DbId, Timestamp, UserId};

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredEvent {
    pub id: DbId,
    /// Dot-separated event name, e.g. `"track.completed"`.
    pub event_type: String,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    pub actor_user_id: Option<UserId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
