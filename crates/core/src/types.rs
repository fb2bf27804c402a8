use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// User identities are UUIDs issued by the external auth gateway.
pub type UserId = uuid::Uuid;

/// The closed set of music-generation providers.
///
/// `Manual` marks tracks created as drafts without any provider call
/// (e.g. uploaded or hand-assembled tracks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Suno,
    Mureka,
    Manual,
}

impl Provider {
    /// Database/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Suno => "suno",
            Provider::Mureka => "mureka",
            Provider::Manual => "manual",
        }
    }

    /// Parse the database/wire representation.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "suno" => Ok(Provider::Suno),
            "mureka" => Ok(Provider::Mureka),
            "manual" => Ok(Provider::Manual),
            other => Err(CoreError::Validation(format!(
                "Unknown provider '{other}'. Must be one of: suno, mureka, manual"
            ))),
        }
    }

    /// Whether tracks with this provider ever have an outstanding
    /// generation job.
    pub fn is_remote(self) -> bool {
        !matches!(self, Provider::Manual)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
