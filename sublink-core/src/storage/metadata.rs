//! Per-session metadata record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata file name inside a session directory
pub const METADATA_FILE: &str = "metadata.json";

/// Small record written once pairing succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub phone_number: String,
    /// Pairing start, unix seconds
    pub start_time: i64,
    /// When the record was written, unix seconds
    pub saved_at: i64,
}

impl SessionMetadata {
    pub fn new(id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            phone_number: id.to_string(),
            start_time: started_at.timestamp(),
            saved_at: Utc::now().timestamp(),
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start_time, 0)
    }
}
