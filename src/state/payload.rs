// Stored Payloads - Versioned envelopes around persisted data
// Shared by the database store and the JSON export

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::project::{Project, Track};

/// Current payload format version
pub const PAYLOAD_VERSION: u32 = 1;

/// `{version, updatedAt, data}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPayload<T> {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub data: T,
}

/// An in-progress loop being authored outside a saved project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Wrap an owned copy of `data` in a fresh envelope
pub fn create_stored_payload<T: Clone>(data: &T) -> StoredPayload<T> {
    StoredPayload {
        version: PAYLOAD_VERSION,
        updated_at: Utc::now(),
        data: data.clone(),
    }
}

pub fn create_stored_project_payload(project: &Project) -> StoredPayload<Project> {
    create_stored_payload(project)
}

/// Parse a stored envelope; malformed input is treated as absent
///
/// Other versions are returned unchanged.
pub fn parse_stored_payload<T: DeserializeOwned>(json: &str) -> Option<StoredPayload<T>> {
    match serde_json::from_str::<StoredPayload<T>>(json) {
        Ok(payload) => {
            if payload.version != PAYLOAD_VERSION {
                log::warn!(
                    "Stored payload version {} differs from {}, using data as-is",
                    payload.version,
                    PAYLOAD_VERSION
                );
            }
            Some(payload)
        }
        Err(e) => {
            log::warn!("Ignoring malformed stored payload: {}", e);
            None
        }
    }
}

/// Recover a project from stored JSON, exactly as it was stored
///
/// Accepts an envelope or a bare project; anything else yields an empty project.
pub fn deserialize_project(json: &str) -> Project {
    if let Ok(payload) = serde_json::from_str::<StoredPayload<Project>>(json) {
        return payload.data;
    }
    match serde_json::from_str::<Project>(json) {
        Ok(project) => project,
        Err(e) => {
            log::warn!("Malformed project data, starting empty: {}", e);
            Project::default()
        }
    }
}
