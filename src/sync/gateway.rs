//! Remote gateway trait.
//!
//! Defines the request/response surface of the remote store. The sync
//! engine is written against this trait only; the HTTP implementation lives
//! in [`super::http`] and tests use a recording stub.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::model::{RecordFields, RecordStatus};

/// Failure talking to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote has no record with that id.
    #[error("not found")]
    NotFound,

    /// The remote refused the payload (validation, version mismatch).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network failure, timeout or unexpected server error.
    #[error("transport: {0}")]
    Transport(String),
}

/// A record as the remote store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub remote_id: String,
    #[serde(flatten)]
    pub fields: RecordFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Trait for remote stores.
///
/// Every method is a single request and never retries; retry policy belongs
/// to the scheduler.
pub trait RemoteGateway: Send + Sync {
    /// Create a record remotely, returning the remote id it was assigned.
    fn create_record(
        &self,
        fields: &RecordFields,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// Replace the remote content of a record.
    fn update_record(
        &self,
        remote_id: &str,
        fields: &RecordFields,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn set_status(
        &self,
        remote_id: &str,
        status: RecordStatus,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn set_pin(
        &self,
        remote_id: &str,
        pinned: bool,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn set_highlight(
        &self,
        remote_id: &str,
        highlighted: bool,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Delete a record remotely. Deleting an unknown id is not an error.
    fn delete_record(&self, remote_id: &str)
    -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Full snapshot of the owner's remote records.
    fn fetch_all(
        &self,
        owner_id: &str,
    ) -> impl Future<Output = Result<Vec<RemoteRecord>, RemoteError>> + Send;

    /// Check if the remote store can be reached right now.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordPayload, TimeTrigger};

    #[test]
    fn test_remote_record_wire_shape() {
        let json = serde_json::json!({
            "remote_id": "r42",
            "title": "Dentist",
            "status": "open",
            "kind": "reminder",
            "trigger": { "at": 1_700_000_000_000_i64 },
            "updated_at": 5
        });

        let record: RemoteRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.remote_id, "r42");
        assert_eq!(
            record.fields.payload,
            RecordPayload::Reminder {
                trigger: TimeTrigger::at(1_700_000_000_000),
                alarm: None,
            }
        );
        assert_eq!(record.updated_at, Some(5));
        assert_eq!(record.created_at, None);
    }

    #[test]
    fn test_remote_error_messages() {
        assert_eq!(RemoteError::NotFound.to_string(), "not found");
        assert_eq!(
            RemoteError::Transport("offline".into()).to_string(),
            "transport: offline"
        );
    }
}
