//! Request/result pair exchanged with the execution bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A queued host-side operation invocation.
///
/// Created by the bridge when a caller submits work, and owned by it until the host
/// thread has executed it. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    /// Opaque unique token (UUID v4) correlating the request with its result.
    pub id: String,
    /// Name of the registered operation to run.
    pub operation: String,
    /// Named parameters handed to the operation.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// When the request entered the queue; drives result retention.
    pub enqueued_at: DateTime<Utc>,
}

/// Observable state of a submitted request.
///
/// Serialized with an internal `status` tag so the HTTP payloads read
/// `{"status":"completed","result":...}` or `{"status":"failed","message":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventResult {
    /// Queued or currently running on the host thread.
    Processing,
    /// The operation returned normally.
    Completed {
        #[serde(default)]
        result: Value,
    },
    /// The operation returned an error (or panicked) on the host thread.
    Failed { message: String },
    /// The id was never issued or its result has been pruned.
    NotFound,
}

impl EventResult {
    /// Returns true once the result can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventResult::Completed { .. } | EventResult::Failed { .. })
    }

    /// Wire label matching the serialized `status` tag.
    pub fn label(&self) -> &'static str {
        match self {
            EventResult::Processing => "processing",
            EventResult::Completed { .. } => "completed",
            EventResult::Failed { .. } => "failed",
            EventResult::NotFound => "not_found",
        }
    }
}

/// Body accepted by `POST /events/trigger`.
///
/// Both fields are optional at the serde level so a missing operation can be reported
/// as a submission error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerPayload {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

/// Acknowledgement returned by `POST /events/trigger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: String,
    pub event_id: String,
}

impl TriggerResponse {
    pub fn processing(event_id: impl Into<String>) -> Self {
        Self {
            status: "processing".to_string(),
            event_id: event_id.into(),
        }
    }
}
