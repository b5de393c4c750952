//! Normalized repository activity.
//!
//! Everything the sensors read is one of two event kinds. GitHub pull
//! requests and their changed files are mapped here, as are pre-normalized
//! batches posted to `/ingest`, and stored rows are parsed back on the way out.

use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::connectors::github::{PullRequest, PullRequestFile};
use crate::models::event;

/// Canonical event kinds stored in `events.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PrMerged,
    FileChange,
}

impl EventKind {
    /// Return the canonical string representation for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::PrMerged => "pr_merged",
            EventKind::FileChange => "file_change",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of canonical kinds.
pub const ALL_EVENT_KINDS: &[EventKind] = &[EventKind::PrMerged, EventKind::FileChange];

/// Return the canonical kind corresponding to the provided string, if any.
pub fn parse_event_kind(kind: &str) -> Option<EventKind> {
    ALL_EVENT_KINDS.iter().copied().find(|k| k.as_str() == kind)
}

/// Errors raised while building or reading normalized events.
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
    #[error("{kind} event is missing required field: {field}")]
    MissingField {
        kind: EventKind,
        field: &'static str,
    },
    #[error("pull request #{0} has no merge timestamp")]
    NotMerged(i64),
    #[error("invalid merge timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error("malformed stored payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Body of a `pr_merged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergePayload {
    pub pr_id: i64,
    pub author: String,
    pub merged_at: String,
}

/// Body of a `file_change` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileChangePayload {
    pub pr_id: i64,
    pub file: String,
    pub additions: i64,
    pub deletions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Merge(MergePayload),
    FileChange(FileChangePayload),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Merge(_) => EventKind::PrMerged,
            EventPayload::FileChange(_) => EventKind::FileChange,
        }
    }

    pub fn pr_id(&self) -> i64 {
        match self {
            EventPayload::Merge(p) => p.pr_id,
            EventPayload::FileChange(p) => p.pr_id,
        }
    }

    /// JSON stored in `events.payload`.
    pub fn to_json(&self) -> Value {
        let encoded = match self {
            EventPayload::Merge(p) => serde_json::to_value(p),
            EventPayload::FileChange(p) => serde_json::to_value(p),
        };
        // Plain structs of strings and integers always encode
        encoded.unwrap_or(Value::Null)
    }

    pub fn from_json(kind: EventKind, value: Value) -> Result<Self, NormalizationError> {
        Ok(match kind {
            EventKind::PrMerged => EventPayload::Merge(serde_json::from_value(value)?),
            EventKind::FileChange => EventPayload::FileChange(serde_json::from_value(value)?),
        })
    }
}

/// A single normalized event, the unit the sensors aggregate over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    /// Epoch milliseconds
    pub ts: i64,
    pub payload: EventPayload,
}

impl ActivityEvent {
    pub fn merge(pr_id: i64, author: impl Into<String>, merged_at: impl Into<String>, ts: i64) -> Self {
        Self {
            ts,
            payload: EventPayload::Merge(MergePayload {
                pr_id,
                author: author.into(),
                merged_at: merged_at.into(),
            }),
        }
    }

    pub fn file_change(
        pr_id: i64,
        file: impl Into<String>,
        additions: i64,
        deletions: i64,
        ts: i64,
    ) -> Self {
        Self {
            ts,
            payload: EventPayload::FileChange(FileChangePayload {
                pr_id,
                file: file.into(),
                additions,
                deletions,
            }),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl TryFrom<event::Model> for ActivityEvent {
    type Error = NormalizationError;

    fn try_from(model: event::Model) -> Result<Self, Self::Error> {
        let kind =
            parse_event_kind(&model.kind).ok_or(NormalizationError::UnknownKind(model.kind))?;
        Ok(Self {
            ts: model.ts,
            payload: EventPayload::from_json(kind, model.payload)?,
        })
    }
}

/// Parse stored rows, dropping (and logging) any that no longer decode.
pub fn decode_events(models: Vec<event::Model>) -> Vec<ActivityEvent> {
    models
        .into_iter()
        .filter_map(|model| {
            let id = model.id;
            match ActivityEvent::try_from(model) {
                Ok(event) => Some(event),
                Err(error) => {
                    tracing::warn!(event_id = %id, %error, "Skipping undecodable event");
                    None
                }
            }
        })
        .collect()
}

/// Optional fields accepted on a pre-normalized ingest payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestPayload {
    pub file: Option<String>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub merged_at: Option<String>,
    pub author: Option<String>,
}

/// One element of the `/ingest` batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// GitHub pull request number
    pub pr_id: i64,
    #[serde(default)]
    pub payload: IngestPayload,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl TryFrom<IngestEvent> for ActivityEvent {
    type Error = NormalizationError;

    fn try_from(input: IngestEvent) -> Result<Self, Self::Error> {
        let IngestEvent {
            kind,
            pr_id,
            payload,
            timestamp,
        } = input;

        match kind {
            EventKind::PrMerged => {
                let author = payload.author.ok_or(NormalizationError::MissingField {
                    kind,
                    field: "author",
                })?;
                let merged_at = payload
                    .merged_at
                    .or_else(|| DateTime::from_timestamp_millis(timestamp).map(|t| t.to_rfc3339()))
                    .ok_or(NormalizationError::MissingField {
                        kind,
                        field: "mergedAt",
                    })?;
                Ok(ActivityEvent::merge(pr_id, author, merged_at, timestamp))
            }
            EventKind::FileChange => {
                let file = payload.file.ok_or(NormalizationError::MissingField {
                    kind,
                    field: "file",
                })?;
                Ok(ActivityEvent::file_change(
                    pr_id,
                    file,
                    payload.additions.unwrap_or(0),
                    payload.deletions.unwrap_or(0),
                    timestamp,
                ))
            }
        }
    }
}

/// Map a merged pull request and its changed files to events.
///
/// All events share the merge timestamp. A pull request without a `user`
/// is attributed to `"unknown"`.
pub fn normalize_merged_pull_request(
    pr: &PullRequest,
    files: &[PullRequestFile],
) -> Result<Vec<ActivityEvent>, NormalizationError> {
    let merged_at = pr
        .merged_at
        .as_deref()
        .ok_or(NormalizationError::NotMerged(pr.number))?;
    let ts = DateTime::parse_from_rfc3339(merged_at)
        .map_err(|source| NormalizationError::InvalidTimestamp {
            value: merged_at.to_string(),
            source,
        })?
        .timestamp_millis();
    let author = pr
        .user
        .as_ref()
        .map(|u| u.login.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let mut events = Vec::with_capacity(files.len() + 1);
    events.push(ActivityEvent::merge(pr.number, author, merged_at, ts));
    events.extend(files.iter().map(|f| {
        ActivityEvent::file_change(pr.number, f.filename.clone(), f.additions, f.deletions, ts)
    }));
    Ok(events)
}
