//! Records exchanged with the remote store and the execution engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Administrative approval of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
}

/// Liveness as seen by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalStatus {
    Online,
    Offline,
}

impl OperationalStatus {
    /// Aggregate status of a machine: online iff any worker is online.
    #[must_use]
    pub fn aggregate<I>(workers: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        if workers.into_iter().any(|s| s == Self::Online) {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// Worker record owned by the remote store.
///
/// `Online` implies `last_heartbeat` is within the staleness window; the
/// sweeper enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWorkerRecord {
    pub worker_id: String,
    pub machine_id: String,
    pub approval_status: ApprovalStatus,
    pub operational_status: OperationalStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Answer to a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub approved: bool,
}

/// A capability advertised by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Capability {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Session as listed by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSession {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl LocalSession {
    #[must_use]
    pub fn new(id: impl Into<String>, title: Option<&str>) -> Self {
        Self {
            id: id.into(),
            title: title.map(str::to_string),
        }
    }
}

/// Persisted session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub persisted_id: String,
    #[serde(default)]
    pub linked_local_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub marked_gone: bool,
}

impl SessionRecord {
    /// A live record linked to `local_id`.
    #[must_use]
    pub fn linked(
        persisted_id: impl Into<String>,
        local_id: impl Into<String>,
        name: Option<&str>,
    ) -> Self {
        Self {
            persisted_id: persisted_id.into(),
            linked_local_id: Some(local_id.into()),
            name: name.map(str::to_string),
            marked_gone: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_aggregate() {
        use OperationalStatus::{Offline, Online};

        assert_eq!(OperationalStatus::aggregate([Online, Offline]), Online);
        assert_eq!(OperationalStatus::aggregate([Offline, Offline]), Offline);
        assert_eq!(OperationalStatus::aggregate([]), Offline);
    }

    #[test]
    fn test_session_record_defaults() {
        let record: SessionRecord = serde_json::from_str(r#"{"persisted_id":"p1"}"#).unwrap();
        assert_eq!(record.linked_local_id, None);
        assert!(!record.marked_gone);
    }
}
