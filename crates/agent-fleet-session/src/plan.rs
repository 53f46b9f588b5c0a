//! Pure sync planning.
//!
//! Records are matched to engine sessions through `linked_local_id`. Only
//! live records (not `marked_gone`) take part in matching; a record without
//! a linked id is not managed by the sync and is left alone.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use agent_fleet_core::{LocalSession, SessionRecord};
use serde::{Deserialize, Serialize};

/// Rename a record to the engine's title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRename {
    pub persisted_id: String,
    pub local_id: String,
    pub name: String,
}

/// Mark a record gone. Never a row delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeletion {
    pub persisted_id: String,
    pub local_id: String,
}

/// Create a record for an engine session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCreation {
    pub local_id: String,
    pub title: Option<String>,
}

/// Single planned store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncOperation {
    Rename(SessionRename),
    MarkGone(SessionDeletion),
    Create(SessionCreation),
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename(r) => write!(f, "rename {} to {:?}", r.persisted_id, r.name),
            Self::MarkGone(d) => write!(f, "mark {} gone (local {})", d.persisted_id, d.local_id),
            Self::Create(c) => write!(f, "create record for local {}", c.local_id),
        }
    }
}

/// Changes that make the stored records match the engine's sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub updates: Vec<SessionRename>,
    pub deletions: Vec<SessionDeletion>,
    pub creations: Vec<SessionCreation>,
}

impl SyncPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletions.is_empty() && self.creations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len() + self.deletions.len() + self.creations.len()
    }

    /// Flatten into individual operations.
    #[must_use]
    pub fn into_operations(self) -> Vec<SyncOperation> {
        let mut ops = Vec::with_capacity(self.len());
        ops.extend(self.updates.into_iter().map(SyncOperation::Rename));
        ops.extend(self.deletions.into_iter().map(SyncOperation::MarkGone));
        ops.extend(self.creations.into_iter().map(SyncOperation::Create));
        ops
    }
}

/// Diff engine sessions against stored records.
///
/// Duplicate engine ids are considered once. When several live records link
/// the same engine id, the first is its counterpart and the rest are marked
/// gone, so at most one live record references an engine session.
#[must_use]
pub fn calculate_sync_plan(local: &[LocalSession], persisted: &[SessionRecord]) -> SyncPlan {
    let local_ids: HashSet<&str> = local.iter().map(|s| s.id.as_str()).collect();
    let mut counterparts: HashMap<&str, &SessionRecord> = HashMap::new();
    let mut plan = SyncPlan::default();

    for record in persisted.iter().filter(|r| !r.marked_gone) {
        let Some(local_id) = record.linked_local_id.as_deref() else {
            continue;
        };
        if local_ids.contains(local_id) && !counterparts.contains_key(local_id) {
            counterparts.insert(local_id, record);
        } else {
            plan.deletions.push(SessionDeletion {
                persisted_id: record.persisted_id.clone(),
                local_id: local_id.to_string(),
            });
        }
    }

    let mut seen = HashSet::new();
    for session in local {
        if !seen.insert(session.id.as_str()) {
            continue;
        }
        match counterparts.get(session.id.as_str()) {
            Some(record) => {
                if let Some(title) = &session.title {
                    if record.name.as_deref() != Some(title.as_str()) {
                        plan.updates.push(SessionRename {
                            persisted_id: record.persisted_id.clone(),
                            local_id: session.id.clone(),
                            name: title.clone(),
                        });
                    }
                }
            }
            None => plan.creations.push(SessionCreation {
                local_id: session.id.clone(),
                title: session.title.clone(),
            }),
        }
    }

    plan
}

/// Simulate the effect of `plan` on `persisted`.
///
/// Created records get a synthetic `planned:<local id>` persisted id.
#[must_use]
pub fn apply_plan(plan: &SyncPlan, persisted: &[SessionRecord]) -> Vec<SessionRecord> {
    let mut records = persisted.to_vec();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        index.entry(record.persisted_id.clone()).or_insert(i);
    }

    for rename in &plan.updates {
        if let Some(&i) = index.get(&rename.persisted_id) {
            records[i].name = Some(rename.name.clone());
        }
    }
    for deletion in &plan.deletions {
        if let Some(&i) = index.get(&deletion.persisted_id) {
            records[i].marked_gone = true;
        }
    }
    records.extend(plan.creations.iter().map(|c| SessionRecord {
        persisted_id: format!("planned:{}", c.local_id),
        linked_local_id: Some(c.local_id.clone()),
        name: c.title.clone(),
        marked_gone: false,
    }));
    records
}

/// Whether applying `plan` leaves nothing further to do.
#[must_use]
pub fn is_convergent(local: &[LocalSession], persisted: &[SessionRecord], plan: &SyncPlan) -> bool {
    calculate_sync_plan(local, &apply_plan(plan, persisted)).is_empty()
}
