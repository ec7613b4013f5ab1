use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// Default number of attempts before a queued action is dropped.
pub const DEFAULT_ATTEMPT_LIMIT: u32 = 3;

/// The kind of mutation an action performs against its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "CREATE",
            ActionKind::Update => "UPDATE",
            ActionKind::Delete => "DELETE",
        }
    }

    /// Whether this kind addresses an existing entity by id.
    pub fn requires_entity_id(&self) -> bool {
        matches!(self, ActionKind::Update | ActionKind::Delete)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            _ => Err(format!(
                "Invalid action kind '{}'. Valid options: create, update, delete",
                s
            )),
        }
    }
}

/// Scheduling priority of a queued action.
///
/// Ordering follows urgency: `High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Numeric rank stored in the action log; larger drains first.
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            0 => Some(Priority::Low),
            1 => Some(Priority::Medium),
            2 => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!(
                "Invalid priority '{}'. Valid options: high, medium, low",
                s
            )),
        }
    }
}

/// A mutation requested by a caller, before it is written to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub kind: ActionKind,
    pub entity_type: String,
    /// Target entity; required for UPDATE and DELETE.
    pub entity_id: Option<String>,
    pub payload: serde_json::Value,
    pub priority: Priority,
}

impl NewAction {
    pub fn create(entity_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: ActionKind::Create,
            entity_type: entity_type.into(),
            entity_id: None,
            payload,
            priority: Priority::default(),
        }
    }

    pub fn update(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: ActionKind::Update,
            entity_type: entity_type.into(),
            entity_id: Some(entity_id.into()),
            payload,
            priority: Priority::default(),
        }
    }

    pub fn delete(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Delete,
            entity_type: entity_type.into(),
            entity_id: Some(entity_id.into()),
            payload: serde_json::Value::Null,
            priority: Priority::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Checks the preconditions for queuing this mutation.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.entity_type.trim().is_empty() {
            return Err(SyncError::EmptyEntityType);
        }
        let has_id = self
            .entity_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if self.kind.requires_entity_id() && !has_id {
            return Err(SyncError::MissingEntityId {
                kind: self.kind,
                entity_type: self.entity_type.clone(),
            });
        }
        Ok(())
    }
}

/// A mutation persisted in the action log, waiting to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub kind: ActionKind,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// Failed attempts so far.
    pub attempt: u32,
    pub attempt_limit: u32,
    pub priority: Priority,
}

impl PendingAction {
    pub fn is_retriable(&self) -> bool {
        self.attempt < self.attempt_limit
    }

    /// Short label used in logs and error lines, e.g. `leads UPDATE`.
    pub fn label(&self) -> String {
        format!("{} {}", self.entity_type, self.kind)
    }
}

/// Generates an action id: millisecond timestamp plus a random suffix.
///
/// Ids sort roughly by creation time and are unique across processes.
pub fn generate_action_id(now: DateTime<Utc>) -> String {
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), 10);
    format!("{:013}-{}", now.timestamp_millis(), suffix.to_lowercase())
}
