//! Workflow instance and task types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{StateGraph, WorkflowKind};

/// A running (or finished) workflow over one subject entity.
///
/// `current_state` is always a state declared by the kind's graph. The
/// full transition history travels with the instance; the audit trail
/// additionally records each transition as a standalone event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: WorkflowKind,
    /// Entity type the workflow governs, e.g. "assessment", "evidence".
    pub subject_type: String,
    pub subject_id: Uuid,
    pub current_state: String,
    pub initiated_by: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form variables carried by the instance.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl WorkflowInstance {
    /// Create a new instance at the kind's initial state.
    pub fn new(
        tenant_id: Uuid,
        kind: WorkflowKind,
        subject_type: impl Into<String>,
        subject_id: Uuid,
        initiated_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            kind,
            subject_type: subject_type.into(),
            subject_id,
            current_state: StateGraph::for_kind(kind).initial.to_string(),
            initiated_by: initiated_by.into(),
            started_at: now,
            updated_at: now,
            variables: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        StateGraph::for_kind(self.kind).is_terminal(&self.current_state)
    }

    /// Active means the instance can still move.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// One recorded transition in an instance's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from_state: String,
    pub to_state: String,
    pub action: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Status of a workflow task. Tasks are closed, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of human work attached to a workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub instance_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    /// Lower is more urgent.
    pub priority: u8,
    /// Resolved assignee (tenant user id), if assignment succeeded.
    pub assignee: Option<Uuid>,
    pub assigned_team: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Assignment provenance: role code, requirement id, and similar.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_instance_starts_at_initial_state() {
        let instance = WorkflowInstance::new(
            Uuid::new_v4(),
            WorkflowKind::Approval,
            "document",
            Uuid::new_v4(),
            "alice@example.com",
        );
        assert_eq!(instance.current_state, "Submitted");
        assert!(instance.is_active());
        assert!(instance.history.is_empty());
    }

    #[test]
    fn test_terminal_detection_follows_graph() {
        let mut instance = WorkflowInstance::new(
            Uuid::new_v4(),
            WorkflowKind::ExceptionHandling,
            "exception",
            Uuid::new_v4(),
            "system",
        );
        assert!(!instance.is_terminal());
        instance.current_state = "Approved".to_string();
        assert!(instance.is_terminal());
    }

    #[test]
    fn test_task_status_openness() {
        assert!(TaskStatus::Pending.is_open());
        assert!(TaskStatus::InProgress.is_open());
        assert!(!TaskStatus::Done.is_open());
        assert!(!TaskStatus::Cancelled.is_open());
    }
}
