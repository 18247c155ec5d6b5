//! RACI matrix types and the task assignment engine.
//!
//! Assignment follows the tenant's RACI matrix: for each requirement the
//! engine finds the Responsible entry whose scope best matches the
//! requirement's control domain, resolves the primary team member for
//! that role, and opens a review task. A requirement that resolves to no
//! primary member is an assignment gap: logged and audited, never an
//! error, never a task.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{AssessmentRequirement, AuditEvent, AuditEventType};
use crate::store::EngineStore;
use crate::workflow::{TaskStatus, WorkflowInstance, WorkflowTask};

/// Days before a control review task is due.
pub const CONTROL_REVIEW_DUE_DAYS: i64 = 14;
/// Days before an evidence review task is due.
pub const EVIDENCE_REVIEW_DUE_DAYS: i64 = 3;

/// RACI letter of an assignment matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaciRole {
    Responsible,
    Accountable,
    Consulted,
    Informed,
}

impl RaciRole {
    pub fn letter(&self) -> char {
        match self {
            Self::Responsible => 'R',
            Self::Accountable => 'A',
            Self::Consulted => 'C',
            Self::Informed => 'I',
        }
    }

    /// Ordering weight used when several entries tie on scope. R wins
    /// over A; C and I never receive work directly.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Responsible => 1,
            Self::Accountable => 2,
            _ => 5,
        }
    }
}

impl std::str::FromStr for RaciRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "R" | "r" | "responsible" => Ok(Self::Responsible),
            "A" | "a" | "accountable" => Ok(Self::Accountable),
            "C" | "c" | "consulted" => Ok(Self::Consulted),
            "I" | "i" | "informed" => Ok(Self::Informed),
            _ => Err(format!("Unknown RACI letter: {}", s)),
        }
    }
}

/// A team within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub team_type: String,
    /// Exactly one team per tenant should carry this flag; it absorbs
    /// work no scoped entry claims.
    pub is_default_fallback: bool,
    pub created_at: DateTime<Utc>,
}

/// Membership of a user in a team, for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub role_code: String,
    /// The member who receives auto-assigned work for this role.
    pub is_primary_for_role: bool,
    pub can_approve: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry of the tenant's RACI matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaciAssignment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub team_id: Uuid,
    /// Scope dimension, e.g. "control_domain".
    pub scope_type: String,
    /// Scope value, e.g. "IAM", or "DEFAULT" for the wildcard entry.
    pub scope_id: String,
    pub role_code: String,
    pub raci: RaciRole,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
}

/// Which review a task represents; fixes its due window and urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    ControlReview,
    EvidenceReview,
}

impl ReviewKind {
    pub fn due_days(&self) -> i64 {
        match self {
            Self::ControlReview => CONTROL_REVIEW_DUE_DAYS,
            Self::EvidenceReview => EVIDENCE_REVIEW_DUE_DAYS,
        }
    }

    pub fn task_priority(&self) -> u8 {
        match self {
            Self::ControlReview => 2,
            Self::EvidenceReview => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ControlReview => "Control review",
            Self::EvidenceReview => "Evidence review",
        }
    }
}

/// Resolves RACI entries into concrete workflow tasks.
pub struct AssignmentEngine {
    store: Arc<dyn EngineStore>,
}

impl AssignmentEngine {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Create (or return the existing) review task for a requirement.
    ///
    /// Idempotent per (instance, requirement): a second call returns the
    /// task created by the first. Returns `None` on an assignment gap.
    pub async fn auto_assign(
        &self,
        instance: &WorkflowInstance,
        requirement: &AssessmentRequirement,
        review: ReviewKind,
    ) -> Result<Option<WorkflowTask>> {
        let tenant_id = instance.tenant_id;

        if let Some(existing) = self
            .store
            .find_task_for_requirement(tenant_id, instance.id, requirement.id)
            .await?
        {
            debug!(
                %tenant_id,
                requirement = %requirement.control_code,
                task_id = %existing.id,
                "requirement already has a task"
            );
            return Ok(Some(existing));
        }

        let matrix = self.store.list_raci(tenant_id).await?;
        let candidates = rank_responsible_entries(&matrix, &requirement.domain);

        for entry in &candidates {
            if let Some(member) = self.primary_member(tenant_id, entry).await? {
                let task = self
                    .open_task(instance, requirement, entry, &member, review)
                    .await?;
                return Ok(Some(task));
            }
        }

        warn!(
            %tenant_id,
            requirement = %requirement.control_code,
            domain = %requirement.domain,
            "assignment gap: no responsible entry resolves to a primary member"
        );
        self.store
            .record(AuditEvent::new(
                tenant_id,
                instance.id,
                AuditEventType::AssignmentGap,
                serde_json::json!({
                    "requirement_id": requirement.id,
                    "control_code": requirement.control_code,
                    "domain": requirement.domain,
                }),
            ))
            .await?;
        Ok(None)
    }

    async fn primary_member(
        &self,
        tenant_id: Uuid,
        entry: &RaciAssignment,
    ) -> Result<Option<TeamMember>> {
        let members = self.store.members_of_team(tenant_id, entry.team_id).await?;
        Ok(members
            .into_iter()
            .find(|m| m.role_code == entry.role_code && m.is_primary_for_role))
    }

    async fn open_task(
        &self,
        instance: &WorkflowInstance,
        requirement: &AssessmentRequirement,
        entry: &RaciAssignment,
        member: &TeamMember,
        review: ReviewKind,
    ) -> Result<WorkflowTask> {
        let team = self
            .store
            .list_teams(instance.tenant_id)
            .await?
            .into_iter()
            .find(|t| t.id == entry.team_id);

        let mut metadata = HashMap::new();
        metadata.insert("role_code".to_string(), entry.role_code.clone());
        metadata.insert("requirement_id".to_string(), requirement.id.to_string());
        metadata.insert("control_code".to_string(), requirement.control_code.clone());
        metadata.insert("raci".to_string(), entry.raci.letter().to_string());

        let task = WorkflowTask {
            id: Uuid::new_v4(),
            tenant_id: instance.tenant_id,
            instance_id: instance.id,
            name: format!("{}: {}", review.label(), requirement.title),
            description: format!(
                "{} for control {} ({})",
                review.label(),
                requirement.control_code,
                requirement.domain
            ),
            status: TaskStatus::Pending,
            priority: review.task_priority(),
            assignee: Some(member.user_id),
            assigned_team: team.map(|t| t.code),
            due_date: Some(Utc::now() + Duration::days(review.due_days())),
            metadata,
            created_at: Utc::now(),
        };
        self.store.insert_task(&task).await?;

        self.store
            .record(AuditEvent::new(
                instance.tenant_id,
                instance.id,
                AuditEventType::TaskAssigned,
                serde_json::json!({
                    "task_id": task.id,
                    "requirement_id": requirement.id,
                    "assignee": member.user_id,
                    "role_code": entry.role_code,
                }),
            ))
            .await?;

        debug!(
            tenant_id = %instance.tenant_id,
            task_id = %task.id,
            assignee = %member.email,
            "task assigned"
        );
        Ok(task)
    }
}

/// Rank Responsible entries against a control domain.
///
/// Exact scope match beats containment, containment beats the DEFAULT
/// wildcard; ties break by RACI priority (ascending), then creation time
/// (newest first).
fn rank_responsible_entries<'a>(
    matrix: &'a [RaciAssignment],
    domain: &str,
) -> Vec<&'a RaciAssignment> {
    let mut scored: Vec<(u8, &RaciAssignment)> = matrix
        .iter()
        .filter(|e| e.raci == RaciRole::Responsible)
        .map(|e| (scope_score(&e.scope_id, domain), e))
        .collect();

    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(a.1.priority.cmp(&b.1.priority))
            .then(b.1.created_at.cmp(&a.1.created_at))
    });
    scored.into_iter().map(|(_, e)| e).collect()
}

fn scope_score(scope_id: &str, domain: &str) -> u8 {
    if scope_id.eq_ignore_ascii_case(domain) {
        3
    } else if !scope_id.is_empty()
        && !scope_id.eq_ignore_ascii_case("DEFAULT")
        && domain.to_uppercase().contains(&scope_id.to_uppercase())
    {
        2
    } else if scope_id.eq_ignore_ascii_case("DEFAULT") {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(scope: &str, raci: RaciRole, priority: u8, age_secs: i64) -> RaciAssignment {
        RaciAssignment {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            scope_type: "control_domain".to_string(),
            scope_id: scope.to_string(),
            role_code: "CONTROL_OWNER".to_string(),
            raci,
            priority,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_exact_scope_beats_wildcard() {
        let matrix = vec![
            entry("DEFAULT", RaciRole::Responsible, 1, 0),
            entry("IAM", RaciRole::Responsible, 1, 100),
        ];
        let ranked = rank_responsible_entries(&matrix, "IAM");
        assert_eq!(ranked[0].scope_id, "IAM");
    }

    #[test]
    fn test_accountable_entries_are_excluded() {
        let matrix = vec![
            entry("IAM", RaciRole::Accountable, 2, 0),
            entry("DEFAULT", RaciRole::Responsible, 1, 0),
        ];
        let ranked = rank_responsible_entries(&matrix, "IAM");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].scope_id, "DEFAULT");
    }

    #[test]
    fn test_newer_entry_wins_a_tie() {
        let older = entry("IAM", RaciRole::Responsible, 1, 3600);
        let newer = entry("IAM", RaciRole::Responsible, 1, 0);
        let newer_id = newer.id;
        let matrix = vec![older, newer];
        let ranked = rank_responsible_entries(&matrix, "IAM");
        assert_eq!(ranked[0].id, newer_id);
    }

    #[test]
    fn test_containment_scores_between_exact_and_wildcard() {
        assert_eq!(scope_score("IAM", "IAM"), 3);
        assert_eq!(scope_score("IAM", "IAM-PRIVILEGED"), 2);
        assert_eq!(scope_score("DEFAULT", "IAM"), 1);
        assert_eq!(scope_score("NETWORK", "IAM"), 0);
    }

    #[test]
    fn test_review_kind_windows() {
        assert_eq!(ReviewKind::ControlReview.due_days(), 14);
        assert_eq!(ReviewKind::EvidenceReview.due_days(), 3);
        assert!(ReviewKind::EvidenceReview.task_priority() < ReviewKind::ControlReview.task_priority());
    }

    #[test]
    fn test_raci_parsing() {
        assert_eq!("R".parse::<RaciRole>().unwrap(), RaciRole::Responsible);
        assert_eq!("accountable".parse::<RaciRole>().unwrap(), RaciRole::Accountable);
        assert!("X".parse::<RaciRole>().is_err());
    }
}
