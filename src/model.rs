//! Tenant-scoped compliance entities.
//!
//! These are the records the provisioning pipeline materializes and the
//! workflow/assignment engines operate over. All of them carry their
//! tenant id; stores must never return rows across tenants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known code of the workspace every tenant gets on provisioning.
pub const DEFAULT_WORKSPACE_CODE: &str = "DEFAULT";

/// Organization profile synced from the onboarding wizard answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub tenant_id: Uuid,
    pub legal_name: String,
    pub sector: String,
    pub country: String,
    pub operating_countries: Vec<String>,
    pub primary_regulator: String,
    /// Framework codes the tenant declared applicable, e.g. "NCA-ECC".
    pub frameworks: Vec<String>,
    pub handles_pii: bool,
    pub sensitive_data: bool,
    pub cross_border_transfers: bool,
    pub updated_at: DateTime<Utc>,
}

/// A workspace groups all compliance artifacts of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Tenant copy of a framework assessment template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// e.g. "BASE_NCA-ECC_20260823".
    pub code: String,
    pub name: String,
    pub framework_code: String,
    pub created_at: DateTime<Utc>,
}

/// Compliance plan produced during provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// e.g. "PLAN-20260823-001".
    pub code: String,
    pub name: String,
    /// Ruleset that derived the plan's scope.
    pub ruleset_id: String,
    pub target_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Assessment priority, as decided by the policy evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Normal,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Normal => "normal",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scheduled assessment against one framework template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub template_code: String,
    pub framework_code: String,
    pub name: String,
    pub priority: Priority,
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One control requirement within an assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRequirement {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub assessment_id: Uuid,
    pub control_code: String,
    pub title: String,
    /// Control family, e.g. "IAM", "NETWORK". Drives RACI scope matching.
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry: one control of a published framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkControl {
    pub framework_code: String,
    pub control_code: String,
    pub title: String,
    pub domain: String,
}

/// Default report shell created at go-live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub serial: String,
    pub title: String,
    pub report_type: String,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant activation of a platform workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantWorkflowConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// e.g. "WF-EVIDENCE-APPROVAL".
    pub workflow_code: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// A user known to the tenant directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantUser {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub is_admin: bool,
    pub invited_at: Option<DateTime<Utc>>,
}

/// Kinds of audit events the engine records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    OnboardingCompleted,
    ScopeGenerated,
    PlanCreated,
    WorkflowStarted,
    WorkflowTransitioned,
    TaskAssigned,
    AssignmentGap,
    PolicyDecisionRecorded,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnboardingCompleted => "onboarding_completed",
            Self::ScopeGenerated => "scope_generated",
            Self::PlanCreated => "plan_created",
            Self::WorkflowStarted => "workflow_started",
            Self::WorkflowTransitioned => "workflow_transitioned",
            Self::TaskAssigned => "task_assigned",
            Self::AssignmentGap => "assignment_gap",
            Self::PolicyDecisionRecorded => "policy_decision_recorded",
        }
    }
}

/// One audit trail entry. Events sharing a `correlation_id` belong to
/// the same logical operation (e.g. one provisioning run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub correlation_id: Uuid,
    pub event_type: AuditEventType,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        tenant_id: Uuid,
        correlation_id: Uuid,
        event_type: AuditEventType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            correlation_id,
            event_type,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Outcome summary of one provisioning run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub tenant_id: Option<Uuid>,
    pub success: bool,
    /// True when a previous run already provisioned the tenant and this
    /// run changed nothing.
    pub already_provisioned: bool,
    pub workspace_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub template_ids: Vec<Uuid>,
    pub teams_created: usize,
    pub raci_assignments: usize,
    pub users_assigned: usize,
    pub assessments_created: usize,
    pub requirements_created: usize,
    pub reports_created: usize,
    pub workflows_activated: usize,
    /// Non-fatal step failures (background phase is fault-isolated).
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: String,
}
