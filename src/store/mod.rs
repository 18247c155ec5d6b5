//! Persistence seams.
//!
//! One trait per concern; every method is tenant-scoped. The in-memory
//! store implements all of them for tests and demos; the Postgres store
//! (feature `database`) covers the workflow concern.
//!
//! Compare-and-set lives here: `apply_transition` and
//! `swap_wizard_status` must reject stale expectations atomically, so
//! races are decided by the store, not by callers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    Assessment, AssessmentRequirement, AuditEvent, FrameworkControl, OrganizationProfile, Plan,
    Report, TenantTemplate, TenantUser, TenantWorkflowConfig, Workspace,
};
use crate::onboarding::{OnboardingWizard, WizardStatus};
use crate::policy::PolicyDecision;
use crate::raci::{RaciAssignment, Team, TeamMember};
use crate::workflow::{TransitionRecord, WorkflowInstance, WorkflowKind, WorkflowTask};

mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgWorkflowStore;

/// Workflow instances and their tasks.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<()>;

    /// Insert unless an active instance of the same kind already covers
    /// the subject. `Ok(false)` means the slot was occupied and nothing
    /// was written. The vacancy check and the insert are one atomic
    /// step; this backs the one-active-instance rule for exclusive
    /// kinds.
    async fn insert_instance_if_vacant(&self, instance: &WorkflowInstance) -> Result<bool>;

    async fn get_instance(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
    ) -> Result<Option<WorkflowInstance>>;

    /// The active (non-terminal) instance of a kind over a subject, if any.
    async fn find_active_instance(
        &self,
        tenant_id: Uuid,
        kind: WorkflowKind,
        subject_type: &str,
        subject_id: Uuid,
    ) -> Result<Option<WorkflowInstance>>;

    /// Compare-and-set transition. Fails with
    /// [`EngineError::StateConflict`](crate::EngineError::StateConflict)
    /// when the stored state no longer equals `expected_state`.
    async fn apply_transition(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
        expected_state: &str,
        record: TransitionRecord,
    ) -> Result<WorkflowInstance>;

    async fn insert_task(&self, task: &WorkflowTask) -> Result<()>;

    async fn tasks_for_instance(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowTask>>;

    /// The task previously created for a requirement on an instance.
    /// Backs assignment idempotency.
    async fn find_task_for_requirement(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<WorkflowTask>>;
}

/// Wizard persistence, including the provisioning status fence.
#[async_trait]
pub trait OnboardingStore: Send + Sync {
    async fn get_wizard(&self, tenant_id: Uuid) -> Result<Option<OnboardingWizard>>;

    async fn save_wizard(&self, wizard: &OnboardingWizard) -> Result<()>;

    /// Compare-and-set on wizard status. `Ok(true)` when the swap took
    /// effect; `Ok(false)` when the stored status was not `expected`.
    async fn swap_wizard_status(
        &self,
        tenant_id: Uuid,
        expected: WizardStatus,
        next: WizardStatus,
    ) -> Result<bool>;
}

/// Users known to a tenant.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_user_by_email(&self, tenant_id: Uuid, email: &str)
        -> Result<Option<TenantUser>>;

    async fn upsert_user(&self, user: &TenantUser) -> Result<()>;

    async fn list_admins(&self, tenant_id: Uuid) -> Result<Vec<TenantUser>>;

    async fn mark_invited(&self, tenant_id: Uuid, user_id: Uuid) -> Result<()>;
}

/// Compliance artifacts materialized by provisioning.
#[async_trait]
pub trait ComplianceStore: Send + Sync {
    async fn get_profile(&self, tenant_id: Uuid) -> Result<Option<OrganizationProfile>>;
    async fn upsert_profile(&self, profile: &OrganizationProfile) -> Result<()>;

    async fn find_workspace_by_code(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Workspace>>;
    async fn insert_workspace(&self, workspace: &Workspace) -> Result<()>;

    async fn insert_team(&self, team: &Team) -> Result<()>;
    async fn find_team_by_code(&self, tenant_id: Uuid, code: &str) -> Result<Option<Team>>;
    async fn list_teams(&self, tenant_id: Uuid) -> Result<Vec<Team>>;

    async fn insert_team_member(&self, member: &TeamMember) -> Result<()>;
    async fn members_of_team(&self, tenant_id: Uuid, team_id: Uuid) -> Result<Vec<TeamMember>>;

    async fn insert_raci(&self, entry: &RaciAssignment) -> Result<()>;
    async fn list_raci(&self, tenant_id: Uuid) -> Result<Vec<RaciAssignment>>;

    async fn insert_template(&self, template: &TenantTemplate) -> Result<()>;
    async fn list_templates(&self, tenant_id: Uuid) -> Result<Vec<TenantTemplate>>;

    async fn insert_plan(&self, plan: &Plan) -> Result<()>;
    async fn list_plans(&self, tenant_id: Uuid) -> Result<Vec<Plan>>;

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<()>;
    async fn list_assessments(&self, tenant_id: Uuid) -> Result<Vec<Assessment>>;

    async fn insert_requirement(&self, requirement: &AssessmentRequirement) -> Result<()>;
    async fn requirements_for_assessment(
        &self,
        tenant_id: Uuid,
        assessment_id: Uuid,
    ) -> Result<Vec<AssessmentRequirement>>;

    /// Published framework catalog (not tenant-scoped).
    async fn controls_for_framework(&self, framework_code: &str)
        -> Result<Vec<FrameworkControl>>;

    async fn insert_report(&self, report: &Report) -> Result<()>;
    async fn list_reports(&self, tenant_id: Uuid) -> Result<Vec<Report>>;

    async fn insert_workflow_config(&self, config: &TenantWorkflowConfig) -> Result<()>;
    async fn list_workflow_configs(&self, tenant_id: Uuid) -> Result<Vec<TenantWorkflowConfig>>;
}

/// Policy decision cache. Decisions are write-once.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn find_decision(
        &self,
        tenant_id: Uuid,
        policy_type: &str,
        context_hash: &str,
    ) -> Result<Option<PolicyDecision>>;

    /// Insert unless a decision for the same key exists; returns the
    /// stored decision either way.
    async fn put_decision_if_absent(&self, decision: PolicyDecision) -> Result<PolicyDecision>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;

    async fn events_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<AuditEvent>>;
}

/// Everything the engine needs from persistence, in one bound.
pub trait EngineStore:
    WorkflowStore + OnboardingStore + TenantDirectory + ComplianceStore + DecisionStore + AuditSink
{
}

impl<T> EngineStore for T where
    T: WorkflowStore
        + OnboardingStore
        + TenantDirectory
        + ComplianceStore
        + DecisionStore
        + AuditSink
{
}
