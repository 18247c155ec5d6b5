//! In-memory store.
//!
//! Backs tests and demos. A single `RwLock` over the whole dataset keeps
//! the compare-and-set operations trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{
    Assessment, AssessmentRequirement, AuditEvent, FrameworkControl, OrganizationProfile, Plan,
    Report, TenantTemplate, TenantUser, TenantWorkflowConfig, Workspace,
};
use crate::onboarding::{OnboardingWizard, WizardStatus};
use crate::policy::PolicyDecision;
use crate::raci::{RaciAssignment, Team, TeamMember};
use crate::workflow::{TransitionRecord, WorkflowInstance, WorkflowKind, WorkflowTask};

use super::{
    AuditSink, ComplianceStore, DecisionStore, OnboardingStore, TenantDirectory, WorkflowStore,
};

#[derive(Default)]
struct Inner {
    instances: HashMap<Uuid, WorkflowInstance>,
    tasks: Vec<WorkflowTask>,
    wizards: HashMap<Uuid, OnboardingWizard>,
    users: Vec<TenantUser>,
    profiles: HashMap<Uuid, OrganizationProfile>,
    workspaces: Vec<Workspace>,
    teams: Vec<Team>,
    members: Vec<TeamMember>,
    raci: Vec<RaciAssignment>,
    templates: Vec<TenantTemplate>,
    plans: Vec<Plan>,
    assessments: Vec<Assessment>,
    requirements: Vec<AssessmentRequirement>,
    controls: Vec<FrameworkControl>,
    reports: Vec<Report>,
    workflow_configs: Vec<TenantWorkflowConfig>,
    decisions: Vec<PolicyDecision>,
    audit: Vec<AuditEvent>,
}

/// All store traits over shared in-process state.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed framework catalog controls (tests and demos).
    pub async fn seed_controls(&self, controls: Vec<FrameworkControl>) {
        self.inner.write().await.controls.extend(controls);
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<()> {
        self.inner
            .write()
            .await
            .instances
            .insert(instance.id, instance.clone());
        Ok(())
    }

    async fn insert_instance_if_vacant(&self, instance: &WorkflowInstance) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let occupied = inner.instances.values().any(|i| {
            i.tenant_id == instance.tenant_id
                && i.kind == instance.kind
                && i.subject_type == instance.subject_type
                && i.subject_id == instance.subject_id
                && i.is_active()
        });
        if occupied {
            return Ok(false);
        }
        inner.instances.insert(instance.id, instance.clone());
        Ok(true)
    }

    async fn get_instance(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
    ) -> Result<Option<WorkflowInstance>> {
        Ok(self
            .inner
            .read()
            .await
            .instances
            .get(&instance_id)
            .filter(|i| i.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_active_instance(
        &self,
        tenant_id: Uuid,
        kind: WorkflowKind,
        subject_type: &str,
        subject_id: Uuid,
    ) -> Result<Option<WorkflowInstance>> {
        Ok(self
            .inner
            .read()
            .await
            .instances
            .values()
            .find(|i| {
                i.tenant_id == tenant_id
                    && i.kind == kind
                    && i.subject_type == subject_type
                    && i.subject_id == subject_id
                    && i.is_active()
            })
            .cloned())
    }

    async fn apply_transition(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
        expected_state: &str,
        record: TransitionRecord,
    ) -> Result<WorkflowInstance> {
        let mut inner = self.inner.write().await;
        let instance = inner
            .instances
            .get_mut(&instance_id)
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or(EngineError::NotFound {
                entity: "workflow instance",
                id: instance_id.to_string(),
            })?;

        if instance.current_state != expected_state {
            return Err(EngineError::StateConflict {
                expected: expected_state.to_string(),
                actual: instance.current_state.clone(),
            });
        }

        instance.current_state = record.to_state.clone();
        instance.updated_at = record.occurred_at;
        instance.history.push(record);
        Ok(instance.clone())
    }

    async fn insert_task(&self, task: &WorkflowTask) -> Result<()> {
        self.inner.write().await.tasks.push(task.clone());
        Ok(())
    }

    async fn tasks_for_instance(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowTask>> {
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn find_task_for_requirement(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<WorkflowTask>> {
        let key = requirement_id.to_string();
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .iter()
            .find(|t| {
                t.tenant_id == tenant_id
                    && t.instance_id == instance_id
                    && t.metadata.get("requirement_id") == Some(&key)
            })
            .cloned())
    }
}

#[async_trait]
impl OnboardingStore for MemoryStore {
    async fn get_wizard(&self, tenant_id: Uuid) -> Result<Option<OnboardingWizard>> {
        Ok(self.inner.read().await.wizards.get(&tenant_id).cloned())
    }

    async fn save_wizard(&self, wizard: &OnboardingWizard) -> Result<()> {
        self.inner
            .write()
            .await
            .wizards
            .insert(wizard.tenant_id, wizard.clone());
        Ok(())
    }

    async fn swap_wizard_status(
        &self,
        tenant_id: Uuid,
        expected: WizardStatus,
        next: WizardStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let wizard = inner
            .wizards
            .get_mut(&tenant_id)
            .ok_or(EngineError::NotFound {
                entity: "onboarding wizard",
                id: tenant_id.to_string(),
            })?;
        if wizard.status != expected {
            return Ok(false);
        }
        wizard.status = next;
        Ok(true)
    }
}

#[async_trait]
impl TenantDirectory for MemoryStore {
    async fn find_user_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<TenantUser>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .iter()
            .find(|u| u.tenant_id == tenant_id && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn upsert_user(&self, user: &TenantUser) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.users.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
        } else {
            inner.users.push(user.clone());
        }
        Ok(())
    }

    async fn list_admins(&self, tenant_id: Uuid) -> Result<Vec<TenantUser>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .iter()
            .filter(|u| u.tenant_id == tenant_id && u.is_admin)
            .cloned()
            .collect())
    }

    async fn mark_invited(&self, tenant_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner
            .users
            .iter_mut()
            .find(|u| u.tenant_id == tenant_id && u.id == user_id)
        {
            user.invited_at = Some(chrono::Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl ComplianceStore for MemoryStore {
    async fn get_profile(&self, tenant_id: Uuid) -> Result<Option<OrganizationProfile>> {
        Ok(self.inner.read().await.profiles.get(&tenant_id).cloned())
    }

    async fn upsert_profile(&self, profile: &OrganizationProfile) -> Result<()> {
        self.inner
            .write()
            .await
            .profiles
            .insert(profile.tenant_id, profile.clone());
        Ok(())
    }

    async fn find_workspace_by_code(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Workspace>> {
        Ok(self
            .inner
            .read()
            .await
            .workspaces
            .iter()
            .find(|w| w.tenant_id == tenant_id && w.code == code)
            .cloned())
    }

    async fn insert_workspace(&self, workspace: &Workspace) -> Result<()> {
        self.inner.write().await.workspaces.push(workspace.clone());
        Ok(())
    }

    async fn insert_team(&self, team: &Team) -> Result<()> {
        self.inner.write().await.teams.push(team.clone());
        Ok(())
    }

    async fn find_team_by_code(&self, tenant_id: Uuid, code: &str) -> Result<Option<Team>> {
        Ok(self
            .inner
            .read()
            .await
            .teams
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.code == code)
            .cloned())
    }

    async fn list_teams(&self, tenant_id: Uuid) -> Result<Vec<Team>> {
        Ok(self
            .inner
            .read()
            .await
            .teams
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_team_member(&self, member: &TeamMember) -> Result<()> {
        self.inner.write().await.members.push(member.clone());
        Ok(())
    }

    async fn members_of_team(&self, tenant_id: Uuid, team_id: Uuid) -> Result<Vec<TeamMember>> {
        Ok(self
            .inner
            .read()
            .await
            .members
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn insert_raci(&self, entry: &RaciAssignment) -> Result<()> {
        self.inner.write().await.raci.push(entry.clone());
        Ok(())
    }

    async fn list_raci(&self, tenant_id: Uuid) -> Result<Vec<RaciAssignment>> {
        Ok(self
            .inner
            .read()
            .await
            .raci
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_template(&self, template: &TenantTemplate) -> Result<()> {
        self.inner.write().await.templates.push(template.clone());
        Ok(())
    }

    async fn list_templates(&self, tenant_id: Uuid) -> Result<Vec<TenantTemplate>> {
        Ok(self
            .inner
            .read()
            .await
            .templates
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_plan(&self, plan: &Plan) -> Result<()> {
        self.inner.write().await.plans.push(plan.clone());
        Ok(())
    }

    async fn list_plans(&self, tenant_id: Uuid) -> Result<Vec<Plan>> {
        Ok(self
            .inner
            .read()
            .await
            .plans
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<()> {
        self.inner.write().await.assessments.push(assessment.clone());
        Ok(())
    }

    async fn list_assessments(&self, tenant_id: Uuid) -> Result<Vec<Assessment>> {
        Ok(self
            .inner
            .read()
            .await
            .assessments
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_requirement(&self, requirement: &AssessmentRequirement) -> Result<()> {
        self.inner.write().await.requirements.push(requirement.clone());
        Ok(())
    }

    async fn requirements_for_assessment(
        &self,
        tenant_id: Uuid,
        assessment_id: Uuid,
    ) -> Result<Vec<AssessmentRequirement>> {
        Ok(self
            .inner
            .read()
            .await
            .requirements
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.assessment_id == assessment_id)
            .cloned()
            .collect())
    }

    async fn controls_for_framework(
        &self,
        framework_code: &str,
    ) -> Result<Vec<FrameworkControl>> {
        Ok(self
            .inner
            .read()
            .await
            .controls
            .iter()
            .filter(|c| c.framework_code == framework_code)
            .cloned()
            .collect())
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        self.inner.write().await.reports.push(report.clone());
        Ok(())
    }

    async fn list_reports(&self, tenant_id: Uuid) -> Result<Vec<Report>> {
        Ok(self
            .inner
            .read()
            .await
            .reports
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_workflow_config(&self, config: &TenantWorkflowConfig) -> Result<()> {
        self.inner.write().await.workflow_configs.push(config.clone());
        Ok(())
    }

    async fn list_workflow_configs(&self, tenant_id: Uuid) -> Result<Vec<TenantWorkflowConfig>> {
        Ok(self
            .inner
            .read()
            .await
            .workflow_configs
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn find_decision(
        &self,
        tenant_id: Uuid,
        policy_type: &str,
        context_hash: &str,
    ) -> Result<Option<PolicyDecision>> {
        Ok(self
            .inner
            .read()
            .await
            .decisions
            .iter()
            .find(|d| {
                d.tenant_id == tenant_id
                    && d.policy_type == policy_type
                    && d.context_hash == context_hash
            })
            .cloned())
    }

    async fn put_decision_if_absent(&self, decision: PolicyDecision) -> Result<PolicyDecision> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.decisions.iter().find(|d| {
            d.tenant_id == decision.tenant_id
                && d.policy_type == decision.policy_type
                && d.context_hash == decision.context_hash
        }) {
            return Ok(existing.clone());
        }
        inner.decisions.push(decision.clone());
        Ok(decision)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.inner.write().await.audit.push(event);
        Ok(())
    }

    async fn events_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<AuditEvent>> {
        Ok(self
            .inner
            .read()
            .await
            .audit
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::OnboardingWizard;

    #[tokio::test]
    async fn test_apply_transition_rejects_stale_state() {
        let store = MemoryStore::new();
        let instance = WorkflowInstance::new(
            Uuid::new_v4(),
            WorkflowKind::Approval,
            "document",
            Uuid::new_v4(),
            "alice",
        );
        store.insert_instance(&instance).await.unwrap();

        let record = TransitionRecord {
            from_state: "Submitted".to_string(),
            to_state: "ManagerApproved".to_string(),
            action: "manager_approve".to_string(),
            actor: "bob".to_string(),
            occurred_at: chrono::Utc::now(),
            note: None,
        };
        store
            .apply_transition(instance.tenant_id, instance.id, "Submitted", record.clone())
            .await
            .unwrap();

        // Second write against the old state is rejected.
        let err = store
            .apply_transition(instance.tenant_id, instance.id, "Submitted", record)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_insert_if_vacant_frees_slot_on_terminal() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let subject = Uuid::new_v4();

        let first =
            WorkflowInstance::new(tenant, WorkflowKind::Approval, "document", subject, "alice");
        assert!(store.insert_instance_if_vacant(&first).await.unwrap());

        let second =
            WorkflowInstance::new(tenant, WorkflowKind::Approval, "document", subject, "bob");
        assert!(!store.insert_instance_if_vacant(&second).await.unwrap());

        // A terminal transition vacates the subject.
        store
            .apply_transition(
                tenant,
                first.id,
                "Submitted",
                TransitionRecord {
                    from_state: "Submitted".to_string(),
                    to_state: "Rejected".to_string(),
                    action: "reject".to_string(),
                    actor: "alice".to_string(),
                    occurred_at: chrono::Utc::now(),
                    note: None,
                },
            )
            .await
            .unwrap();
        assert!(store.insert_instance_if_vacant(&second).await.unwrap());
    }

    #[tokio::test]
    async fn test_wizard_status_swap_is_atomic() {
        let store = MemoryStore::new();
        let mut wizard = OnboardingWizard::new(Uuid::new_v4());
        wizard.status = WizardStatus::InProgress;
        store.save_wizard(&wizard).await.unwrap();

        let first = store
            .swap_wizard_status(
                wizard.tenant_id,
                WizardStatus::InProgress,
                WizardStatus::Processing,
            )
            .await
            .unwrap();
        let second = store
            .swap_wizard_status(
                wizard.tenant_id,
                WizardStatus::InProgress,
                WizardStatus::Processing,
            )
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn test_instances_are_tenant_scoped() {
        let store = MemoryStore::new();
        let instance = WorkflowInstance::new(
            Uuid::new_v4(),
            WorkflowKind::Audit,
            "audit",
            Uuid::new_v4(),
            "system",
        );
        store.insert_instance(&instance).await.unwrap();

        let other_tenant = Uuid::new_v4();
        assert!(store
            .get_instance(other_tenant, instance.id)
            .await
            .unwrap()
            .is_none());
    }
}
