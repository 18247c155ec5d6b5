//! Phase 1 of provisioning: the synchronous critical path.
//!
//! Completion is triggered exactly once per tenant. The wizard status is
//! the fence: a compare-and-set to `Processing` decides the winner among
//! concurrent submissions; losers observe the swap failure and return a
//! no-op outcome. A Phase 1 failure parks the wizard in `Error`, from
//! which completion may be retried.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::{NotificationSender, RulesEngine, SerialNumberGenerator};
use crate::error::{EngineError, Result};
use crate::model::{ProvisioningResult, Workspace, DEFAULT_WORKSPACE_CODE};
use crate::onboarding::{OnboardingWizard, TeamsRolesAccess, WizardStatus};
use crate::raci::{RaciAssignment, Team, TeamMember};
use crate::store::EngineStore;
use crate::workflow::roles;

use super::background::{run_background_provisioning, BackgroundContext};
use super::defaults;

/// What `complete_onboarding` hands back: the Phase 1 result and, when
/// this call won the fence, the handle of the spawned background phase.
/// Callers normally drop the handle; tests await it.
#[derive(Debug)]
pub struct CompletionOutcome {
    pub result: ProvisioningResult,
    pub background: Option<JoinHandle<ProvisioningResult>>,
}

struct Phase1Summary {
    workspace_id: Uuid,
    teams_created: usize,
    raci_assignments: usize,
    users_assigned: usize,
    warnings: Vec<String>,
}

pub struct ProvisioningOrchestrator {
    store: Arc<dyn EngineStore>,
    rules: Arc<dyn RulesEngine>,
    notifier: Arc<dyn NotificationSender>,
    serials: Arc<dyn SerialNumberGenerator>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        store: Arc<dyn EngineStore>,
        rules: Arc<dyn RulesEngine>,
        notifier: Arc<dyn NotificationSender>,
        serials: Arc<dyn SerialNumberGenerator>,
    ) -> Self {
        Self {
            store,
            rules,
            notifier,
            serials,
        }
    }

    /// Finalize onboarding for a tenant.
    ///
    /// Idempotent: a completed tenant gets a cached no-op; a tenant
    /// already being processed gets an in-flight no-op; only the caller
    /// that wins the status fence provisions.
    pub async fn complete_onboarding(&self, tenant_id: Uuid) -> Result<CompletionOutcome> {
        let wizard = self
            .store
            .get_wizard(tenant_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "onboarding wizard",
                id: tenant_id.to_string(),
            })?;

        let missing = wizard.missing_required_sections();
        if !missing.is_empty() {
            let letters: Vec<String> = missing.iter().map(|s| s.letter().to_string()).collect();
            return Err(EngineError::Configuration(format!(
                "required wizard sections incomplete: {}",
                letters.join(", ")
            )));
        }

        match wizard.status {
            WizardStatus::Completed => {
                info!(%tenant_id, "onboarding already completed; returning cached outcome");
                return Ok(CompletionOutcome {
                    result: noop_result(tenant_id, "tenant already provisioned"),
                    background: None,
                });
            }
            WizardStatus::Processing => {
                info!(%tenant_id, "onboarding completion already in flight");
                return Ok(CompletionOutcome {
                    result: noop_result(tenant_id, "provisioning in progress"),
                    background: None,
                });
            }
            WizardStatus::NotStarted | WizardStatus::InProgress | WizardStatus::Error => {}
        }

        let won = self
            .store
            .swap_wizard_status(tenant_id, wizard.status, WizardStatus::Processing)
            .await?;
        if !won {
            info!(%tenant_id, "lost completion race; another submission is provisioning");
            return Ok(CompletionOutcome {
                result: noop_result(tenant_id, "provisioning in progress"),
                background: None,
            });
        }

        let summary = match self.run_phase1(&wizard).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(%tenant_id, error = %e, "phase 1 provisioning failed");
                // Best effort: park the wizard so completion can be retried.
                let _ = self
                    .store
                    .swap_wizard_status(tenant_id, WizardStatus::Processing, WizardStatus::Error)
                    .await;
                return Err(e);
            }
        };

        if !self
            .store
            .swap_wizard_status(tenant_id, WizardStatus::Processing, WizardStatus::Completed)
            .await?
        {
            return Err(EngineError::Store(format!(
                "wizard for tenant {tenant_id} left Processing during phase 1"
            )));
        }

        let ctx = BackgroundContext {
            store: self.store.clone(),
            rules: self.rules.clone(),
            notifier: self.notifier.clone(),
            serials: self.serials.clone(),
            tenant_id,
            correlation_id: Uuid::new_v4(),
        };
        let background = tokio::spawn(run_background_provisioning(ctx));

        info!(
            %tenant_id,
            workspace_id = %summary.workspace_id,
            teams = summary.teams_created,
            raci = summary.raci_assignments,
            "phase 1 provisioning complete; background phase started"
        );

        Ok(CompletionOutcome {
            result: ProvisioningResult {
                tenant_id: Some(tenant_id),
                success: true,
                workspace_id: Some(summary.workspace_id),
                teams_created: summary.teams_created,
                raci_assignments: summary.raci_assignments,
                users_assigned: summary.users_assigned,
                warnings: summary.warnings,
                summary: format!(
                    "Onboarding completed: workspace ready, {} team(s), {} RACI entr(ies)",
                    summary.teams_created, summary.raci_assignments
                ),
                ..Default::default()
            },
            background: Some(background),
        })
    }

    async fn run_phase1(&self, wizard: &OnboardingWizard) -> Result<Phase1Summary> {
        let tenant_id = wizard.tenant_id;

        let profile = wizard.to_profile();
        self.store.upsert_profile(&profile).await?;

        let workspace = self.ensure_default_workspace(tenant_id).await?;

        let mut summary = Phase1Summary {
            workspace_id: workspace.id,
            teams_created: 0,
            raci_assignments: 0,
            users_assigned: 0,
            warnings: Vec::new(),
        };

        if let Some(spec) = wizard.teams() {
            self.materialize_teams(tenant_id, spec, &mut summary).await?;
        }

        Ok(summary)
    }

    /// Get-or-create the tenant's DEFAULT workspace.
    async fn ensure_default_workspace(&self, tenant_id: Uuid) -> Result<Workspace> {
        if let Some(existing) = self
            .store
            .find_workspace_by_code(tenant_id, DEFAULT_WORKSPACE_CODE)
            .await?
        {
            return Ok(existing);
        }
        let workspace = Workspace {
            id: Uuid::new_v4(),
            tenant_id,
            code: DEFAULT_WORKSPACE_CODE.to_string(),
            name: "Default Workspace".to_string(),
            is_default: true,
            created_at: Utc::now(),
        };
        self.store.insert_workspace(&workspace).await?;
        Ok(workspace)
    }

    async fn materialize_teams(
        &self,
        tenant_id: Uuid,
        spec: &TeamsRolesAccess,
        summary: &mut Phase1Summary,
    ) -> Result<()> {
        if !spec.create_teams_now {
            return Ok(());
        }

        if spec.teams.is_empty() {
            self.seed_default_org(tenant_id, summary).await?;
            return Ok(());
        }

        for team_spec in &spec.teams {
            let team = match self.store.find_team_by_code(tenant_id, &team_spec.code).await? {
                Some(existing) => existing,
                None => {
                    let team = Team {
                        id: Uuid::new_v4(),
                        tenant_id,
                        code: team_spec.code.clone(),
                        name: team_spec.name.clone(),
                        team_type: team_spec.team_type.clone(),
                        is_default_fallback: team_spec.is_default_fallback,
                        created_at: Utc::now(),
                    };
                    self.store.insert_team(&team).await?;
                    summary.teams_created += 1;
                    team
                }
            };

            let existing_members = self.store.members_of_team(tenant_id, team.id).await?;
            for member_spec in &team_spec.members {
                if existing_members
                    .iter()
                    .any(|m| m.email.eq_ignore_ascii_case(&member_spec.email))
                {
                    continue;
                }
                let Some(user) = self
                    .store
                    .find_user_by_email(tenant_id, &member_spec.email)
                    .await?
                else {
                    warn!(%tenant_id, email = %member_spec.email, "skipping team member: no matching user");
                    summary.warnings.push(format!(
                        "skipped member {}: no matching tenant user",
                        member_spec.email
                    ));
                    continue;
                };
                self.store
                    .insert_team_member(&TeamMember {
                        id: Uuid::new_v4(),
                        tenant_id,
                        team_id: team.id,
                        user_id: user.id,
                        email: user.email.clone(),
                        role_code: member_spec.role_code.clone(),
                        is_primary_for_role: member_spec.is_primary_for_role,
                        can_approve: false,
                        created_at: Utc::now(),
                    })
                    .await?;
                summary.users_assigned += 1;
            }
        }

        if spec.raci_mapping_needed {
            let existing = self.store.list_raci(tenant_id).await?;
            for raci_spec in &spec.raci {
                let Some(team) = self
                    .store
                    .find_team_by_code(tenant_id, &raci_spec.team_code)
                    .await?
                else {
                    summary.warnings.push(format!(
                        "skipped RACI entry for unknown team {}",
                        raci_spec.team_code
                    ));
                    continue;
                };
                let duplicate = existing.iter().any(|e| {
                    e.team_id == team.id
                        && e.scope_id == raci_spec.scope_id
                        && e.role_code == raci_spec.role_code
                        && e.raci == raci_spec.raci
                });
                if duplicate {
                    continue;
                }
                self.store
                    .insert_raci(&RaciAssignment {
                        id: Uuid::new_v4(),
                        tenant_id,
                        team_id: team.id,
                        scope_type: raci_spec.scope_type.clone(),
                        scope_id: raci_spec.scope_id.clone(),
                        role_code: raci_spec.role_code.clone(),
                        raci: raci_spec.raci,
                        priority: raci_spec.raci.priority(),
                        created_at: Utc::now(),
                    })
                    .await?;
                summary.raci_assignments += 1;
            }
        }

        Ok(())
    }

    /// Standard org for tenants that declared no teams: five teams, the
    /// family RACI matrix, and the first admin as primary control owner
    /// on the fallback team.
    async fn seed_default_org(
        &self,
        tenant_id: Uuid,
        summary: &mut Phase1Summary,
    ) -> Result<()> {
        for team in defaults::default_teams(tenant_id) {
            if self
                .store
                .find_team_by_code(tenant_id, &team.code)
                .await?
                .is_some()
            {
                continue;
            }
            self.store.insert_team(&team).await?;
            summary.teams_created += 1;
        }

        // Resolve from the store so retries after a partial seed still
        // find every team.
        let teams = self.store.list_teams(tenant_id).await?;
        let fallback_team_id = teams.iter().find(|t| t.is_default_fallback).map(|t| t.id);

        let existing_raci = self.store.list_raci(tenant_id).await?;
        for entry in defaults::default_raci(tenant_id, |code| {
            teams.iter().find(|t| t.code == code).map(|t| t.id)
        }) {
            let duplicate = existing_raci.iter().any(|e| {
                e.team_id == entry.team_id
                    && e.scope_id == entry.scope_id
                    && e.raci == entry.raci
            });
            if !duplicate {
                self.store.insert_raci(&entry).await?;
                summary.raci_assignments += 1;
            }
        }

        if let Some(team_id) = fallback_team_id {
            let seated = self.store.members_of_team(tenant_id, team_id).await?;
            let admins = self.store.list_admins(tenant_id).await?;
            let already_seated = admins
                .iter()
                .any(|a| seated.iter().any(|m| m.user_id == a.id));
            if admins.is_empty() {
                summary
                    .warnings
                    .push("no admin user to seat on the fallback team".to_string());
            } else if let (false, Some(admin)) = (already_seated, admins.into_iter().next()) {
                self.store
                    .insert_team_member(&TeamMember {
                        id: Uuid::new_v4(),
                        tenant_id,
                        team_id,
                        user_id: admin.id,
                        email: admin.email.clone(),
                        role_code: roles::CONTROL_OWNER.to_string(),
                        is_primary_for_role: true,
                        can_approve: true,
                        created_at: Utc::now(),
                    })
                    .await?;
                summary.users_assigned += 1;
            }
        }

        Ok(())
    }
}

fn noop_result(tenant_id: Uuid, summary: &str) -> ProvisioningResult {
    ProvisioningResult {
        tenant_id: Some(tenant_id),
        success: true,
        already_provisioned: true,
        summary: summary.to_string(),
        ..Default::default()
    }
}
