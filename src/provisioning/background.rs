//! Phase 2 of provisioning: detached, fault-isolated enrichment.
//!
//! Runs on its own task with its own store handles. Each step guards its
//! own preconditions and failures are collected, never propagated: a
//! broken rules engine must not take report shells or invitations down
//! with it. The whole phase is idempotent; re-running it against a
//! provisioned tenant creates nothing.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    FallbackSerialGenerator, NotificationSender, RulesEngine, ScopeDerivation,
    SerialNumberGenerator,
};
use crate::error::Result;
use crate::model::{
    Assessment, AssessmentRequirement, AuditEvent, AuditEventType, OrganizationProfile, Plan,
    ProvisioningResult, Report, TenantTemplate, TenantWorkflowConfig,
};
use crate::policy::{calculate_duration_days, PolicyEvaluator};
use crate::raci::{AssignmentEngine, ReviewKind};
use crate::store::EngineStore;
use crate::workflow::{WorkflowInstance, WorkflowKind};

/// At most this many assessments are scheduled up front.
const MAX_INITIAL_ASSESSMENTS: usize = 5;
/// Requirements copied from the catalog per assessment.
const MAX_REQUIREMENTS_PER_ASSESSMENT: usize = 20;
/// Only the first assessments get RACI auto-assignment at go-live.
const AUTO_ASSIGNED_ASSESSMENTS: usize = 3;
/// Start-date stagger between consecutive assessments.
const ASSESSMENT_STAGGER_DAYS: i64 = 7;
/// Plan horizon.
const PLAN_TARGET_DAYS: i64 = 90;

const REPORT_SERIAL_PREFIX: &str = "RPT";
const DEFAULT_REPORT_SHELLS: [(&str, &str); 3] = [
    ("Compliance Posture Overview", "posture"),
    ("Assessment Progress Summary", "assessment"),
    ("Evidence Readiness", "evidence"),
];

/// Everything the background phase needs, owned (it outlives the caller).
pub struct BackgroundContext {
    pub store: Arc<dyn EngineStore>,
    pub rules: Arc<dyn RulesEngine>,
    pub notifier: Arc<dyn NotificationSender>,
    pub serials: Arc<dyn SerialNumberGenerator>,
    pub tenant_id: Uuid,
    pub correlation_id: Uuid,
}

/// Run the background phase to completion. Public so a host application
/// can re-run it for a tenant whose first run reported step failures.
pub async fn run_background_provisioning(ctx: BackgroundContext) -> ProvisioningResult {
    let tenant_id = ctx.tenant_id;
    let mut result = ProvisioningResult {
        tenant_id: Some(tenant_id),
        success: true,
        ..Default::default()
    };

    // Idempotency check: a tenant with a plan and templates is done.
    match already_provisioned(&ctx).await {
        Ok(true) => {
            info!(%tenant_id, "background provisioning skipped: tenant already provisioned");
            result.already_provisioned = true;
            result.summary = "tenant already provisioned".to_string();
            return result;
        }
        Ok(false) => {}
        Err(e) => {
            error!(%tenant_id, error = %e, "idempotency check failed");
            result.success = false;
            result.errors.push(format!("idempotency check: {e}"));
            return result;
        }
    }

    let profile = match ctx.store.get_profile(tenant_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            result.success = false;
            result
                .errors
                .push("organization profile missing; phase 1 did not run".to_string());
            return result;
        }
        Err(e) => {
            result.success = false;
            result.errors.push(format!("profile lookup: {e}"));
            return result;
        }
    };

    // Scope derivation gates the plan and assessments; the remaining
    // steps run regardless.
    let scope = match derive_scope(&ctx, &profile).await {
        Ok(scope) => Some(scope),
        Err(e) => {
            error!(%tenant_id, error = %e, "scope derivation failed");
            result.errors.push(format!("scope derivation: {e}"));
            None
        }
    };

    if let Some(scope) = &scope {
        match create_plan(&ctx, scope).await {
            Ok(plan) => {
                result.plan_id = Some(plan.id);
                if let Err(e) =
                    create_assessments(&ctx, &profile, scope, &plan, &mut result).await
                {
                    error!(%tenant_id, error = %e, "assessment creation failed");
                    result.errors.push(format!("assessments: {e}"));
                }
            }
            Err(e) => {
                error!(%tenant_id, error = %e, "plan creation failed");
                result.errors.push(format!("plan: {e}"));
            }
        }
    }

    if let Err(e) = auto_assign_initial_assessments(&ctx, &mut result).await {
        error!(%tenant_id, error = %e, "RACI auto-assignment failed");
        result.errors.push(format!("auto-assignment: {e}"));
    }

    if let Err(e) = create_report_shells(&ctx, &mut result).await {
        error!(%tenant_id, error = %e, "report shell creation failed");
        result.errors.push(format!("reports: {e}"));
    }

    if let Err(e) = activate_default_workflows(&ctx, &profile, &mut result).await {
        error!(%tenant_id, error = %e, "workflow activation failed");
        result.errors.push(format!("workflow activation: {e}"));
    }

    if let Err(e) = send_admin_invitations(&ctx, &mut result).await {
        // Invitations are fire-and-forget; a channel failure is a warning.
        warn!(%tenant_id, error = %e, "admin invitations failed");
        result.warnings.push(format!("invitations: {e}"));
    }

    let completed = AuditEvent::new(
        tenant_id,
        ctx.correlation_id,
        AuditEventType::OnboardingCompleted,
        serde_json::json!({
            "assessments_created": result.assessments_created,
            "requirements_created": result.requirements_created,
            "users_assigned": result.users_assigned,
            "reports_created": result.reports_created,
            "workflows_activated": result.workflows_activated,
            "errors": result.errors,
        }),
    );
    if let Err(e) = ctx.store.record(completed).await {
        result.errors.push(format!("audit: {e}"));
    }

    result.success = result.errors.is_empty();
    result.summary = format!(
        "background provisioning finished: {} assessment(s), {} requirement(s), {} error(s)",
        result.assessments_created,
        result.requirements_created,
        result.errors.len()
    );
    info!(%tenant_id, summary = %result.summary, "background provisioning finished");
    result
}

async fn already_provisioned(ctx: &BackgroundContext) -> Result<bool> {
    let plans = ctx.store.list_plans(ctx.tenant_id).await?;
    let templates = ctx.store.list_templates(ctx.tenant_id).await?;
    Ok(!plans.is_empty() && !templates.is_empty())
}

async fn derive_scope(
    ctx: &BackgroundContext,
    profile: &OrganizationProfile,
) -> Result<ScopeDerivation> {
    let scope = ctx.rules.derive_scope(ctx.tenant_id, profile).await?;
    ctx.store
        .record(AuditEvent::new(
            ctx.tenant_id,
            ctx.correlation_id,
            AuditEventType::ScopeGenerated,
            serde_json::json!({
                "execution_id": scope.execution_id,
                "ruleset_id": scope.ruleset_id,
                "framework_codes": scope.framework_codes,
                "log": scope.log,
            }),
        ))
        .await?;
    info!(
        tenant_id = %ctx.tenant_id,
        frameworks = ?scope.framework_codes,
        "compliance scope derived"
    );
    Ok(scope)
}

async fn create_plan(ctx: &BackgroundContext, scope: &ScopeDerivation) -> Result<Plan> {
    let plan = Plan {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant_id,
        code: format!("PLAN-{}-001", Utc::now().format("%Y%m%d")),
        name: "Initial Compliance Plan".to_string(),
        ruleset_id: scope.ruleset_id.clone(),
        target_date: Utc::now() + Duration::days(PLAN_TARGET_DAYS),
        created_at: Utc::now(),
    };
    ctx.store.insert_plan(&plan).await?;
    ctx.store
        .record(AuditEvent::new(
            ctx.tenant_id,
            ctx.correlation_id,
            AuditEventType::PlanCreated,
            serde_json::json!({
                "plan_id": plan.id,
                "plan_code": plan.code,
                "ruleset_id": plan.ruleset_id,
            }),
        ))
        .await?;
    Ok(plan)
}

async fn create_assessments(
    ctx: &BackgroundContext,
    profile: &OrganizationProfile,
    scope: &ScopeDerivation,
    plan: &Plan,
    result: &mut ProvisioningResult,
) -> Result<()> {
    let decisions: Arc<dyn crate::store::DecisionStore> = ctx.store.clone();
    let evaluator = PolicyEvaluator::new(decisions);
    let duration_days = calculate_duration_days(Some(profile));
    let date_tag = Utc::now().format("%Y%m%d");

    for (index, framework) in scope
        .framework_codes
        .iter()
        .take(MAX_INITIAL_ASSESSMENTS)
        .enumerate()
    {
        let template = TenantTemplate {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            code: format!("BASE_{}_{}", framework, date_tag),
            name: format!("{} Baseline Assessment", framework),
            framework_code: framework.clone(),
            created_at: Utc::now(),
        };
        ctx.store.insert_template(&template).await?;
        result.template_ids.push(template.id);

        let decision = evaluator
            .assessment_priority(ctx.tenant_id, &template.code, Some(profile))
            .await?;
        let priority = match decision.decision.as_str() {
            "high" => crate::model::Priority::High,
            "medium" => crate::model::Priority::Medium,
            _ => crate::model::Priority::Normal,
        };

        let start = Utc::now() + Duration::days(ASSESSMENT_STAGGER_DAYS * index as i64);
        let assessment = Assessment {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            plan_id: plan.id,
            template_code: template.code.clone(),
            framework_code: framework.clone(),
            name: format!("{} Assessment", framework),
            priority,
            start_date: start,
            due_date: start + Duration::days(duration_days),
            created_at: Utc::now(),
        };
        ctx.store.insert_assessment(&assessment).await?;
        result.assessments_created += 1;

        let controls = ctx.store.controls_for_framework(framework).await?;
        if controls.is_empty() {
            warn!(
                tenant_id = %ctx.tenant_id,
                framework,
                "no catalog controls for framework; assessment created empty"
            );
            result
                .warnings
                .push(format!("no catalog controls for {framework}"));
        }
        for control in controls.into_iter().take(MAX_REQUIREMENTS_PER_ASSESSMENT) {
            ctx.store
                .insert_requirement(&AssessmentRequirement {
                    id: Uuid::new_v4(),
                    tenant_id: ctx.tenant_id,
                    assessment_id: assessment.id,
                    control_code: control.control_code,
                    title: control.title,
                    domain: control.domain,
                    created_at: Utc::now(),
                })
                .await?;
            result.requirements_created += 1;
        }
    }
    Ok(())
}

/// Start a review workflow for each of the first assessments and open
/// RACI-resolved tasks for their requirements.
async fn auto_assign_initial_assessments(
    ctx: &BackgroundContext,
    result: &mut ProvisioningResult,
) -> Result<()> {
    let engine = AssignmentEngine::new(ctx.store.clone());
    let mut assessments = ctx.store.list_assessments(ctx.tenant_id).await?;
    assessments.sort_by_key(|a| a.start_date);

    for assessment in assessments.into_iter().take(AUTO_ASSIGNED_ASSESSMENTS) {
        let instance = match ctx
            .store
            .find_active_instance(
                ctx.tenant_id,
                WorkflowKind::ComplianceTesting,
                "assessment",
                assessment.id,
            )
            .await?
        {
            Some(existing) => existing,
            None => {
                let instance = WorkflowInstance::new(
                    ctx.tenant_id,
                    WorkflowKind::ComplianceTesting,
                    "assessment",
                    assessment.id,
                    "system",
                );
                ctx.store.insert_instance(&instance).await?;
                ctx.store
                    .record(AuditEvent::new(
                        ctx.tenant_id,
                        ctx.correlation_id,
                        AuditEventType::WorkflowStarted,
                        serde_json::json!({
                            "kind": WorkflowKind::ComplianceTesting.as_str(),
                            "subject_type": "assessment",
                            "subject_id": assessment.id,
                        }),
                    ))
                    .await?;
                instance
            }
        };

        let requirements = ctx
            .store
            .requirements_for_assessment(ctx.tenant_id, assessment.id)
            .await?;
        for requirement in &requirements {
            if engine
                .auto_assign(&instance, requirement, ReviewKind::ControlReview)
                .await?
                .is_some()
            {
                result.users_assigned += 1;
            }
        }
    }
    Ok(())
}

async fn create_report_shells(
    ctx: &BackgroundContext,
    result: &mut ProvisioningResult,
) -> Result<()> {
    let existing = ctx.store.list_reports(ctx.tenant_id).await?;
    for (title, report_type) in DEFAULT_REPORT_SHELLS {
        if existing.iter().any(|r| r.report_type == report_type) {
            continue;
        }
        let serial = match ctx
            .serials
            .next_serial(ctx.tenant_id, REPORT_SERIAL_PREFIX)
            .await
        {
            Ok(serial) => serial,
            Err(e) => {
                warn!(
                    tenant_id = %ctx.tenant_id,
                    error = %e,
                    "serial service unavailable; using fallback serial"
                );
                FallbackSerialGenerator::generate(REPORT_SERIAL_PREFIX)
            }
        };
        ctx.store
            .insert_report(&Report {
                id: Uuid::new_v4(),
                tenant_id: ctx.tenant_id,
                serial,
                title: title.to_string(),
                report_type: report_type.to_string(),
                created_at: Utc::now(),
            })
            .await?;
        result.reports_created += 1;
    }
    Ok(())
}

/// Workflow configurations every tenant gets, plus the ones its
/// regulator, sector, and data profile call for.
fn workflow_codes_for(profile: &OrganizationProfile) -> Vec<&'static str> {
    let mut codes = vec!["WF-EVIDENCE-APPROVAL", "WF-AUDIT-REMEDIATION"];
    let regulator = profile.primary_regulator.to_uppercase();
    let sector = profile.sector.to_lowercase();

    if regulator.contains("NCA") || sector.contains("government") {
        codes.push("WF-NCA-ECC-ASSESSMENT");
    }
    if regulator.contains("SAMA") || sector.contains("banking") || sector.contains("insurance") {
        codes.push("WF-SAMA-CSF-ASSESSMENT");
    }
    if profile.handles_pii || profile.cross_border_transfers {
        codes.push("WF-PDPL-PIA");
    }
    codes
}

async fn activate_default_workflows(
    ctx: &BackgroundContext,
    profile: &OrganizationProfile,
    result: &mut ProvisioningResult,
) -> Result<()> {
    let existing = ctx.store.list_workflow_configs(ctx.tenant_id).await?;
    for code in workflow_codes_for(profile) {
        if existing.iter().any(|c| c.workflow_code == code) {
            continue;
        }
        ctx.store
            .insert_workflow_config(&TenantWorkflowConfig {
                id: Uuid::new_v4(),
                tenant_id: ctx.tenant_id,
                workflow_code: code.to_string(),
                enabled: true,
                created_at: Utc::now(),
            })
            .await?;
        result.workflows_activated += 1;
    }
    Ok(())
}

async fn send_admin_invitations(
    ctx: &BackgroundContext,
    result: &mut ProvisioningResult,
) -> Result<()> {
    for admin in ctx.store.list_admins(ctx.tenant_id).await? {
        if admin.invited_at.is_some() {
            continue;
        }
        match ctx
            .notifier
            .send(
                ctx.tenant_id,
                &admin.email,
                "Your compliance workspace is ready",
                "Onboarding has completed and your workspace is provisioned.",
            )
            .await
        {
            Ok(()) => {
                ctx.store.mark_invited(ctx.tenant_id, admin.id).await?;
            }
            Err(e) => {
                warn!(
                    tenant_id = %ctx.tenant_id,
                    admin = %admin.email,
                    error = %e,
                    "invitation delivery failed"
                );
                result
                    .warnings
                    .push(format!("invitation to {} failed: {e}", admin.email));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(regulator: &str, sector: &str, pii: bool) -> OrganizationProfile {
        OrganizationProfile {
            tenant_id: Uuid::new_v4(),
            legal_name: "Test".to_string(),
            sector: sector.to_string(),
            country: "SA".to_string(),
            operating_countries: vec![],
            primary_regulator: regulator.to_string(),
            frameworks: vec![],
            handles_pii: pii,
            sensitive_data: false,
            cross_border_transfers: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_every_tenant_gets_the_base_workflows() {
        let codes = workflow_codes_for(&profile("Ministry of Commerce", "Retail", false));
        assert_eq!(codes, vec!["WF-EVIDENCE-APPROVAL", "WF-AUDIT-REMEDIATION"]);
    }

    #[test]
    fn test_sama_bank_gets_csf_workflow() {
        let codes = workflow_codes_for(&profile("SAMA", "Banking", false));
        assert!(codes.contains(&"WF-SAMA-CSF-ASSESSMENT"));
        assert!(!codes.contains(&"WF-NCA-ECC-ASSESSMENT"));
    }

    #[test]
    fn test_government_tenant_gets_ecc_workflow() {
        let codes = workflow_codes_for(&profile("NCA", "Government", false));
        assert!(codes.contains(&"WF-NCA-ECC-ASSESSMENT"));
    }

    #[test]
    fn test_pii_triggers_pia_workflow() {
        let codes = workflow_codes_for(&profile("Ministry of Commerce", "Retail", true));
        assert!(codes.contains(&"WF-PDPL-PIA"));
    }
}
