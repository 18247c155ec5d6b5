//! Onboarding wizard aggregate.
//!
//! Twelve ordered sections, six of them required. Each section carries a
//! typed payload; completion is set-based and idempotent. Submitting the
//! final section (with the required set complete) is the only trigger
//! for provisioning, which flips the wizard status through a
//! compare-and-set fence so concurrent submissions provision once.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::OrganizationProfile;
use crate::raci::RaciRole;

pub const SECTION_COUNT: u8 = 12;

/// The twelve wizard sections, in step order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WizardSection {
    OrganizationIdentity,
    AssuranceObjective,
    RegulatoryApplicability,
    ScopeDefinition,
    DataRiskProfile,
    TechnologyLandscape,
    ControlOwnership,
    TeamsRolesAccess,
    WorkflowCadence,
    EvidenceStandards,
    BaselineOverlays,
    GoLiveMetrics,
}

impl WizardSection {
    pub const ALL: [WizardSection; 12] = [
        Self::OrganizationIdentity,
        Self::AssuranceObjective,
        Self::RegulatoryApplicability,
        Self::ScopeDefinition,
        Self::DataRiskProfile,
        Self::TechnologyLandscape,
        Self::ControlOwnership,
        Self::TeamsRolesAccess,
        Self::WorkflowCadence,
        Self::EvidenceStandards,
        Self::BaselineOverlays,
        Self::GoLiveMetrics,
    ];

    /// 1-based step number.
    pub fn step(&self) -> u8 {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0) as u8 + 1
    }

    pub fn at_step(step: u8) -> Option<WizardSection> {
        if (1..=SECTION_COUNT).contains(&step) {
            Some(Self::ALL[(step - 1) as usize])
        } else {
            None
        }
    }

    pub fn letter(&self) -> char {
        (b'A' + self.step() - 1) as char
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::OrganizationIdentity => "Organization Identity",
            Self::AssuranceObjective => "Assurance Objective",
            Self::RegulatoryApplicability => "Regulatory Applicability",
            Self::ScopeDefinition => "Scope Definition",
            Self::DataRiskProfile => "Data & Risk Profile",
            Self::TechnologyLandscape => "Technology Landscape",
            Self::ControlOwnership => "Control Ownership",
            Self::TeamsRolesAccess => "Teams, Roles & Access",
            Self::WorkflowCadence => "Workflow & Cadence",
            Self::EvidenceStandards => "Evidence Standards",
            Self::BaselineOverlays => "Baseline & Overlays",
            Self::GoLiveMetrics => "Go-Live & Metrics",
        }
    }

    /// Sections that must be complete before provisioning may start.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            Self::OrganizationIdentity
                | Self::ScopeDefinition
                | Self::DataRiskProfile
                | Self::TechnologyLandscape
                | Self::TeamsRolesAccess
                | Self::WorkflowCadence
        )
    }
}

/// Section A answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationIdentity {
    pub legal_name: String,
    pub sector: String,
    pub country: String,
    pub operating_countries: Vec<String>,
}

/// Section B answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssuranceObjective {
    pub objectives: Vec<String>,
}

/// Section C answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegulatoryApplicability {
    pub primary_regulator: String,
    pub frameworks: Vec<String>,
}

/// Section D answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeDefinition {
    pub business_units: Vec<String>,
    pub locations: Vec<String>,
    pub critical_processes: Vec<String>,
}

/// Section E answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataRiskProfile {
    pub handles_pii: bool,
    pub sensitive_data: bool,
    pub cross_border_transfers: bool,
    pub risk_appetite: String,
}

/// Section F answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnologyLandscape {
    pub hosting_model: String,
    pub critical_systems: Vec<String>,
}

/// Section G answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlOwnership {
    pub owners: Vec<ControlOwner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlOwner {
    pub domain: String,
    pub owner_email: String,
}

/// Section H answers: teams, members, and the RACI matrix seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamsRolesAccess {
    pub create_teams_now: bool,
    pub raci_mapping_needed: bool,
    pub teams: Vec<TeamSpec>,
    pub raci: Vec<RaciSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSpec {
    pub code: String,
    pub name: String,
    pub team_type: String,
    pub is_default_fallback: bool,
    pub members: Vec<MemberSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSpec {
    pub email: String,
    pub role_code: String,
    pub is_primary_for_role: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaciSpec {
    pub team_code: String,
    pub scope_type: String,
    pub scope_id: String,
    pub role_code: String,
    pub raci: RaciRole,
}

/// Section I answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowCadence {
    pub assessment_frequency: String,
    pub evidence_refresh_days: u32,
}

/// Section J answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceStandards {
    pub accepted_formats: Vec<String>,
    pub retention_days: u32,
}

/// Section K answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineOverlays {
    pub baseline: String,
    pub overlays: Vec<String>,
}

/// Section L answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoLiveMetrics {
    pub target_go_live: Option<DateTime<Utc>>,
    pub kpis: Vec<String>,
}

/// Typed payload of one completed section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "snake_case")]
pub enum SectionPayload {
    OrganizationIdentity(OrganizationIdentity),
    AssuranceObjective(AssuranceObjective),
    RegulatoryApplicability(RegulatoryApplicability),
    ScopeDefinition(ScopeDefinition),
    DataRiskProfile(DataRiskProfile),
    TechnologyLandscape(TechnologyLandscape),
    ControlOwnership(ControlOwnership),
    TeamsRolesAccess(TeamsRolesAccess),
    WorkflowCadence(WorkflowCadence),
    EvidenceStandards(EvidenceStandards),
    BaselineOverlays(BaselineOverlays),
    GoLiveMetrics(GoLiveMetrics),
}

impl SectionPayload {
    pub fn section(&self) -> WizardSection {
        match self {
            Self::OrganizationIdentity(_) => WizardSection::OrganizationIdentity,
            Self::AssuranceObjective(_) => WizardSection::AssuranceObjective,
            Self::RegulatoryApplicability(_) => WizardSection::RegulatoryApplicability,
            Self::ScopeDefinition(_) => WizardSection::ScopeDefinition,
            Self::DataRiskProfile(_) => WizardSection::DataRiskProfile,
            Self::TechnologyLandscape(_) => WizardSection::TechnologyLandscape,
            Self::ControlOwnership(_) => WizardSection::ControlOwnership,
            Self::TeamsRolesAccess(_) => WizardSection::TeamsRolesAccess,
            Self::WorkflowCadence(_) => WizardSection::WorkflowCadence,
            Self::EvidenceStandards(_) => WizardSection::EvidenceStandards,
            Self::BaselineOverlays(_) => WizardSection::BaselineOverlays,
            Self::GoLiveMetrics(_) => WizardSection::GoLiveMetrics,
        }
    }
}

/// Lifecycle status of a wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStatus {
    NotStarted,
    InProgress,
    /// Provisioning fence: exactly one completion attempt may hold it.
    Processing,
    Completed,
    /// A Phase 1 failure; completion may be retried.
    Error,
}

impl WizardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for WizardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The per-tenant wizard aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingWizard {
    pub tenant_id: Uuid,
    pub status: WizardStatus,
    pub answers: BTreeMap<WizardSection, SectionPayload>,
    pub completed: BTreeSet<WizardSection>,
    /// 1-based step the user is on: first incomplete section.
    pub current_step: u8,
    pub started_at: DateTime<Utc>,
    pub last_saved_at: DateTime<Utc>,
}

impl OnboardingWizard {
    pub fn new(tenant_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            status: WizardStatus::NotStarted,
            answers: BTreeMap::new(),
            completed: BTreeSet::new(),
            current_step: 1,
            started_at: now,
            last_saved_at: now,
        }
    }

    /// Store a section's answers and mark it complete.
    pub fn save_section(&mut self, payload: SectionPayload) {
        let section = payload.section();
        self.answers.insert(section, payload);
        if self.status == WizardStatus::NotStarted {
            self.status = WizardStatus::InProgress;
        }
        self.mark_completed(section);
    }

    /// Idempotent completion: re-marking a completed section changes
    /// nothing but the save timestamp.
    pub fn mark_completed(&mut self, section: WizardSection) {
        self.completed.insert(section);
        self.current_step = self.first_incomplete_step();
        self.last_saved_at = Utc::now();
    }

    fn first_incomplete_step(&self) -> u8 {
        WizardSection::ALL
            .iter()
            .find(|s| !self.completed.contains(s))
            .map(|s| s.step())
            .unwrap_or(SECTION_COUNT)
    }

    pub fn progress_percent(&self) -> u8 {
        (self.completed.len() as u16 * 100 / SECTION_COUNT as u16) as u8
    }

    /// A step is reachable if it is at or before the current step, or
    /// its section was already completed (revisiting is always allowed).
    pub fn can_proceed_to(&self, step: u8) -> bool {
        match WizardSection::at_step(step) {
            Some(section) => step <= self.current_step || self.completed.contains(&section),
            None => false,
        }
    }

    pub fn is_section_complete(&self, section: WizardSection) -> bool {
        self.completed.contains(&section)
    }

    pub fn missing_required_sections(&self) -> Vec<WizardSection> {
        WizardSection::ALL
            .iter()
            .filter(|s| s.is_required() && !self.completed.contains(s))
            .copied()
            .collect()
    }

    pub fn required_sections_complete(&self) -> bool {
        self.missing_required_sections().is_empty()
    }

    pub fn organization_identity(&self) -> Option<&OrganizationIdentity> {
        match self.answers.get(&WizardSection::OrganizationIdentity) {
            Some(SectionPayload::OrganizationIdentity(v)) => Some(v),
            _ => None,
        }
    }

    pub fn regulatory(&self) -> Option<&RegulatoryApplicability> {
        match self.answers.get(&WizardSection::RegulatoryApplicability) {
            Some(SectionPayload::RegulatoryApplicability(v)) => Some(v),
            _ => None,
        }
    }

    pub fn data_risk(&self) -> Option<&DataRiskProfile> {
        match self.answers.get(&WizardSection::DataRiskProfile) {
            Some(SectionPayload::DataRiskProfile(v)) => Some(v),
            _ => None,
        }
    }

    pub fn teams(&self) -> Option<&TeamsRolesAccess> {
        match self.answers.get(&WizardSection::TeamsRolesAccess) {
            Some(SectionPayload::TeamsRolesAccess(v)) => Some(v),
            _ => None,
        }
    }

    /// Project the wizard answers onto an organization profile.
    /// Optional sections contribute empty defaults.
    pub fn to_profile(&self) -> OrganizationProfile {
        let identity = self.organization_identity();
        let regulatory = self.regulatory();
        let data = self.data_risk();
        OrganizationProfile {
            tenant_id: self.tenant_id,
            legal_name: identity.map(|i| i.legal_name.clone()).unwrap_or_default(),
            sector: identity.map(|i| i.sector.clone()).unwrap_or_default(),
            country: identity.map(|i| i.country.clone()).unwrap_or_default(),
            operating_countries: identity
                .map(|i| i.operating_countries.clone())
                .unwrap_or_default(),
            primary_regulator: regulatory
                .map(|r| r.primary_regulator.clone())
                .unwrap_or_default(),
            frameworks: regulatory.map(|r| r.frameworks.clone()).unwrap_or_default(),
            handles_pii: data.map(|d| d.handles_pii).unwrap_or_default(),
            sensitive_data: data.map(|d| d.sensitive_data).unwrap_or_default(),
            cross_border_transfers: data.map(|d| d.cross_border_transfers).unwrap_or_default(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wizard() -> OnboardingWizard {
        OnboardingWizard::new(Uuid::new_v4())
    }

    #[test]
    fn test_sections_cover_a_through_l() {
        assert_eq!(WizardSection::ALL.len(), 12);
        assert_eq!(WizardSection::OrganizationIdentity.letter(), 'A');
        assert_eq!(WizardSection::GoLiveMetrics.letter(), 'L');
        assert_eq!(WizardSection::at_step(8), Some(WizardSection::TeamsRolesAccess));
        assert_eq!(WizardSection::at_step(0), None);
        assert_eq!(WizardSection::at_step(13), None);
    }

    #[test]
    fn test_required_set() {
        let required: Vec<char> = WizardSection::ALL
            .iter()
            .filter(|s| s.is_required())
            .map(|s| s.letter())
            .collect();
        assert_eq!(required, vec!['A', 'D', 'E', 'F', 'H', 'I']);
    }

    #[test]
    fn test_progress_and_step_advance() {
        let mut w = wizard();
        assert_eq!(w.progress_percent(), 0);
        assert_eq!(w.current_step, 1);

        w.save_section(SectionPayload::OrganizationIdentity(Default::default()));
        assert_eq!(w.status, WizardStatus::InProgress);
        assert_eq!(w.current_step, 2);
        assert_eq!(w.progress_percent(), 8);

        // Completing out of order: step stays at the first gap.
        w.save_section(SectionPayload::ScopeDefinition(Default::default()));
        assert_eq!(w.current_step, 2);
        assert_eq!(w.progress_percent(), 16);
    }

    #[test]
    fn test_mark_completed_is_idempotent() {
        let mut w = wizard();
        w.save_section(SectionPayload::OrganizationIdentity(Default::default()));
        let before = (w.completed.len(), w.current_step, w.progress_percent());
        w.mark_completed(WizardSection::OrganizationIdentity);
        w.mark_completed(WizardSection::OrganizationIdentity);
        assert_eq!(
            before,
            (w.completed.len(), w.current_step, w.progress_percent())
        );
    }

    #[test]
    fn test_can_proceed_rules() {
        let mut w = wizard();
        assert!(w.can_proceed_to(1));
        assert!(!w.can_proceed_to(2));
        assert!(!w.can_proceed_to(13));

        w.save_section(SectionPayload::OrganizationIdentity(Default::default()));
        w.save_section(SectionPayload::AssuranceObjective(Default::default()));
        assert!(w.can_proceed_to(3));
        assert!(!w.can_proceed_to(4));
        // Revisiting completed sections is always allowed.
        assert!(w.can_proceed_to(1));
    }

    #[test]
    fn test_full_completion_reads_100_percent() {
        let mut w = wizard();
        for section in WizardSection::ALL {
            w.mark_completed(section);
        }
        assert_eq!(w.progress_percent(), 100);
        assert_eq!(w.current_step, 12);
        assert!(w.required_sections_complete());
    }

    #[test]
    fn test_profile_projection() {
        let mut w = wizard();
        w.save_section(SectionPayload::OrganizationIdentity(OrganizationIdentity {
            legal_name: "Noor Bank".to_string(),
            sector: "Banking".to_string(),
            country: "SA".to_string(),
            operating_countries: vec!["SA".to_string(), "AE".to_string()],
        }));
        w.save_section(SectionPayload::RegulatoryApplicability(
            RegulatoryApplicability {
                primary_regulator: "SAMA".to_string(),
                frameworks: vec!["SAMA-CSF".to_string()],
            },
        ));
        w.save_section(SectionPayload::DataRiskProfile(DataRiskProfile {
            handles_pii: true,
            sensitive_data: true,
            cross_border_transfers: false,
            risk_appetite: "low".to_string(),
        }));

        let profile = w.to_profile();
        assert_eq!(profile.legal_name, "Noor Bank");
        assert_eq!(profile.operating_countries.len(), 2);
        assert_eq!(profile.primary_regulator, "SAMA");
        assert!(profile.sensitive_data);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut w = wizard();
        w.save_section(SectionPayload::TeamsRolesAccess(TeamsRolesAccess {
            create_teams_now: true,
            raci_mapping_needed: true,
            teams: vec![],
            raci: vec![],
        }));
        let json = serde_json::to_string(&w).unwrap();
        let back: OnboardingWizard = serde_json::from_str(&json).unwrap();
        assert!(back.is_section_complete(WizardSection::TeamsRolesAccess));
        assert!(back.teams().unwrap().create_teams_now);
    }
}
