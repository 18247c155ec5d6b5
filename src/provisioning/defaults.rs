//! Default teams and RACI matrix.
//!
//! Tenants that finish the wizard without declaring teams still need a
//! working assignment matrix, so provisioning seeds a standard org:
//! five teams and Responsible/Accountable entries over the common
//! control families, plus a wildcard entry on the fallback team.

use chrono::Utc;
use uuid::Uuid;

use crate::raci::{RaciAssignment, RaciRole, Team};
use crate::workflow::roles;

pub const FALLBACK_TEAM_CODE: &str = "GRC-CORE";

/// (code, name, type, is_default_fallback)
const DEFAULT_TEAMS: [(&str, &str, &str, bool); 5] = [
    (FALLBACK_TEAM_CODE, "GRC Core Team", "governance", true),
    ("SEC-OPS", "Security Operations", "security", false),
    ("IT-OPS", "IT Operations", "operations", false),
    ("RISK-MGT", "Risk Management", "risk", false),
    ("INT-AUDIT", "Internal Audit", "audit", false),
];

/// Control family to (Responsible team, Accountable team).
const FAMILY_OWNERSHIP: [(&str, &str, &str); 8] = [
    ("IAM", "SEC-OPS", FALLBACK_TEAM_CODE),
    ("NETWORK", "IT-OPS", "SEC-OPS"),
    ("CHANGE", "IT-OPS", FALLBACK_TEAM_CODE),
    ("BCM", "RISK-MGT", FALLBACK_TEAM_CODE),
    ("RISK", "RISK-MGT", FALLBACK_TEAM_CODE),
    ("VENDOR", FALLBACK_TEAM_CODE, "RISK-MGT"),
    ("DATA", "SEC-OPS", FALLBACK_TEAM_CODE),
    ("AUDIT", "INT-AUDIT", FALLBACK_TEAM_CODE),
];

pub fn default_teams(tenant_id: Uuid) -> Vec<Team> {
    DEFAULT_TEAMS
        .iter()
        .map(|(code, name, team_type, fallback)| Team {
            id: Uuid::new_v4(),
            tenant_id,
            code: code.to_string(),
            name: name.to_string(),
            team_type: team_type.to_string(),
            is_default_fallback: *fallback,
            created_at: Utc::now(),
        })
        .collect()
}

/// RACI entries for the default org. `team_id_by_code` must cover every
/// code in the family table.
pub fn default_raci(
    tenant_id: Uuid,
    team_id_by_code: impl Fn(&str) -> Option<Uuid>,
) -> Vec<RaciAssignment> {
    let mut entries = Vec::new();
    let mut push = |team_code: &str, scope_id: &str, role_code: &str, raci: RaciRole| {
        if let Some(team_id) = team_id_by_code(team_code) {
            entries.push(RaciAssignment {
                id: Uuid::new_v4(),
                tenant_id,
                team_id,
                scope_type: "control_domain".to_string(),
                scope_id: scope_id.to_string(),
                role_code: role_code.to_string(),
                raci,
                priority: raci.priority(),
                created_at: Utc::now(),
            });
        }
    };

    for (family, responsible, accountable) in FAMILY_OWNERSHIP {
        push(responsible, family, roles::CONTROL_OWNER, RaciRole::Responsible);
        push(accountable, family, roles::COMPLIANCE_OFFICER, RaciRole::Accountable);
    }
    // Wildcard: work in an unmapped family lands on the fallback team.
    push(
        FALLBACK_TEAM_CODE,
        "DEFAULT",
        roles::CONTROL_OWNER,
        RaciRole::Responsible,
    );
    entries
}
