//! Priority and duration heuristics, with a write-once decision cache.
//!
//! Pure functions decide; the evaluator wraps them with a cache keyed by
//! (tenant, policy type, context hash) so the same context always yields
//! the same recorded decision, and every decision is auditable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{OrganizationProfile, Priority};
use crate::store::DecisionStore;

pub const POLICY_VERSION: &str = "1.0";
/// Number of ordered rules the priority policy evaluates.
pub const PRIORITY_RULES_EVALUATED: u32 = 4;
/// Confidence recorded when a rule matched / when the default applied.
pub const CONFIDENCE_MATCHED: u8 = 90;
pub const CONFIDENCE_DEFAULT: u8 = 70;

pub const ASSESSMENT_PRIORITY_POLICY: &str = "assessment_priority";

const BASE_DURATION_DAYS: i64 = 21;
const PER_COUNTRY_DAYS: i64 = 3;
const COMPLEX_SECTOR_DAYS: i64 = 14;
const SENSITIVE_DATA_DAYS: i64 = 7;
const MAX_DURATION_DAYS: i64 = 90;
const DEFAULT_DURATION_DAYS: i64 = 30;

const COMPLEX_SECTORS: [&str; 5] = [
    "banking",
    "insurance",
    "healthcare",
    "government",
    "critical infrastructure",
];

const MANDATORY_LOCAL_FRAMEWORKS: [&str; 3] = ["NCA-ECC", "SAMA-CSF", "PDPL"];
const URGENT_REGULATORS: [&str; 2] = ["NCA", "SAMA"];

/// Assessment duration in days for a tenant profile.
///
/// Monotonic in every input: adding countries or risk signals never
/// shortens the window. Capped at [`MAX_DURATION_DAYS`].
pub fn calculate_duration_days(profile: Option<&OrganizationProfile>) -> i64 {
    let Some(profile) = profile else {
        return DEFAULT_DURATION_DAYS;
    };

    let mut days = BASE_DURATION_DAYS;
    days += PER_COUNTRY_DAYS * profile.operating_countries.len() as i64;

    let sector = profile.sector.to_lowercase();
    if COMPLEX_SECTORS.iter().any(|s| sector.contains(s)) {
        days += COMPLEX_SECTOR_DAYS;
    }
    if profile.sensitive_data || profile.handles_pii {
        days += SENSITIVE_DATA_DAYS;
    }
    days.min(MAX_DURATION_DAYS)
}

/// Outcome of the ordered priority rules. First match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityOutcome {
    pub priority: Priority,
    pub reason: String,
    pub rules_matched: u32,
}

/// Evaluate the four ordered priority rules for an assessment template.
pub fn evaluate_priority(
    template_code: &str,
    profile: Option<&OrganizationProfile>,
) -> PriorityOutcome {
    let code = template_code.to_uppercase();

    if let Some(framework) = MANDATORY_LOCAL_FRAMEWORKS.iter().find(|f| code.contains(*f)) {
        return PriorityOutcome {
            priority: Priority::High,
            reason: format!("mandatory local framework {framework}"),
            rules_matched: 1,
        };
    }

    if let Some(profile) = profile {
        let regulator = profile.primary_regulator.to_uppercase();
        if let Some(r) = URGENT_REGULATORS.iter().find(|r| regulator.contains(*r)) {
            return PriorityOutcome {
                priority: Priority::High,
                reason: format!("primary regulator {r} requires expedited assessment"),
                rules_matched: 1,
            };
        }
    }

    if code.contains("ISO") || code.contains("NIST") {
        return PriorityOutcome {
            priority: Priority::Medium,
            reason: "international standard framework".to_string(),
            rules_matched: 1,
        };
    }

    if profile
        .map(|p| p.sensitive_data || p.handles_pii)
        .unwrap_or(false)
    {
        return PriorityOutcome {
            priority: Priority::Medium,
            reason: "tenant handles sensitive or personal data".to_string(),
            rules_matched: 1,
        };
    }

    PriorityOutcome {
        priority: Priority::Normal,
        reason: "no priority rule matched".to_string(),
        rules_matched: 0,
    }
}

/// A recorded policy decision. Write-once per context hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub policy_type: String,
    pub context_hash: String,
    pub decision: String,
    pub reason: String,
    pub policy_version: String,
    pub rules_evaluated: u32,
    pub rules_matched: u32,
    /// Informational only; nothing branches on it.
    pub confidence: u8,
    pub decided_at: DateTime<Utc>,
}

/// Caching wrapper over the pure evaluators.
pub struct PolicyEvaluator {
    store: Arc<dyn DecisionStore>,
}

impl PolicyEvaluator {
    pub fn new(store: Arc<dyn DecisionStore>) -> Self {
        Self { store }
    }

    /// Priority for an assessment, cached per (tenant, context).
    ///
    /// A cache hit returns the stored decision verbatim, even if the
    /// policy rules have since changed; decisions are immutable audit
    /// records.
    pub async fn assessment_priority(
        &self,
        tenant_id: Uuid,
        template_code: &str,
        profile: Option<&OrganizationProfile>,
    ) -> Result<PolicyDecision> {
        let hash = context_hash(template_code, profile);

        if let Some(hit) = self
            .store
            .find_decision(tenant_id, ASSESSMENT_PRIORITY_POLICY, &hash)
            .await?
        {
            debug!(%tenant_id, template_code, "policy decision cache hit");
            return Ok(hit);
        }

        let outcome = evaluate_priority(template_code, profile);
        let decision = PolicyDecision {
            id: Uuid::new_v4(),
            tenant_id,
            policy_type: ASSESSMENT_PRIORITY_POLICY.to_string(),
            context_hash: hash,
            decision: outcome.priority.as_str().to_string(),
            reason: outcome.reason,
            policy_version: POLICY_VERSION.to_string(),
            rules_evaluated: PRIORITY_RULES_EVALUATED,
            rules_matched: outcome.rules_matched,
            confidence: if outcome.rules_matched > 0 {
                CONFIDENCE_MATCHED
            } else {
                CONFIDENCE_DEFAULT
            },
            decided_at: Utc::now(),
        };

        // A concurrent writer may have inserted first; the stored row wins.
        self.store.put_decision_if_absent(decision).await
    }
}

fn context_hash(template_code: &str, profile: Option<&OrganizationProfile>) -> String {
    let context = serde_json::json!({
        "template_code": template_code,
        "sector": profile.map(|p| p.sector.as_str()),
        "primary_regulator": profile.map(|p| p.primary_regulator.as_str()),
        "sensitive_data": profile.map(|p| p.sensitive_data),
        "handles_pii": profile.map(|p| p.handles_pii),
    });
    let mut hasher = Sha256::new();
    hasher.update(context.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn profile(sector: &str, countries: usize, sensitive: bool) -> OrganizationProfile {
        OrganizationProfile {
            tenant_id: Uuid::new_v4(),
            legal_name: "Test Org".to_string(),
            sector: sector.to_string(),
            country: "SA".to_string(),
            operating_countries: (0..countries).map(|i| format!("C{i}")).collect(),
            primary_regulator: "Ministry of Commerce".to_string(),
            frameworks: vec![],
            handles_pii: false,
            sensitive_data: sensitive,
            cross_border_transfers: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_duration_defaults_without_profile() {
        assert_eq!(calculate_duration_days(None), 30);
    }

    #[test]
    fn test_duration_components_add_up() {
        // 21 + 2*3 = 27
        assert_eq!(calculate_duration_days(Some(&profile("Retail", 2, false))), 27);
        // 21 + 2*3 + 14 = 41
        assert_eq!(calculate_duration_days(Some(&profile("Banking", 2, false))), 41);
        // 21 + 2*3 + 14 + 7 = 48
        assert_eq!(calculate_duration_days(Some(&profile("Banking", 2, true))), 48);
    }

    #[test]
    fn test_duration_is_monotonic_in_countries() {
        let mut last = 0;
        for n in 0..40 {
            let d = calculate_duration_days(Some(&profile("Healthcare", n, true)));
            assert!(d >= last);
            last = d;
        }
    }

    #[test]
    fn test_duration_caps_at_ninety() {
        assert_eq!(calculate_duration_days(Some(&profile("Banking", 50, true))), 90);
    }

    #[test]
    fn test_mandatory_framework_is_always_high() {
        for code in ["BASE_NCA-ECC_20260823", "SAMA-CSF", "pdpl-overlay"] {
            let outcome = evaluate_priority(code, None);
            assert_eq!(outcome.priority, Priority::High, "code {code}");
            assert_eq!(outcome.rules_matched, 1);
        }
    }

    #[test]
    fn test_regulator_rule_fires_before_iso_rule() {
        let mut p = profile("Banking", 1, false);
        p.primary_regulator = "SAMA".to_string();
        let outcome = evaluate_priority("BASE_ISO-27001_20260823", Some(&p));
        assert_eq!(outcome.priority, Priority::High);
        assert!(outcome.reason.contains("SAMA"));
    }

    #[test]
    fn test_iso_without_urgent_regulator_is_medium() {
        let p = profile("Retail", 1, false);
        let outcome = evaluate_priority("BASE_ISO-27001_20260823", Some(&p));
        assert_eq!(outcome.priority, Priority::Medium);
    }

    #[test]
    fn test_default_priority_matches_no_rules() {
        let p = profile("Retail", 1, false);
        let outcome = evaluate_priority("CUSTOM-BASELINE", Some(&p));
        assert_eq!(outcome.priority, Priority::Normal);
        assert_eq!(outcome.rules_matched, 0);
    }

    #[tokio::test]
    async fn test_decision_is_cached_and_write_once() {
        let store = Arc::new(MemoryStore::new());
        let evaluator = PolicyEvaluator::new(store);
        let tenant = Uuid::new_v4();
        let p = profile("Banking", 1, true);

        let first = evaluator
            .assessment_priority(tenant, "BASE_NCA-ECC_20260823", Some(&p))
            .await
            .unwrap();
        assert_eq!(first.decision, "high");
        assert_eq!(first.confidence, CONFIDENCE_MATCHED);
        assert_eq!(first.policy_version, POLICY_VERSION);

        let second = evaluator
            .assessment_priority(tenant, "BASE_NCA-ECC_20260823", Some(&p))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.decided_at, first.decided_at);
    }

    #[tokio::test]
    async fn test_default_decision_has_lower_confidence() {
        let store = Arc::new(MemoryStore::new());
        let evaluator = PolicyEvaluator::new(store);
        let p = profile("Retail", 1, false);

        let decision = evaluator
            .assessment_priority(Uuid::new_v4(), "CUSTOM-BASELINE", Some(&p))
            .await
            .unwrap();
        assert_eq!(decision.decision, "normal");
        assert_eq!(decision.confidence, CONFIDENCE_DEFAULT);
        assert_eq!(decision.rules_matched, 0);
        assert_eq!(decision.rules_evaluated, PRIORITY_RULES_EVALUATED);
    }
}
