//! External collaborator seams.
//!
//! The engine consumes a rules engine, an identity provider, a
//! notification channel, and a serial-number service through these
//! traits. Defaults suitable for tests and demos live alongside them.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::error::Result;
use crate::model::OrganizationProfile;

/// Outcome of a scope derivation run.
#[derive(Debug, Clone)]
pub struct ScopeDerivation {
    pub execution_id: Uuid,
    pub ruleset_id: String,
    /// Framework codes in scope for the tenant, in priority order.
    pub framework_codes: Vec<String>,
    /// Raw derivation log for the audit trail.
    pub log: serde_json::Value,
}

/// Derives the tenant's compliance scope from its profile.
#[async_trait]
pub trait RulesEngine: Send + Sync {
    async fn derive_scope(
        &self,
        tenant_id: Uuid,
        profile: &OrganizationProfile,
    ) -> Result<ScopeDerivation>;
}

/// Resolves the role codes an actor holds within a tenant.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn roles_for_actor(&self, tenant_id: Uuid, actor: &str) -> Result<Vec<String>>;
}

/// Outbound notification channel. Delivery failures must not fail the
/// caller; implementations report them through the `Result` and the
/// engine logs and continues.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        tenant_id: Uuid,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<()>;
}

/// Issues sequential serial numbers for documents and reports.
#[async_trait]
pub trait SerialNumberGenerator: Send + Sync {
    async fn next_serial(&self, tenant_id: Uuid, prefix: &str) -> Result<String>;
}

/// Serial generator of last resort: `PREFIX-yyyyMMdd-<random8>`.
///
/// Not sequential, but unique enough for shells created before the
/// numbering service is reachable.
#[derive(Debug, Default)]
pub struct FallbackSerialGenerator;

impl FallbackSerialGenerator {
    pub fn generate(prefix: &str) -> String {
        let date = Utc::now().format("%Y%m%d");
        let suffix: String = rand::thread_rng()
            .sample_iter(rand::distributions::Alphanumeric)
            .take(8)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect();
        format!("{}-{}-{}", prefix, date, suffix)
    }
}

#[async_trait]
impl SerialNumberGenerator for FallbackSerialGenerator {
    async fn next_serial(&self, _tenant_id: Uuid, prefix: &str) -> Result<String> {
        Ok(Self::generate(prefix))
    }
}

/// Rule-of-thumb scope derivation used when no external rules engine is
/// wired in: declared frameworks, plus mandatory local frameworks implied
/// by the regulator and data profile, plus an ISO 27001 baseline.
#[derive(Debug, Default)]
pub struct BaselineRulesEngine;

impl BaselineRulesEngine {
    pub const RULESET_ID: &'static str = "BASELINE-SCOPE-V1";
}

#[async_trait]
impl RulesEngine for BaselineRulesEngine {
    async fn derive_scope(
        &self,
        _tenant_id: Uuid,
        profile: &OrganizationProfile,
    ) -> Result<ScopeDerivation> {
        let mut codes: Vec<String> = Vec::new();
        let mut push = |code: &str| {
            if !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        };

        let regulator = profile.primary_regulator.to_uppercase();
        if regulator.contains("NCA") {
            push("NCA-ECC");
        }
        if regulator.contains("SAMA") {
            push("SAMA-CSF");
        }
        if profile.handles_pii || profile.cross_border_transfers {
            push("PDPL");
        }
        for declared in &profile.frameworks {
            push(declared);
        }
        push("ISO-27001");

        let log = serde_json::json!({
            "ruleset_id": Self::RULESET_ID,
            "inputs": {
                "primary_regulator": profile.primary_regulator,
                "handles_pii": profile.handles_pii,
                "cross_border_transfers": profile.cross_border_transfers,
                "declared_frameworks": profile.frameworks,
            },
            "derived_frameworks": codes,
        });

        Ok(ScopeDerivation {
            execution_id: Uuid::new_v4(),
            ruleset_id: Self::RULESET_ID.to_string(),
            framework_codes: codes,
            log,
        })
    }
}

/// Fixed role table, for tests and demos.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    roles: std::collections::HashMap<String, Vec<String>>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, actor: &str, roles: Vec<String>) {
        self.roles.insert(actor.to_string(), roles);
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn roles_for_actor(&self, _tenant_id: Uuid, actor: &str) -> Result<Vec<String>> {
        Ok(self.roles.get(actor).cloned().unwrap_or_default())
    }
}

/// Notification sender that only logs. Used in tests and demos.
#[derive(Debug, Default)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send(
        &self,
        tenant_id: Uuid,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<()> {
        tracing::info!(%tenant_id, recipient, subject, "notification sent (logging channel)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(regulator: &str, pii: bool) -> OrganizationProfile {
        OrganizationProfile {
            tenant_id: Uuid::new_v4(),
            legal_name: "Acme Holdings".to_string(),
            sector: "Banking".to_string(),
            country: "SA".to_string(),
            operating_countries: vec!["SA".to_string()],
            primary_regulator: regulator.to_string(),
            frameworks: vec![],
            handles_pii: pii,
            sensitive_data: false,
            cross_border_transfers: false,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_baseline_scope_for_sama_bank() {
        let engine = BaselineRulesEngine;
        let scope = engine
            .derive_scope(Uuid::new_v4(), &profile("SAMA", true))
            .await
            .unwrap();
        assert_eq!(scope.framework_codes, vec!["SAMA-CSF", "PDPL", "ISO-27001"]);
    }

    #[tokio::test]
    async fn test_baseline_scope_always_includes_iso() {
        let engine = BaselineRulesEngine;
        let scope = engine
            .derive_scope(Uuid::new_v4(), &profile("Ministry of Commerce", false))
            .await
            .unwrap();
        assert_eq!(scope.framework_codes, vec!["ISO-27001"]);
    }

    #[test]
    fn test_fallback_serial_shape() {
        let serial = FallbackSerialGenerator::generate("RPT");
        let parts: Vec<&str> = serial.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RPT");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
    }
}
