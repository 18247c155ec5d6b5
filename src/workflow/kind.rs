//! Workflow kinds.
//!
//! Every business process the platform runs is one of these kinds. Each
//! kind has a fixed state graph in the registry; the kind tag on an
//! instance selects which graph governs its transitions.

use serde::{Deserialize, Serialize};

/// The business-process families supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    ControlImplementation,
    Approval,
    EvidenceCollection,
    ComplianceTesting,
    Remediation,
    PolicyReview,
    TrainingAssignment,
    Audit,
    ExceptionHandling,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 9] = [
        Self::ControlImplementation,
        Self::Approval,
        Self::EvidenceCollection,
        Self::ComplianceTesting,
        Self::Remediation,
        Self::PolicyReview,
        Self::TrainingAssignment,
        Self::Audit,
        Self::ExceptionHandling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlImplementation => "control_implementation",
            Self::Approval => "approval",
            Self::EvidenceCollection => "evidence_collection",
            Self::ComplianceTesting => "compliance_testing",
            Self::Remediation => "remediation",
            Self::PolicyReview => "policy_review",
            Self::TrainingAssignment => "training_assignment",
            Self::Audit => "audit",
            Self::ExceptionHandling => "exception_handling",
        }
    }

    /// Exclusive kinds allow at most one active instance per subject.
    /// Running two approval chains over the same document, or two
    /// implementation efforts over the same control, is never valid.
    pub fn is_exclusive(&self) -> bool {
        matches!(
            self,
            Self::ControlImplementation
                | Self::Approval
                | Self::EvidenceCollection
                | Self::ExceptionHandling
        )
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "control_implementation" => Ok(Self::ControlImplementation),
            "approval" => Ok(Self::Approval),
            "evidence_collection" => Ok(Self::EvidenceCollection),
            "compliance_testing" => Ok(Self::ComplianceTesting),
            "remediation" => Ok(Self::Remediation),
            "policy_review" => Ok(Self::PolicyReview),
            "training_assignment" => Ok(Self::TrainingAssignment),
            "audit" => Ok(Self::Audit),
            "exception_handling" => Ok(Self::ExceptionHandling),
            _ => Err(format!("Unknown workflow kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in WorkflowKind::ALL {
            let parsed: WorkflowKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_exclusive_kinds() {
        assert!(WorkflowKind::Approval.is_exclusive());
        assert!(WorkflowKind::EvidenceCollection.is_exclusive());
        assert!(!WorkflowKind::Audit.is_exclusive());
        assert!(!WorkflowKind::ComplianceTesting.is_exclusive());
    }
}
