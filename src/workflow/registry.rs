//! Workflow definition registry.
//!
//! One static state graph per workflow kind. Graphs are data, not logic:
//! states, an initial state, terminal states, and edges. Each edge names
//! the action that drives it and the roles allowed to perform it (an
//! empty role list means any authenticated actor may act).
//!
//! Graphs never change at runtime, so the registry hands out `'static`
//! references and the instance manager does pure lookups.

use crate::workflow::WorkflowKind;

/// Role codes referenced by transition rules.
pub mod roles {
    pub const CONTROL_OWNER: &str = "CONTROL_OWNER";
    pub const MANAGER: &str = "MANAGER";
    pub const COMPLIANCE_OFFICER: &str = "COMPLIANCE_OFFICER";
    pub const EXECUTIVE: &str = "EXECUTIVE";
    pub const AUDITOR: &str = "AUDITOR";
    pub const RISK_MANAGER: &str = "RISK_MANAGER";
    pub const POLICY_OWNER: &str = "POLICY_OWNER";
    pub const REVIEWER: &str = "REVIEWER";
}

use roles::*;

/// A single edge in a state graph.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: &'static str,
    pub action: &'static str,
    pub to: &'static str,
    /// Roles allowed to drive this edge. Empty means unrestricted.
    pub required_roles: &'static [&'static str],
}

/// The complete state graph for one workflow kind.
#[derive(Debug)]
pub struct StateGraph {
    pub kind: WorkflowKind,
    pub initial: &'static str,
    pub states: &'static [&'static str],
    pub terminal: &'static [&'static str],
    pub transitions: &'static [TransitionRule],
}

impl StateGraph {
    /// Look up the graph governing a kind.
    pub fn for_kind(kind: WorkflowKind) -> &'static StateGraph {
        match kind {
            WorkflowKind::ControlImplementation => &CONTROL_IMPLEMENTATION,
            WorkflowKind::Approval => &APPROVAL,
            WorkflowKind::EvidenceCollection => &EVIDENCE_COLLECTION,
            WorkflowKind::ComplianceTesting => &COMPLIANCE_TESTING,
            WorkflowKind::Remediation => &REMEDIATION,
            WorkflowKind::PolicyReview => &POLICY_REVIEW,
            WorkflowKind::TrainingAssignment => &TRAINING_ASSIGNMENT,
            WorkflowKind::Audit => &AUDIT,
            WorkflowKind::ExceptionHandling => &EXCEPTION_HANDLING,
        }
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.contains(&state)
    }

    pub fn is_terminal(&self, state: &str) -> bool {
        self.terminal.contains(&state)
    }

    /// All edges leaving a state.
    pub fn transitions_from(&self, state: &str) -> impl Iterator<Item = &TransitionRule> {
        let state = state.to_string();
        self.transitions.iter().filter(move |t| t.from == state)
    }

    /// The edge driven by `action` from `from`, if any.
    pub fn find_transition(&self, from: &str, action: &str) -> Option<&TransitionRule> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.action == action)
    }
}

const fn rule(
    from: &'static str,
    action: &'static str,
    to: &'static str,
    required_roles: &'static [&'static str],
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        to,
        required_roles,
    }
}

static CONTROL_IMPLEMENTATION: StateGraph = StateGraph {
    kind: WorkflowKind::ControlImplementation,
    initial: "Initiated",
    states: &[
        "Initiated",
        "InPlanning",
        "InImplementation",
        "UnderReview",
        "Approved",
        "Deployed",
    ],
    terminal: &["Deployed"],
    transitions: &[
        rule("Initiated", "begin_planning", "InPlanning", &[CONTROL_OWNER]),
        rule(
            "InPlanning",
            "begin_implementation",
            "InImplementation",
            &[CONTROL_OWNER],
        ),
        rule(
            "InImplementation",
            "submit_for_review",
            "UnderReview",
            &[CONTROL_OWNER],
        ),
        rule("UnderReview", "approve", "Approved", &[COMPLIANCE_OFFICER]),
        rule("Approved", "deploy", "Deployed", &[CONTROL_OWNER]),
    ],
};

static APPROVAL: StateGraph = StateGraph {
    kind: WorkflowKind::Approval,
    initial: "Submitted",
    states: &[
        "Submitted",
        "ManagerApproved",
        "ComplianceApproved",
        "ExecutiveApproved",
        "Rejected",
    ],
    terminal: &["ExecutiveApproved", "Rejected"],
    transitions: &[
        rule("Submitted", "manager_approve", "ManagerApproved", &[MANAGER]),
        rule("Submitted", "reject", "Rejected", &[MANAGER]),
        rule(
            "ManagerApproved",
            "compliance_approve",
            "ComplianceApproved",
            &[COMPLIANCE_OFFICER],
        ),
        rule(
            "ManagerApproved",
            "reject",
            "Rejected",
            &[COMPLIANCE_OFFICER],
        ),
        rule(
            "ComplianceApproved",
            "executive_approve",
            "ExecutiveApproved",
            &[EXECUTIVE],
        ),
        rule("ComplianceApproved", "reject", "Rejected", &[EXECUTIVE]),
        rule(
            "ComplianceApproved",
            "request_revision",
            "Submitted",
            &[EXECUTIVE],
        ),
    ],
};

static EVIDENCE_COLLECTION: StateGraph = StateGraph {
    kind: WorkflowKind::EvidenceCollection,
    initial: "Initiated",
    states: &["Initiated", "Submitted", "Approved"],
    terminal: &["Approved"],
    transitions: &[
        rule("Initiated", "submit", "Submitted", &[]),
        rule("Submitted", "approve", "Approved", &[REVIEWER]),
        rule("Submitted", "return_for_changes", "Initiated", &[REVIEWER]),
    ],
};

static COMPLIANCE_TESTING: StateGraph = StateGraph {
    kind: WorkflowKind::ComplianceTesting,
    initial: "TestPlanCreated",
    states: &[
        "TestPlanCreated",
        "TestsInProgress",
        "TestsCompleted",
        "ResultsReview",
        "Compliant",
        "NonCompliance",
        "Remediation",
        "Verified",
    ],
    terminal: &["Compliant", "Verified"],
    transitions: &[
        rule("TestPlanCreated", "begin_testing", "TestsInProgress", &[AUDITOR]),
        rule("TestsInProgress", "complete_tests", "TestsCompleted", &[AUDITOR]),
        rule(
            "TestsCompleted",
            "begin_review",
            "ResultsReview",
            &[COMPLIANCE_OFFICER],
        ),
        rule(
            "ResultsReview",
            "mark_compliant",
            "Compliant",
            &[COMPLIANCE_OFFICER],
        ),
        rule(
            "ResultsReview",
            "flag_noncompliance",
            "NonCompliance",
            &[COMPLIANCE_OFFICER],
        ),
        rule(
            "NonCompliance",
            "begin_remediation",
            "Remediation",
            &[CONTROL_OWNER],
        ),
        rule("Remediation", "verify", "Verified", &[COMPLIANCE_OFFICER]),
    ],
};

static REMEDIATION: StateGraph = StateGraph {
    kind: WorkflowKind::Remediation,
    initial: "Identified",
    states: &[
        "Identified",
        "PlanningPhase",
        "RemediationInProgress",
        "UnderVerification",
        "Verified",
        "Closed",
    ],
    terminal: &["Closed"],
    transitions: &[
        rule("Identified", "plan", "PlanningPhase", &[RISK_MANAGER]),
        rule(
            "PlanningPhase",
            "begin_remediation",
            "RemediationInProgress",
            &[CONTROL_OWNER],
        ),
        rule(
            "RemediationInProgress",
            "submit_for_verification",
            "UnderVerification",
            &[CONTROL_OWNER],
        ),
        rule(
            "UnderVerification",
            "verify",
            "Verified",
            &[COMPLIANCE_OFFICER],
        ),
        rule("Verified", "close", "Closed", &[RISK_MANAGER]),
    ],
};

static POLICY_REVIEW: StateGraph = StateGraph {
    kind: WorkflowKind::PolicyReview,
    initial: "ScheduledForReview",
    states: &[
        "ScheduledForReview",
        "InReview",
        "RequestedRevisions",
        "UnderApproval",
        "Approved",
        "Published",
        "InEffect",
        "Obsolete",
    ],
    terminal: &["Obsolete"],
    transitions: &[
        rule("ScheduledForReview", "begin_review", "InReview", &[POLICY_OWNER]),
        rule(
            "InReview",
            "request_revisions",
            "RequestedRevisions",
            &[COMPLIANCE_OFFICER],
        ),
        rule(
            "RequestedRevisions",
            "resume_review",
            "InReview",
            &[POLICY_OWNER],
        ),
        rule(
            "InReview",
            "submit_for_approval",
            "UnderApproval",
            &[POLICY_OWNER],
        ),
        rule("UnderApproval", "approve", "Approved", &[COMPLIANCE_OFFICER]),
        rule("Approved", "publish", "Published", &[POLICY_OWNER]),
        rule("Published", "activate", "InEffect", &[]),
        rule("InEffect", "retire", "Obsolete", &[POLICY_OWNER]),
    ],
};

static TRAINING_ASSIGNMENT: StateGraph = StateGraph {
    kind: WorkflowKind::TrainingAssignment,
    initial: "Assigned",
    states: &[
        "Assigned",
        "Acknowledged",
        "InProgress",
        "Completed",
        "Passed",
        "Failed",
    ],
    terminal: &["Passed"],
    transitions: &[
        rule("Assigned", "acknowledge", "Acknowledged", &[]),
        rule("Acknowledged", "start", "InProgress", &[]),
        rule("InProgress", "complete", "Completed", &[]),
        rule("Completed", "pass", "Passed", &[MANAGER]),
        rule("Completed", "fail", "Failed", &[MANAGER]),
        rule("Failed", "reassign", "Assigned", &[MANAGER]),
    ],
};

static AUDIT: StateGraph = StateGraph {
    kind: WorkflowKind::Audit,
    initial: "Initiated",
    states: &[
        "Initiated",
        "PlanningPhase",
        "FieldworkInProgress",
        "DraftReportIssued",
        "AwaitingManagementResponse",
        "FinalReportIssued",
        "Closed",
    ],
    terminal: &["Closed"],
    transitions: &[
        rule("Initiated", "begin_planning", "PlanningPhase", &[AUDITOR]),
        rule(
            "PlanningPhase",
            "begin_fieldwork",
            "FieldworkInProgress",
            &[AUDITOR],
        ),
        rule(
            "FieldworkInProgress",
            "issue_draft_report",
            "DraftReportIssued",
            &[AUDITOR],
        ),
        rule(
            "DraftReportIssued",
            "request_management_response",
            "AwaitingManagementResponse",
            &[AUDITOR],
        ),
        rule(
            "AwaitingManagementResponse",
            "issue_final_report",
            "FinalReportIssued",
            &[AUDITOR],
        ),
        rule("FinalReportIssued", "close", "Closed", &[AUDITOR]),
    ],
};

static EXCEPTION_HANDLING: StateGraph = StateGraph {
    kind: WorkflowKind::ExceptionHandling,
    initial: "Submitted",
    states: &["Submitted", "Approved", "RejectedWithExplanation"],
    terminal: &["Approved", "RejectedWithExplanation"],
    transitions: &[
        rule("Submitted", "approve", "Approved", &[RISK_MANAGER]),
        rule(
            "Submitted",
            "reject_with_explanation",
            "RejectedWithExplanation",
            &[RISK_MANAGER],
        ),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_graph() {
        for kind in WorkflowKind::ALL {
            let graph = StateGraph::for_kind(kind);
            assert_eq!(graph.kind, kind);
            assert!(graph.has_state(graph.initial));
            assert!(!graph.terminal.is_empty());
        }
    }

    #[test]
    fn test_edges_reference_declared_states() {
        for kind in WorkflowKind::ALL {
            let graph = StateGraph::for_kind(kind);
            for t in graph.transitions {
                assert!(graph.has_state(t.from), "{kind}: undeclared from {}", t.from);
                assert!(graph.has_state(t.to), "{kind}: undeclared to {}", t.to);
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for kind in WorkflowKind::ALL {
            let graph = StateGraph::for_kind(kind);
            for terminal in graph.terminal {
                assert_eq!(
                    graph.transitions_from(terminal).count(),
                    0,
                    "{kind}: terminal state {terminal} has outgoing edges"
                );
            }
        }
    }

    #[test]
    fn test_approval_reject_edges() {
        let graph = StateGraph::for_kind(WorkflowKind::Approval);
        for state in ["Submitted", "ManagerApproved", "ComplianceApproved"] {
            let edge = graph.find_transition(state, "reject").unwrap();
            assert_eq!(edge.to, "Rejected");
        }
        // Revision loops back to the start of the chain.
        let revision = graph
            .find_transition("ComplianceApproved", "request_revision")
            .unwrap();
        assert_eq!(revision.to, "Submitted");
    }

    #[test]
    fn test_evidence_return_edge() {
        let graph = StateGraph::for_kind(WorkflowKind::EvidenceCollection);
        let edge = graph.find_transition("Submitted", "return_for_changes").unwrap();
        assert_eq!(edge.to, "Initiated");
    }

    #[test]
    fn test_unknown_action_has_no_edge() {
        let graph = StateGraph::for_kind(WorkflowKind::Audit);
        assert!(graph.find_transition("Initiated", "close").is_none());
        assert!(graph.find_transition("Nowhere", "begin_planning").is_none());
    }
}
