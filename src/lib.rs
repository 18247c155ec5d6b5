//! grc-engine: the process core of a multi-tenant compliance platform.
//!
//! Four pieces work together:
//!
//! - [`workflow`]: a generic state machine over nine business-process
//!   kinds, with role-gated transitions, compare-and-set writes, and an
//!   audit trail.
//! - [`raci`]: RACI-matrix driven task auto-assignment.
//! - [`onboarding`] + [`provisioning`]: the 12-section wizard and the
//!   idempotent two-phase pipeline that turns a finished wizard into a
//!   provisioned tenant.
//! - [`policy`]: priority and duration heuristics with a write-once
//!   decision cache.
//!
//! Persistence and external services sit behind the traits in [`store`]
//! and [`collaborators`]; an in-memory store backs tests and demos, and
//! a Postgres workflow store ships behind the `database` feature.

pub mod collaborators;
pub mod error;
pub mod model;
pub mod onboarding;
pub mod policy;
pub mod provisioning;
pub mod raci;
pub mod store;
pub mod workflow;

pub use error::{EngineError, Result};
pub use model::{Priority, ProvisioningResult};
pub use onboarding::{OnboardingWizard, SectionPayload, WizardSection, WizardStatus};
pub use policy::{PolicyDecision, PolicyEvaluator};
pub use provisioning::{CompletionOutcome, ProvisioningOrchestrator};
pub use raci::{AssignmentEngine, RaciRole, ReviewKind};
pub use workflow::{InstanceManager, StateGraph, WorkflowInstance, WorkflowKind};
