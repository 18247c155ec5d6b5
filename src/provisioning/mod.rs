//! Tenant provisioning pipeline.
//!
//! Two phases. Phase 1 (orchestrator) runs on the caller's request and
//! does only the critical path: profile sync, default workspace, teams
//! and RACI. Phase 2 (background) runs detached and is fault-isolated
//! per step: scope derivation, plan, assessments, auto-assignment,
//! audit events, report shells, workflow activation, invitations.

mod background;
mod defaults;
mod orchestrator;

pub use background::{run_background_provisioning, BackgroundContext};
pub use orchestrator::{CompletionOutcome, ProvisioningOrchestrator};
