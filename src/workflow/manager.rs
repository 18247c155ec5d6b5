//! Workflow instance manager.
//!
//! The only write path for workflow instances. Creation enforces the
//! one-active-instance rule for exclusive kinds; transitions validate
//! the edge, the actor's roles, and the expected state (compare-and-set
//! in the store) before anything is written.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::IdentityResolver;
use crate::error::{EngineError, Result};
use crate::model::{AuditEvent, AuditEventType};
use crate::store::EngineStore;
use crate::workflow::{StateGraph, TransitionRecord, WorkflowInstance, WorkflowKind, WorkflowTask};

pub struct InstanceManager {
    store: Arc<dyn EngineStore>,
    identity: Arc<dyn IdentityResolver>,
}

impl InstanceManager {
    pub fn new(store: Arc<dyn EngineStore>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { store, identity }
    }

    /// Start a workflow over a subject.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        kind: WorkflowKind,
        subject_type: &str,
        subject_id: Uuid,
        initiator: &str,
    ) -> Result<WorkflowInstance> {
        let instance = WorkflowInstance::new(tenant_id, kind, subject_type, subject_id, initiator);
        if kind.is_exclusive() {
            // The store decides vacancy and insert in one atomic step, so
            // two concurrent creates cannot both claim the subject.
            if !self.store.insert_instance_if_vacant(&instance).await? {
                warn!(%tenant_id, %kind, "rejected duplicate workflow for subject");
                return Err(EngineError::DuplicateActiveInstance {
                    kind,
                    subject_type: subject_type.to_string(),
                    subject_id,
                });
            }
        } else {
            self.store.insert_instance(&instance).await?;
        }
        self.store
            .record(AuditEvent::new(
                tenant_id,
                instance.id,
                AuditEventType::WorkflowStarted,
                serde_json::json!({
                    "kind": kind.as_str(),
                    "subject_type": subject_type,
                    "subject_id": subject_id,
                    "initial_state": instance.current_state,
                    "initiator": initiator,
                }),
            ))
            .await?;

        info!(%tenant_id, %kind, instance_id = %instance.id, "workflow started");
        Ok(instance)
    }

    /// Drive one action against an instance.
    pub async fn transition(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
        action: &str,
        actor: &str,
        note: Option<String>,
    ) -> Result<WorkflowInstance> {
        let instance = self
            .store
            .get_instance(tenant_id, instance_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "workflow instance",
                id: instance_id.to_string(),
            })?;

        let graph = StateGraph::for_kind(instance.kind);
        if graph.is_terminal(&instance.current_state) {
            return Err(EngineError::InvalidTransition {
                kind: instance.kind,
                state: instance.current_state,
                action: action.to_string(),
            });
        }

        let edge = graph
            .find_transition(&instance.current_state, action)
            .ok_or_else(|| EngineError::InvalidTransition {
                kind: instance.kind,
                state: instance.current_state.clone(),
                action: action.to_string(),
            })?;

        if !edge.required_roles.is_empty() {
            let roles = self.identity.roles_for_actor(tenant_id, actor).await?;
            let permitted = roles
                .iter()
                .any(|r| edge.required_roles.contains(&r.as_str()));
            if !permitted {
                warn!(%tenant_id, %instance_id, actor, action, "unauthorized transition attempt");
                return Err(EngineError::Unauthorized {
                    actor: actor.to_string(),
                    action: action.to_string(),
                });
            }
        }

        let record = TransitionRecord {
            from_state: instance.current_state.clone(),
            to_state: edge.to.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            occurred_at: Utc::now(),
            note,
        };

        // The store rejects this atomically if another writer moved the
        // instance between our read and this write.
        let updated = self
            .store
            .apply_transition(tenant_id, instance_id, &instance.current_state, record.clone())
            .await?;

        self.store
            .record(AuditEvent::new(
                tenant_id,
                instance_id,
                AuditEventType::WorkflowTransitioned,
                serde_json::json!({
                    "kind": instance.kind.as_str(),
                    "from_state": record.from_state,
                    "to_state": record.to_state,
                    "action": record.action,
                    "actor": record.actor,
                    "note": record.note,
                }),
            ))
            .await?;

        info!(
            %tenant_id,
            %instance_id,
            from = %record.from_state,
            to = %record.to_state,
            action,
            "workflow transitioned"
        );
        Ok(updated)
    }

    /// Open tasks on an instance.
    pub async fn pending_tasks(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowTask>> {
        Ok(self
            .store
            .tasks_for_instance(tenant_id, instance_id)
            .await?
            .into_iter()
            .filter(|t| t.status.is_open())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticIdentityResolver;
    use crate::store::{AuditSink, MemoryStore, WorkflowStore};

    fn manager_with_roles(roles: &[(&str, &[&str])]) -> (InstanceManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut identity = StaticIdentityResolver::new();
        for (actor, actor_roles) in roles {
            identity.grant(actor, actor_roles.iter().map(|r| r.to_string()).collect());
        }
        (
            InstanceManager::new(store.clone(), Arc::new(identity)),
            store,
        )
    }

    #[tokio::test]
    async fn test_approval_happy_path() {
        let (manager, _) = manager_with_roles(&[
            ("mia", &["MANAGER"]),
            ("omar", &["COMPLIANCE_OFFICER"]),
            ("zara", &["EXECUTIVE"]),
        ]);
        let tenant = Uuid::new_v4();
        let instance = manager
            .create(tenant, WorkflowKind::Approval, "document", Uuid::new_v4(), "mia")
            .await
            .unwrap();

        let i = manager
            .transition(tenant, instance.id, "manager_approve", "mia", None)
            .await
            .unwrap();
        assert_eq!(i.current_state, "ManagerApproved");

        let i = manager
            .transition(tenant, instance.id, "compliance_approve", "omar", None)
            .await
            .unwrap();
        assert_eq!(i.current_state, "ComplianceApproved");

        let i = manager
            .transition(tenant, instance.id, "executive_approve", "zara", None)
            .await
            .unwrap();
        assert_eq!(i.current_state, "ExecutiveApproved");
        assert!(i.is_terminal());
        assert_eq!(i.history.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_action_is_invalid_transition() {
        let (manager, _) = manager_with_roles(&[("mia", &["MANAGER"])]);
        let tenant = Uuid::new_v4();
        let instance = manager
            .create(tenant, WorkflowKind::Approval, "document", Uuid::new_v4(), "mia")
            .await
            .unwrap();

        let err = manager
            .transition(tenant, instance.id, "executive_approve", "mia", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_missing_role_is_unauthorized() {
        let (manager, _) = manager_with_roles(&[("intern", &["REVIEWER"])]);
        let tenant = Uuid::new_v4();
        let instance = manager
            .create(tenant, WorkflowKind::Approval, "document", Uuid::new_v4(), "intern")
            .await
            .unwrap();

        let err = manager
            .transition(tenant, instance.id, "manager_approve", "intern", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_terminal_state_rejects_everything() {
        let (manager, _) = manager_with_roles(&[("risk", &["RISK_MANAGER"])]);
        let tenant = Uuid::new_v4();
        let instance = manager
            .create(
                tenant,
                WorkflowKind::ExceptionHandling,
                "exception",
                Uuid::new_v4(),
                "risk",
            )
            .await
            .unwrap();

        manager
            .transition(tenant, instance.id, "approve", "risk", None)
            .await
            .unwrap();
        let err = manager
            .transition(tenant, instance.id, "reject_with_explanation", "risk", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_exclusive_kind_rejects_duplicate() {
        let (manager, _) = manager_with_roles(&[]);
        let tenant = Uuid::new_v4();
        let subject = Uuid::new_v4();
        manager
            .create(tenant, WorkflowKind::EvidenceCollection, "evidence", subject, "sys")
            .await
            .unwrap();

        let err = manager
            .create(tenant, WorkflowKind::EvidenceCollection, "evidence", subject, "sys")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateActiveInstance { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_exclusive_creates_yield_one_instance() {
        let (manager, _) = manager_with_roles(&[]);
        let tenant = Uuid::new_v4();
        let subject = Uuid::new_v4();

        let (a, b) = tokio::join!(
            manager.create(tenant, WorkflowKind::Approval, "document", subject, "sys"),
            manager.create(tenant, WorkflowKind::Approval, "document", subject, "sys"),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(
            loser.unwrap_err(),
            EngineError::DuplicateActiveInstance { .. }
        ));
    }

    #[tokio::test]
    async fn test_transition_audit_carries_note() {
        let (manager, store) = manager_with_roles(&[("mia", &["MANAGER"])]);
        let tenant = Uuid::new_v4();
        let instance = manager
            .create(tenant, WorkflowKind::Approval, "document", Uuid::new_v4(), "mia")
            .await
            .unwrap();

        manager
            .transition(
                tenant,
                instance.id,
                "reject",
                "mia",
                Some("missing budget sign-off".to_string()),
            )
            .await
            .unwrap();

        let events = store.events_for_tenant(tenant).await.unwrap();
        let event = events
            .iter()
            .find(|e| e.event_type == AuditEventType::WorkflowTransitioned)
            .unwrap();
        assert_eq!(event.payload["note"], "missing budget sign-off");
    }

    #[tokio::test]
    async fn test_new_instance_allowed_after_terminal() {
        let (manager, _) = manager_with_roles(&[("rev", &["REVIEWER"])]);
        let tenant = Uuid::new_v4();
        let subject = Uuid::new_v4();
        let first = manager
            .create(tenant, WorkflowKind::EvidenceCollection, "evidence", subject, "sys")
            .await
            .unwrap();
        manager
            .transition(tenant, first.id, "submit", "anyone", None)
            .await
            .unwrap();
        manager
            .transition(tenant, first.id, "approve", "rev", None)
            .await
            .unwrap();

        // The first instance is terminal, so the subject is free again.
        manager
            .create(tenant, WorkflowKind::EvidenceCollection, "evidence", subject, "sys")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_transitions_resolve_to_one_winner() {
        let (manager, store) = manager_with_roles(&[("mia", &["MANAGER"])]);
        let tenant = Uuid::new_v4();
        let instance = manager
            .create(tenant, WorkflowKind::Approval, "document", Uuid::new_v4(), "mia")
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            manager.transition(tenant, instance.id, "manager_approve", "mia", None),
            manager.transition(tenant, instance.id, "reject", "mia", None),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let stored = store.get_instance(tenant, instance.id).await.unwrap().unwrap();
        assert_eq!(stored.history.len(), 1);
    }
}
