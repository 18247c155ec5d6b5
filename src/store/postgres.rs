//! Postgres-backed workflow store.
//!
//! Covers the workflow concern only; the remaining stores stay behind
//! whatever persistence the host application provides. The transition
//! update carries its expected-state predicate in the WHERE clause, so
//! the compare-and-set decision happens in the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::workflow::{TransitionRecord, WorkflowInstance, WorkflowKind, WorkflowTask};

use super::WorkflowStore;

pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, tenant_id: Uuid, instance_id: Uuid) -> Result<Option<WorkflowInstance>> {
        let row = sqlx::query_as::<_, InstanceRow>(
            r#"
            SELECT id, tenant_id, kind, subject_type, subject_id, current_state,
                   initiated_by, started_at, updated_at, variables, history
            FROM grc.workflow_instances
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowInstance::try_from).transpose()
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO grc.workflow_instances
            (id, tenant_id, kind, subject_type, subject_id, current_state,
             initiated_by, started_at, updated_at, variables, history)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(instance.id)
        .bind(instance.tenant_id)
        .bind(instance.kind.as_str())
        .bind(&instance.subject_type)
        .bind(instance.subject_id)
        .bind(&instance.current_state)
        .bind(&instance.initiated_by)
        .bind(instance.started_at)
        .bind(instance.updated_at)
        .bind(serde_json::to_value(&instance.variables)?)
        .bind(serde_json::to_value(&instance.history)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_instance_if_vacant(&self, instance: &WorkflowInstance) -> Result<bool> {
        // The guarded insert decides vacancy in the database; the schema
        // additionally carries a partial unique index over active
        // instances of exclusive kinds.
        let result = sqlx::query(
            r#"
            INSERT INTO grc.workflow_instances
            (id, tenant_id, kind, subject_type, subject_id, current_state,
             initiated_by, started_at, updated_at, variables, history)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
            WHERE NOT EXISTS (
                SELECT 1 FROM grc.workflow_instances
                WHERE tenant_id = $2 AND kind = $3
                  AND subject_type = $4 AND subject_id = $5
                  AND terminal = FALSE
            )
            "#,
        )
        .bind(instance.id)
        .bind(instance.tenant_id)
        .bind(instance.kind.as_str())
        .bind(&instance.subject_type)
        .bind(instance.subject_id)
        .bind(&instance.current_state)
        .bind(&instance.initiated_by)
        .bind(instance.started_at)
        .bind(instance.updated_at)
        .bind(serde_json::to_value(&instance.variables)?)
        .bind(serde_json::to_value(&instance.history)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_instance(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
    ) -> Result<Option<WorkflowInstance>> {
        self.load(tenant_id, instance_id).await
    }

    async fn find_active_instance(
        &self,
        tenant_id: Uuid,
        kind: WorkflowKind,
        subject_type: &str,
        subject_id: Uuid,
    ) -> Result<Option<WorkflowInstance>> {
        let row = sqlx::query_as::<_, InstanceRow>(
            r#"
            SELECT id, tenant_id, kind, subject_type, subject_id, current_state,
                   initiated_by, started_at, updated_at, variables, history
            FROM grc.workflow_instances
            WHERE tenant_id = $1 AND kind = $2
              AND subject_type = $3 AND subject_id = $4
              AND terminal = FALSE
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(kind.as_str())
        .bind(subject_type)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowInstance::try_from).transpose()
    }

    async fn apply_transition(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
        expected_state: &str,
        record: TransitionRecord,
    ) -> Result<WorkflowInstance> {
        let terminal = {
            let instance = self
                .load(tenant_id, instance_id)
                .await?
                .ok_or(EngineError::NotFound {
                    entity: "workflow instance",
                    id: instance_id.to_string(),
                })?;
            crate::workflow::StateGraph::for_kind(instance.kind).is_terminal(&record.to_state)
        };

        let result = sqlx::query(
            r#"
            UPDATE grc.workflow_instances
            SET current_state = $4,
                updated_at = $5,
                terminal = $6,
                history = history || $7::jsonb
            WHERE tenant_id = $1 AND id = $2 AND current_state = $3
            "#,
        )
        .bind(tenant_id)
        .bind(instance_id)
        .bind(expected_state)
        .bind(&record.to_state)
        .bind(record.occurred_at)
        .bind(terminal)
        .bind(serde_json::to_value(vec![&record])?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual = self
                .load(tenant_id, instance_id)
                .await?
                .map(|i| i.current_state)
                .unwrap_or_else(|| "<missing>".to_string());
            return Err(EngineError::StateConflict {
                expected: expected_state.to_string(),
                actual,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO grc.workflow_audit_log
            (instance_id, tenant_id, from_state, to_state, action, actor, note, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(instance_id)
        .bind(tenant_id)
        .bind(&record.from_state)
        .bind(&record.to_state)
        .bind(&record.action)
        .bind(&record.actor)
        .bind(&record.note)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await?;

        self.load(tenant_id, instance_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "workflow instance",
                id: instance_id.to_string(),
            })
    }

    async fn insert_task(&self, task: &WorkflowTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO grc.workflow_tasks
            (id, tenant_id, instance_id, name, description, status, priority,
             assignee, assigned_team, due_date, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.id)
        .bind(task.tenant_id)
        .bind(task.instance_id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority as i16)
        .bind(task.assignee)
        .bind(&task.assigned_team)
        .bind(task.due_date)
        .bind(serde_json::to_value(&task.metadata)?)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tasks_for_instance(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, tenant_id, instance_id, name, description, status, priority,
                   assignee, assigned_team, due_date, metadata, created_at
            FROM grc.workflow_tasks
            WHERE tenant_id = $1 AND instance_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowTask::try_from).collect()
    }

    async fn find_task_for_requirement(
        &self,
        tenant_id: Uuid,
        instance_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<WorkflowTask>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, tenant_id, instance_id, name, description, status, priority,
                   assignee, assigned_team, due_date, metadata, created_at
            FROM grc.workflow_tasks
            WHERE tenant_id = $1 AND instance_id = $2
              AND metadata->>'requirement_id' = $3
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(instance_id)
        .bind(requirement_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowTask::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    tenant_id: Uuid,
    kind: String,
    subject_type: String,
    subject_id: Uuid,
    current_state: String,
    initiated_by: String,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    variables: serde_json::Value,
    history: serde_json::Value,
}

impl TryFrom<InstanceRow> for WorkflowInstance {
    type Error = EngineError;

    fn try_from(row: InstanceRow) -> Result<Self> {
        let kind: WorkflowKind = row.kind.parse().map_err(EngineError::Store)?;
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            kind,
            subject_type: row.subject_type,
            subject_id: row.subject_id,
            current_state: row.current_state,
            initiated_by: row.initiated_by,
            started_at: row.started_at,
            updated_at: row.updated_at,
            variables: serde_json::from_value(row.variables).unwrap_or_default(),
            history: serde_json::from_value(row.history).unwrap_or_default(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    tenant_id: Uuid,
    instance_id: Uuid,
    name: String,
    description: String,
    status: String,
    priority: i16,
    assignee: Option<Uuid>,
    assigned_team: Option<String>,
    due_date: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for WorkflowTask {
    type Error = EngineError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let status = serde_json::from_value(serde_json::Value::String(row.status))?;
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            instance_id: row.instance_id,
            name: row.name,
            description: row.description,
            status,
            priority: row.priority as u8,
            assignee: row.assignee,
            assigned_team: row.assigned_team,
            due_date: row.due_date,
            metadata: serde_json::from_value(row.metadata).unwrap_or_default(),
            created_at: row.created_at,
        })
    }
}
