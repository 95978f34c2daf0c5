// SQLite JobStore Implementation

use async_trait::async_trait;
use batchflow_core::domain::{BindingState, PoolKind, ScheduleBinding, TriggerSpec, Workflow};
use batchflow_core::error::{AppError, Result};
use batchflow_core::port::JobStore;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::connection::map_sqlx_error;

/// Durable store backed by SQLite
///
/// Trigger specs and workflow definitions are kept as JSON columns.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn put(&self, binding: &ScheduleBinding) -> Result<()> {
        let trigger_spec = serde_json::to_string(&binding.trigger_spec)?;

        sqlx::query(
            r#"
            INSERT INTO schedule_bindings (
                id, workflow_id, trigger_spec, state, pool, anchor_at, next_fire_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                workflow_id = excluded.workflow_id,
                trigger_spec = excluded.trigger_spec,
                state = excluded.state,
                pool = excluded.pool,
                anchor_at = excluded.anchor_at,
                next_fire_time = excluded.next_fire_time
            "#,
        )
        .bind(&binding.id)
        .bind(&binding.workflow_id)
        .bind(&trigger_spec)
        .bind(binding.state.to_string())
        .bind(binding.pool.to_string())
        .bind(binding.anchor_at)
        .bind(binding.next_fire_time)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job_id = %binding.id, state = %binding.state, "Binding stored");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduleBinding>> {
        let row =
            sqlx::query_as::<_, BindingRow>("SELECT * FROM schedule_bindings WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.map(BindingRow::into_binding).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM schedule_bindings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<ScheduleBinding>> {
        let rows =
            sqlx::query_as::<_, BindingRow>("SELECT * FROM schedule_bindings ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter().map(BindingRow::into_binding).collect()
    }

    async fn update_state(
        &self,
        id: &str,
        state: BindingState,
        next_fire_time: Option<i64>,
    ) -> Result<()> {
        // Optimization: Update only state and next_fire_time (reduces WAL writes)
        let result = sqlx::query(
            r#"
            UPDATE schedule_bindings
            SET state = ?, next_fire_time = ?
            WHERE id = ?
            "#,
        )
        .bind(state.to_string())
        .bind(next_fire_time)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::JobNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn put_workflow(&self, workflow: &Workflow) -> Result<()> {
        let definition = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, definition) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET definition = excluded.definition
            "#,
        )
        .bind(&workflow.id)
        .bind(&definition)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let definition: Option<String> =
            sqlx::query_scalar("SELECT definition FROM workflows WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        match definition {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BindingRow {
    id: String,
    workflow_id: String,
    trigger_spec: String,
    state: String,
    pool: String,
    anchor_at: i64,
    next_fire_time: Option<i64>,
}

impl BindingRow {
    fn into_binding(self) -> Result<ScheduleBinding> {
        let trigger_spec: TriggerSpec = serde_json::from_str(&self.trigger_spec)?;
        let state: BindingState = self.state.parse()?;
        let pool = self.pool.parse::<PoolKind>().unwrap_or_else(|e| {
            warn!(job_id = %self.id, error = %e, "Unknown pool kind, using default");
            PoolKind::default()
        });

        Ok(ScheduleBinding {
            id: self.id,
            workflow_id: self.workflow_id,
            trigger_spec,
            state,
            pool,
            anchor_at: self.anchor_at,
            next_fire_time: self.next_fire_time,
        })
    }
}
