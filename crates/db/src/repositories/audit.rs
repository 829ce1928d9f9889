use triago_core::audit::{AuditError, AuditRecord, AuditSink};

use crate::DbPool;

/// Durable audit trail writer. The audit_log table carries no foreign keys;
/// records must survive tenant deletion.
pub struct SqlAuditSink {
    pool: DbPool,
}

impl SqlAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditSink for SqlAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let before = record
            .before
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AuditError(e.to_string()))?;
        let after = record
            .after
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AuditError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_log (id, tenant_id, user_id, agent_slug, action, entity_type,
                                    entity_id, before_state, after_state, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.tenant_id.0)
        .bind(&record.user_id)
        .bind(&record.agent_slug)
        .bind(&record.action)
        .bind(&record.entity_type)
        .bind(&record.entity_id)
        .bind(&before)
        .bind(&after)
        .bind(record.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError(e.to_string()))?;

        Ok(())
    }
}
