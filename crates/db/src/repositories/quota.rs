use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use triago_core::domain::tenant::{TenantId, TenantQuotaState, UsageRecord};

use super::{QuotaRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuotaRepository {
    pool: DbPool,
}

impl SqlQuotaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuotaRepository for SqlQuotaRepository {
    async fn quota_state(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantQuotaState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tokens_used, tokens_reserved, extra_balance
             FROM tenant_quota WHERE tenant_id = ?",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TenantQuotaState {
            tokens_used: row
                .try_get("tokens_used")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            tokens_reserved: row
                .try_get("tokens_reserved")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            extra_balance: row
                .try_get("extra_balance")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        }))
    }

    async fn reserve(&self, tenant_id: &TenantId, estimate: i64) -> Result<bool, RepositoryError> {
        // The WHERE clauses are the admission check; the whole thing is one
        // statement so two concurrent requests cannot both pass it. The
        // SELECT arm seeds the counter row for a tenant that has never
        // consumed anything, still gated by its plan limit.
        let outcome = sqlx::query(
            "INSERT INTO tenant_quota
                 (tenant_id, tokens_used, tokens_reserved, extra_balance, updated_at)
             SELECT id, 0, ?1, 0, ?3 FROM tenant
                 WHERE id = ?2 AND ?1 <= monthly_token_limit
             ON CONFLICT(tenant_id) DO UPDATE
             SET tokens_reserved = tokens_reserved + ?1,
                 updated_at = ?3
             WHERE tokens_used + tokens_reserved + ?1
                   <= (SELECT monthly_token_limit FROM tenant WHERE id = ?2) + extra_balance",
        )
        .bind(estimate)
        .bind(&tenant_id.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn commit_usage(
        &self,
        record: &UsageRecord,
        reserved: i64,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Floor the release at zero: a drifted counter must not go negative.
        sqlx::query(
            "UPDATE tenant_quota
             SET tokens_used = tokens_used + ?1,
                 tokens_reserved = CASE
                     WHEN tokens_reserved >= ?2 THEN tokens_reserved - ?2
                     ELSE 0
                 END,
                 updated_at = ?3
             WHERE tenant_id = ?4",
        )
        .bind(record.total_tokens)
        .bind(reserved)
        .bind(&now)
        .bind(&record.tenant_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO usage_log (id, tenant_id, user_id, conversation_id, model,
                                    prompt_tokens, completion_tokens, total_tokens,
                                    purpose, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.tenant_id.0)
        .bind(&record.user_id)
        .bind(record.conversation_id.as_ref().map(|id| id.0.clone()))
        .bind(&record.model)
        .bind(record.prompt_tokens)
        .bind(record.completion_tokens)
        .bind(record.total_tokens)
        .bind(&record.purpose)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, tenant_id: &TenantId, estimate: i64) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE tenant_quota
             SET tokens_reserved = CASE
                     WHEN tokens_reserved >= ?1 THEN tokens_reserved - ?1
                     ELSE 0
                 END,
                 updated_at = ?2
             WHERE tenant_id = ?3",
        )
        .bind(estimate)
        .bind(Utc::now().to_rfc3339())
        .bind(&tenant_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
