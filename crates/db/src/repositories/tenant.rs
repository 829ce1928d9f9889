use sqlx::Row;

use triago_core::domain::personality::Personality;
use triago_core::domain::tenant::{
    PlanLimits, TenantContext, TenantId, TenantQuotaState, TenantStatus,
};

use super::{RepositoryError, TenantReader};
use crate::DbPool;

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: &str) -> TenantStatus {
    match raw {
        "suspended" => TenantStatus::Suspended,
        "cancelled" => TenantStatus::Cancelled,
        _ => TenantStatus::Active,
    }
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Stored personality that no longer validates falls back to the default
/// voice rather than failing the whole request.
fn parse_personality(raw: Option<&str>) -> Personality {
    raw.and_then(|json| serde_json::from_str::<Personality>(json).ok())
        .filter(|personality| personality.validate().is_ok())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl TenantReader for SqlTenantRepository {
    async fn tenant_context(
        &self,
        tenant_id: &TenantId,
        is_test_mode: bool,
    ) -> Result<Option<TenantContext>, RepositoryError> {
        if is_test_mode {
            tracing::debug!(
                event_name = "tenant.test_mode_lookup",
                tenant_id = %tenant_id.0,
                "resolving tenant for test-mode traffic"
            );
        }

        let row = sqlx::query(
            "SELECT t.id, t.status, t.monthly_token_limit, t.max_active_agents, t.features,
                    t.enabled_agents, t.enabled_integrations, t.personality,
                    IFNULL(q.tokens_used, 0) AS tokens_used,
                    IFNULL(q.tokens_reserved, 0) AS tokens_reserved,
                    IFNULL(q.extra_balance, 0) AS extra_balance
             FROM tenant t
             LEFT JOIN tenant_quota q ON q.tenant_id = t.id
             WHERE t.id = ?",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String =
            row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let monthly_token_limit: i64 = row
            .try_get("monthly_token_limit")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let max_active_agents: i64 = row
            .try_get("max_active_agents")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let features: String =
            row.try_get("features").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let enabled_agents: String =
            row.try_get("enabled_agents").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let enabled_integrations: String = row
            .try_get("enabled_integrations")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let personality: Option<String> =
            row.try_get("personality").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let tokens_used: i64 =
            row.try_get("tokens_used").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let tokens_reserved: i64 =
            row.try_get("tokens_reserved").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let extra_balance: i64 =
            row.try_get("extra_balance").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(TenantContext {
            tenant_id: tenant_id.clone(),
            status: parse_status(&status),
            plan: PlanLimits {
                monthly_token_limit,
                max_active_agents: max_active_agents.max(0) as u32,
                features: parse_string_list(&features),
            },
            enabled_agents: parse_string_list(&enabled_agents),
            enabled_integrations: parse_string_list(&enabled_integrations),
            personality: parse_personality(personality.as_deref()),
            quota: TenantQuotaState { tokens_used, tokens_reserved, extra_balance },
        }))
    }
}
