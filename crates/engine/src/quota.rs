//! Token-quota protection over the repository counters.
//!
//! All reads are advisory; the only admission decision is the atomic
//! `reserve_tokens` update inside the repository. Every successful
//! reservation must be settled by exactly one `track_usage` or
//! `release_reservation`; the orchestrator owns that pairing.

use std::sync::Arc;

use triago_core::domain::tenant::{QuotaStatus, TenantContext, TenantId, UsageRecord, UsageState};
use triago_db::repositories::{QuotaRepository, RepositoryError};

pub struct UsageService {
    quota: Arc<dyn QuotaRepository>,
    reserve_estimate: i64,
}

impl UsageService {
    pub fn new(quota: Arc<dyn QuotaRepository>, reserve_estimate: i64) -> Self {
        Self { quota, reserve_estimate: reserve_estimate.max(1) }
    }

    pub fn reserve_estimate(&self) -> i64 {
        self.reserve_estimate
    }

    /// Advisory status from the freshest counters available. Falls back to
    /// the snapshot already in the tenant context when no quota row exists.
    pub async fn quota_status(&self, tenant: &TenantContext) -> QuotaStatus {
        let state = match self.quota.quota_state(&tenant.tenant_id).await {
            Ok(Some(state)) => state,
            Ok(None) => tenant.quota,
            Err(error) => {
                tracing::warn!(
                    event_name = "quota.state_read_failed",
                    tenant_id = %tenant.tenant_id.0,
                    error = %error,
                    "reading quota counters failed; using request snapshot"
                );
                tenant.quota
            }
        };

        let status = state.status(tenant.plan.monthly_token_limit);
        if status.state == UsageState::Warning {
            tracing::warn!(
                event_name = "quota.warning",
                tenant_id = %tenant.tenant_id.0,
                usage_ratio = status.usage_ratio,
                total_used = status.total_used,
                monthly_limit = status.monthly_limit,
                "tenant crossed the quota warning threshold"
            );
        }
        status
    }

    /// Hold the configured estimate. False means the tenant has no headroom
    /// and nothing was mutated.
    pub async fn reserve_tokens(&self, tenant_id: &TenantId) -> Result<bool, RepositoryError> {
        self.quota.reserve(tenant_id, self.reserve_estimate).await
    }

    /// Settle a reservation against what the model actually consumed.
    pub async fn track_usage(&self, record: UsageRecord) -> Result<(), RepositoryError> {
        self.quota.commit_usage(&record, self.reserve_estimate).await
    }

    /// Failed-call path: give the hold back without consuming anything.
    pub async fn release_reservation(&self, tenant_id: &TenantId) -> Result<(), RepositoryError> {
        self.quota.release(tenant_id, self.reserve_estimate).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use triago_core::domain::personality::Personality;
    use triago_core::domain::tenant::{
        PlanLimits, TenantContext, TenantId, TenantQuotaState, TenantStatus, UsageRecord,
        UsageState,
    };
    use triago_db::repositories::{InMemoryTenantStore, QuotaRepository};

    use super::UsageService;

    fn usage_record(total: i64) -> UsageRecord {
        UsageRecord {
            tenant_id: TenantId("tnt-1".to_owned()),
            user_id: "usr-1".to_owned(),
            conversation_id: None,
            model: "test-model".to_owned(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: total,
            purpose: "support".to_owned(),
        }
    }

    fn tenant(limit: i64, used: i64) -> TenantContext {
        TenantContext {
            tenant_id: TenantId("tnt-1".to_owned()),
            status: TenantStatus::Active,
            plan: PlanLimits { monthly_token_limit: limit, ..PlanLimits::default() },
            enabled_agents: vec!["support".to_owned()],
            enabled_integrations: Vec::new(),
            personality: Personality::default(),
            quota: TenantQuotaState { tokens_used: used, tokens_reserved: 0, extra_balance: 0 },
        }
    }

    async fn service_with(limit: i64, used: i64) -> (UsageService, Arc<InMemoryTenantStore>) {
        let store = Arc::new(InMemoryTenantStore::default());
        store.insert(tenant(limit, used)).await;
        (UsageService::new(store.clone(), 1_000), store)
    }

    #[tokio::test]
    async fn reserve_then_release_restores_counters() {
        let (service, store) = service_with(10_000, 0).await;
        let id = TenantId("tnt-1".to_owned());

        assert!(service.reserve_tokens(&id).await.expect("reserve"));
        service.release_reservation(&id).await.expect("release");

        let state = store.quota_state(&id).await.expect("state").expect("row");
        assert_eq!(state.tokens_used, 0);
        assert_eq!(state.tokens_reserved, 0);
    }

    #[tokio::test]
    async fn reserve_then_track_moves_actual_into_used() {
        let (service, store) = service_with(10_000, 0).await;
        let id = TenantId("tnt-1".to_owned());

        assert!(service.reserve_tokens(&id).await.expect("reserve"));
        service.track_usage(usage_record(640)).await.expect("track");

        let state = store.quota_state(&id).await.expect("state").expect("row");
        assert_eq!(state.tokens_used, 640);
        assert_eq!(state.tokens_reserved, 0);
    }

    #[tokio::test]
    async fn reserve_refused_when_no_headroom() {
        let (service, store) = service_with(1_000, 900).await;
        let id = TenantId("tnt-1".to_owned());

        assert!(!service.reserve_tokens(&id).await.expect("reserve"));
        let state = store.quota_state(&id).await.expect("state").expect("row");
        assert_eq!(state.tokens_reserved, 0);
    }

    #[tokio::test]
    async fn status_reads_fresh_counters() {
        let (service, store) = service_with(1_000, 0).await;

        store.commit_usage(&usage_record(850), 0).await.expect("commit");

        let status = service.quota_status(&tenant(1_000, 0)).await;
        assert_eq!(status.state, UsageState::Warning);
    }
}
