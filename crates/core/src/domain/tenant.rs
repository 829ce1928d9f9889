use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::domain::personality::Personality;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Cancelled,
}

/// Plan limits relevant to the orchestration core. Billing tiers and
/// feature matrices live in the admin surface; only the numbers the engine
/// enforces travel here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub monthly_token_limit: i64,
    pub max_active_agents: u32,
    pub features: Vec<String>,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self { monthly_token_limit: 100_000, max_active_agents: 5, features: Vec::new() }
    }
}

/// Raw per-tenant quota counters as stored.
///
/// `tokens_used` only grows within a billing cycle; `tokens_reserved` is the
/// transient in-flight amount held by the two-phase reserve/commit protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantQuotaState {
    pub tokens_used: i64,
    pub tokens_reserved: i64,
    pub extra_balance: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageState {
    Normal,
    Warning,
    Exhausted,
}

impl UsageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Exhausted => "EXHAUSTED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub state: UsageState,
    pub usage_ratio: f64,
    pub monthly_limit: i64,
    pub total_used: i64,
    pub extra_balance: i64,
}

impl TenantQuotaState {
    pub fn capacity(&self, monthly_limit: i64) -> i64 {
        monthly_limit.saturating_add(self.extra_balance)
    }

    /// Derive the advisory quota status for one request.
    ///
    /// EXHAUSTED when permanent usage has reached capacity, WARNING from 80%
    /// of capacity upward, NORMAL below. Reserved tokens do not move the
    /// state; they only gate new reservations.
    pub fn status(&self, monthly_limit: i64) -> QuotaStatus {
        let capacity = self.capacity(monthly_limit);
        let usage_ratio = if capacity > 0 {
            (self.tokens_used as f64 / capacity as f64).min(1.0)
        } else {
            1.0
        };

        let state = if capacity <= 0 || self.tokens_used >= capacity {
            UsageState::Exhausted
        } else if usage_ratio >= 0.8 {
            UsageState::Warning
        } else {
            UsageState::Normal
        };

        QuotaStatus {
            allowed: state != UsageState::Exhausted,
            state,
            usage_ratio,
            monthly_limit,
            total_used: self.tokens_used,
            extra_balance: self.extra_balance,
        }
    }
}

/// One settled model call, as written to the usage log. The row id and the
/// timestamp are assigned by the repository at insert time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub conversation_id: Option<ConversationId>,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    /// What the spend paid for, recorded as the owning agent slug.
    pub purpose: String,
}

/// Read-only per-request snapshot of everything the orchestrator needs to
/// know about a tenant. Computed fresh on every call, never cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub status: TenantStatus,
    pub plan: PlanLimits,
    pub enabled_agents: Vec<String>,
    pub enabled_integrations: Vec<String>,
    pub personality: Personality,
    pub quota: TenantQuotaState,
}

impl TenantContext {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn agent_enabled(&self, slug: &str) -> bool {
        self.enabled_agents.iter().any(|enabled| enabled == slug)
    }

    pub fn quota_status(&self) -> QuotaStatus {
        self.quota.status(self.plan.monthly_token_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::{TenantQuotaState, UsageState};

    #[test]
    fn status_normal_below_warning_threshold() {
        let quota = TenantQuotaState { tokens_used: 100, tokens_reserved: 0, extra_balance: 0 };
        let status = quota.status(1_000);
        assert_eq!(status.state, UsageState::Normal);
        assert!(status.allowed);
        assert!((status.usage_ratio - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn status_warning_at_eighty_percent() {
        let quota = TenantQuotaState { tokens_used: 800, tokens_reserved: 0, extra_balance: 0 };
        let status = quota.status(1_000);
        assert_eq!(status.state, UsageState::Warning);
        assert!(status.allowed);
    }

    #[test]
    fn status_exhausted_when_used_reaches_capacity() {
        let quota = TenantQuotaState { tokens_used: 1_000, tokens_reserved: 0, extra_balance: 0 };
        let status = quota.status(1_000);
        assert_eq!(status.state, UsageState::Exhausted);
        assert!(!status.allowed);
    }

    #[test]
    fn extra_balance_extends_capacity() {
        let quota = TenantQuotaState { tokens_used: 1_000, tokens_reserved: 0, extra_balance: 500 };
        let status = quota.status(1_000);
        assert_eq!(status.state, UsageState::Normal);
        assert_eq!(quota.capacity(1_000), 1_500);
    }

    #[test]
    fn reserved_tokens_do_not_change_state() {
        let quota = TenantQuotaState { tokens_used: 100, tokens_reserved: 900, extra_balance: 0 };
        assert_eq!(quota.status(1_000).state, UsageState::Normal);
    }

    #[test]
    fn zero_capacity_is_exhausted() {
        let quota = TenantQuotaState::default();
        assert_eq!(quota.status(0).state, UsageState::Exhausted);
    }
}
