//! Domain agents and the contract they implement.
//!
//! Each specialized handler exposes a cheap keyword gate (`matches`), a
//! `process` call returning the shared `AgentResult` contract, and a
//! `resume` hook that interprets the next user message against a pending
//! action the agent previously proposed. The orchestrator tries agents in a
//! fixed priority order; support is the consultive catch-all.

use std::sync::Arc;

use async_trait::async_trait;

use triago_core::domain::agent::AgentResult;
use triago_core::domain::conversation::ConversationTurn;
use triago_core::domain::pending::PendingAction;
use triago_core::domain::tenant::{PlanLimits, TenantId};

pub mod confirm;
pub mod content;
pub mod executor;
pub mod finance;
pub mod sales;
pub mod scheduling;
pub mod support;

pub use executor::{ActionExecutor, ExecutionError, ExecutionOutcome, InMemoryActionExecutor};

/// Per-turn view handed to every agent call. Carries the request identity,
/// the tenant's enablement flags, and the short-term memory window.
#[derive(Clone, Debug)]
pub struct AgentContext {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub channel: String,
    pub enabled_agents: Vec<String>,
    pub enabled_integrations: Vec<String>,
    pub plan: PlanLimits,
    pub recent_messages: Vec<ConversationTurn>,
    pub pending_action: Option<PendingAction>,
    /// Degraded mode: explain and guide, never execute side effects.
    pub consultive: bool,
}

/// Outcome of replaying a user message against a pending action.
#[derive(Clone, Debug)]
pub enum PendingOutcome {
    /// The user confirmed and the side effect executed. The caller clears
    /// the pending action and records the audit trail.
    Confirmed { result: AgentResult, outcome: ExecutionOutcome },
    /// The user confirmed but the adapter failed; the pending action must
    /// be retained so "confirm again" works without re-describing it.
    ExecutionFailed { result: AgentResult },
    /// The user declined; the pending action is discarded with no side
    /// effect.
    Cancelled { result: AgentResult },
    /// The user adjusted the operation; `result.pending_action` carries the
    /// re-derived proposal.
    Adjusted { result: AgentResult },
    /// The message does not address the pending action at all.
    Unrelated,
}

#[async_trait]
pub trait DomainAgent: Send + Sync {
    /// Internal identifier. Never shown to end users.
    fn slug(&self) -> &'static str;

    /// Capability description layered into the composed system prompt.
    fn base_prompt(&self) -> &'static str;

    /// Cheap keyword gate used for initial routing.
    fn matches(&self, text: &str) -> bool;

    async fn process(&self, text: &str, context: &AgentContext) -> AgentResult;

    /// Continuation logic for a pending action this agent owns. Agents that
    /// never propose actions keep the default.
    async fn resume(
        &self,
        _text: &str,
        _pending: &PendingAction,
        _context: &AgentContext,
    ) -> PendingOutcome {
        PendingOutcome::Unrelated
    }
}

/// Fixed-priority agent table. Routing order is part of the contract:
/// scheduling, finance, sales, content, then support as the fallback.
pub struct AgentRegistry {
    agents: Vec<Arc<dyn DomainAgent>>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<Arc<dyn DomainAgent>>) -> Self {
        Self { agents }
    }

    pub fn with_defaults(executor: Arc<dyn ActionExecutor>) -> Self {
        Self::new(vec![
            Arc::new(scheduling::SchedulingAgent::new(executor.clone())),
            Arc::new(finance::FinanceAgent::new(executor)),
            Arc::new(sales::SalesAgent::default()),
            Arc::new(content::ContentAgent::default()),
            Arc::new(support::SupportAgent::default()),
        ])
    }

    /// First enabled agent whose keyword gate accepts the text.
    pub fn route(&self, text: &str, enabled_agents: &[String]) -> Option<Arc<dyn DomainAgent>> {
        self.agents
            .iter()
            .find(|agent| {
                enabled_agents.iter().any(|slug| slug == agent.slug()) && agent.matches(text)
            })
            .cloned()
    }

    pub fn by_slug(&self, slug: &str) -> Option<Arc<dyn DomainAgent>> {
        self.agents.iter().find(|agent| agent.slug() == slug).cloned()
    }

    /// The consultive catch-all used when nothing else matches.
    pub fn fallback(&self) -> Arc<dyn DomainAgent> {
        self.by_slug(support::SLUG).unwrap_or_else(|| {
            Arc::new(support::SupportAgent::default()) as Arc<dyn DomainAgent>
        })
    }

    pub fn slugs(&self) -> Vec<&'static str> {
        self.agents.iter().map(|agent| agent.slug()).collect()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{AgentRegistry, InMemoryActionExecutor};

    fn registry() -> AgentRegistry {
        AgentRegistry::with_defaults(Arc::new(InMemoryActionExecutor::default()))
    }

    fn all_enabled() -> Vec<String> {
        vec![
            "scheduling".to_owned(),
            "finance".to_owned(),
            "sales".to_owned(),
            "content".to_owned(),
            "support".to_owned(),
        ]
    }

    #[test]
    fn routing_order_is_fixed() {
        assert_eq!(
            registry().slugs(),
            vec!["scheduling", "finance", "sales", "content", "support"]
        );
    }

    #[test]
    fn scheduling_outranks_finance_for_mixed_text() {
        // "agendar o pagamento" gates through both; scheduling wins on order.
        let agent = registry().route("quero agendar o pagamento", &all_enabled()).expect("route");
        assert_eq!(agent.slug(), "scheduling");
    }

    #[test]
    fn disabled_agents_are_skipped() {
        let enabled = vec!["finance".to_owned(), "support".to_owned()];
        let agent = registry().route("quero agendar o pagamento", &enabled).expect("route");
        assert_eq!(agent.slug(), "finance");
    }

    #[test]
    fn unmatched_text_routes_nowhere() {
        assert!(registry().route("obrigado", &all_enabled()).is_none());
    }

    #[test]
    fn fallback_is_support() {
        assert_eq!(registry().fallback().slug(), "support");
    }
}
