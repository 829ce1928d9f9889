use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use triago_core::domain::pending::PendingAction;

use crate::AgentContext;

/// What a domain adapter reports back after committing a confirmed action.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionOutcome {
    pub entity_id: Option<String>,
    pub detail: Value,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("adapter rejected the operation: {0}")]
    Rejected(String),
    #[error("adapter unavailable: {0}")]
    Unavailable(String),
}

/// Seam to the external systems that actually perform confirmed actions
/// (calendar, ledger, CRM). The core never talks to those directly.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &PendingAction,
        context: &AgentContext,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Recording executor for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryActionExecutor {
    executed: Arc<Mutex<Vec<PendingAction>>>,
    fail_with: Arc<Mutex<Option<ExecutionError>>>,
}

impl InMemoryActionExecutor {
    pub fn executed(&self) -> Vec<PendingAction> {
        match self.executed.lock() {
            Ok(actions) => actions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Make the next `execute` call fail with the given error.
    pub fn fail_next(&self, error: ExecutionError) {
        match self.fail_with.lock() {
            Ok(mut slot) => *slot = Some(error),
            Err(poisoned) => *poisoned.into_inner() = Some(error),
        }
    }
}

#[async_trait]
impl ActionExecutor for InMemoryActionExecutor {
    async fn execute(
        &self,
        action: &PendingAction,
        _context: &AgentContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let pending_failure = match self.fail_with.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(error) = pending_failure {
            return Err(error);
        }

        match self.executed.lock() {
            Ok(mut actions) => actions.push(action.clone()),
            Err(poisoned) => poisoned.into_inner().push(action.clone()),
        }

        Ok(ExecutionOutcome {
            entity_id: Some(Uuid::new_v4().to_string()),
            detail: json!({ "action_type": action.action_type, "agent": action.agent }),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use triago_core::domain::pending::PendingAction;

    use super::{ActionExecutor, ExecutionError, InMemoryActionExecutor};
    use crate::test_support;

    fn action() -> PendingAction {
        PendingAction::new(
            "create_transaction",
            "finance",
            json!({"amount": 150}),
            "Confirma?",
        )
    }

    #[tokio::test]
    async fn execute_records_the_action() {
        let executor = InMemoryActionExecutor::default();
        let outcome =
            executor.execute(&action(), &test_support::context()).await.expect("execute");

        assert!(outcome.entity_id.is_some());
        assert_eq!(executor.executed().len(), 1);
    }

    #[tokio::test]
    async fn fail_next_fails_once_then_recovers() {
        let executor = InMemoryActionExecutor::default();
        executor.fail_next(ExecutionError::Unavailable("ledger offline".to_owned()));

        let first = executor.execute(&action(), &test_support::context()).await;
        assert!(first.is_err());
        assert!(executor.executed().is_empty());

        let second = executor.execute(&action(), &test_support::context()).await;
        assert!(second.is_ok());
        assert_eq!(executor.executed().len(), 1);
    }
}
