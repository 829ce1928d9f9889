use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;

/// An uncommitted, agent-proposed operation awaiting explicit user
/// confirmation. At most one exists per conversation; the owning agent's
/// continuation logic decides what the next user message does to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub action_type: String,
    pub agent: String,
    pub data: Value,
    pub summary: String,
}

impl PendingAction {
    pub fn new(
        action_type: impl Into<String>,
        agent: impl Into<String>,
        data: Value,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            agent: agent.into(),
            data,
            summary: summary.into(),
        }
    }

    /// A pending action must fully describe the operation it defers: the
    /// confirmation turn has nothing else to go on.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.action_type.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "pending action requires an action_type".to_owned(),
            ));
        }
        if self.agent.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "pending action requires an owning agent".to_owned(),
            ));
        }
        if self.summary.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "pending action requires a confirmation summary".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::PendingAction;

    #[test]
    fn valid_pending_action_passes() {
        let action = PendingAction::new(
            "create_transaction",
            "finance",
            json!({"amount": 150}),
            "Confirma o lançamento de R$ 150,00?",
        );
        assert!(action.validate().is_ok());
    }

    #[test]
    fn missing_summary_is_rejected() {
        let action = PendingAction::new("create_event", "scheduling", json!({}), "  ");
        assert!(action.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let action = PendingAction::new(
            "create_event",
            "scheduling",
            json!({"title": "Reunião", "when_hint": "amanhã"}),
            "Confirma o agendamento?",
        );
        let raw = serde_json::to_string(&action).expect("serialize");
        let back: PendingAction = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back, action);
    }
}
