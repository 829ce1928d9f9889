use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::pending::PendingAction;

/// One operation a domain agent would like to perform on the user's behalf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub action: String,
    pub params: Value,
    pub requires_confirmation: bool,
}

/// The uniform result contract every domain agent returns from `process`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub intent: String,
    pub confidence: f64,
    pub missing_info: Vec<String>,
    pub options: Vec<String>,
    pub proposed_actions: Vec<ProposedAction>,
    pub risk_flags: Vec<String>,
    pub suggested_user_message: String,
    pub pending_action: Option<PendingAction>,
}

impl AgentResult {
    pub fn reply(
        agent_name: impl Into<String>,
        intent: impl Into<String>,
        suggested_user_message: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            intent: intent.into(),
            confidence: 0.5,
            missing_info: Vec::new(),
            options: Vec::new(),
            proposed_actions: Vec::new(),
            risk_flags: Vec::new(),
            suggested_user_message: suggested_user_message.into(),
            pending_action: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_pending(mut self, pending: PendingAction) -> Self {
        self.proposed_actions.push(ProposedAction {
            action: pending.action_type.clone(),
            params: pending.data.clone(),
            requires_confirmation: true,
        });
        self.pending_action = Some(pending);
        self
    }

    pub fn with_risk_flag(mut self, flag: impl Into<String>) -> Self {
        self.risk_flags.push(flag.into());
        self
    }

    pub fn with_missing_info(mut self, field: impl Into<String>) -> Self {
        self.missing_info.push(field.into());
        self
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }
}

/// What `process_message` hands back to callers. `agent_used` never appears
/// inside `message`; adapters that render to end users must drop it (the
/// wire response type in the server simply has no such field).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorResponse {
    pub message: String,
    pub agent_used: Option<String>,
    pub pending_action: Option<PendingAction>,
    pub metadata: BTreeMap<String, Value>,
}

impl OrchestratorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent_used: None,
            pending_action: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::AgentResult;
    use crate::domain::pending::PendingAction;

    #[test]
    fn with_pending_mirrors_into_proposed_actions() {
        let result = AgentResult::reply("finance", "execution", "Confirma?").with_pending(
            PendingAction::new(
                "create_transaction",
                "finance",
                json!({"amount": 150}),
                "Confirma o lançamento de R$ 150,00?",
            ),
        );

        assert_eq!(result.proposed_actions.len(), 1);
        assert!(result.proposed_actions[0].requires_confirmation);
        assert_eq!(result.proposed_actions[0].action, "create_transaction");
        assert!(result.pending_action.is_some());
    }

    #[test]
    fn confidence_is_clamped() {
        let result = AgentResult::reply("sales", "price", "...").with_confidence(1.7);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }
}
