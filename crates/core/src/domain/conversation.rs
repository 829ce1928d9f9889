use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pending::PendingAction;
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub channel: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Per-turn routing metadata. `agent_used` is the internal slug and must
/// never be rendered into user-visible text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default)]
    pub agent_used: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub conversation_id: ConversationId,
    pub role: TurnRole,
    pub content: String,
    pub metadata: TurnMetadata,
    pub created_at: DateTime<Utc>,
}

/// One entry of the handoff trail: the orchestrator switched the active
/// agent without exposing the switch to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub from: Option<String>,
    pub to: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// 1:1 companion of a conversation, upserted every processed turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: ConversationId,
    pub summary: String,
    pub active_agent: Option<String>,
    pub handoff_history: Vec<HandoffRecord>,
    pub pending_action: Option<PendingAction>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn empty(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            summary: String::new(),
            active_agent: None,
            handoff_history: Vec::new(),
            pending_action: None,
            updated_at: Utc::now(),
        }
    }

    /// Record an agent switch. No-op when the agent is unchanged.
    pub fn hand_off(&mut self, to: impl Into<String>, reason: impl Into<String>) {
        let to = to.into();
        if self.active_agent.as_deref() == Some(to.as_str()) {
            return;
        }
        self.handoff_history.push(HandoffRecord {
            from: self.active_agent.clone(),
            to: to.clone(),
            reason: reason.into(),
            at: Utc::now(),
        });
        self.active_agent = Some(to);
    }
}
