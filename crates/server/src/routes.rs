//! Message intake route. A thin adapter: decode the wire request, hand it to
//! the orchestrator, re-encode the reply. Internal routing details such as
//! the agent that produced the answer are not part of the wire contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use triago_core::domain::conversation::ConversationId;
use triago_core::domain::pending::PendingAction;
use triago_core::domain::tenant::TenantId;
use triago_engine::{Orchestrator, ProcessRequest};

#[derive(Clone)]
pub struct MessagesState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub tenant_id: String,
    pub user_id: String,
    /// Addresses an existing conversation; omitted, the newest active one
    /// for (tenant, user, channel) is resumed or a new one is started.
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
    pub channel: String,
    #[serde(default)]
    pub test_mode: bool,
}

/// Wire response. Deliberately carries no `agent_used` field.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    pub metadata: BTreeMap<String, Value>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/v1/messages", post(post_message))
        .with_state(MessagesState { orchestrator })
}

pub async fn post_message(
    State(state): State<MessagesState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<Value>)> {
    if request.tenant_id.trim().is_empty()
        || request.user_id.trim().is_empty()
        || request.channel.trim().is_empty()
        || request.message.trim().is_empty()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "tenant_id, user_id, channel and message are required"
            })),
        ));
    }

    let response = state
        .orchestrator
        .process_message(ProcessRequest {
            tenant_id: TenantId(request.tenant_id),
            user_id: request.user_id,
            conversation_id: request.conversation_id.map(ConversationId),
            channel: request.channel,
            text: request.message,
            test_mode: request.test_mode,
        })
        .await;

    Ok(Json(MessageResponse {
        message: response.message,
        pending_action: response.pending_action,
        metadata: response.metadata,
    }))
}
