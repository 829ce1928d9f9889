//! The message orchestrator: one total function from an inbound chat message
//! to a reply.
//!
//! `process_message` never returns an error. Unknown tenants get a polite
//! refusal, exhausted quotas degrade to consultive mode, model failures fall
//! back to the routed agent's deterministic reply, and executor failures
//! retain the pending action so the user can simply confirm again.

use std::sync::Arc;

use chrono::{Local, Timelike, Utc};
use serde_json::json;
use uuid::Uuid;

use triago_agents::{AgentContext, AgentRegistry, DomainAgent, PendingOutcome};
use triago_core::audit::{AuditRecord, AuditSink};
use triago_core::config::OrchestratorConfig;
use triago_core::domain::agent::{AgentResult, OrchestratorResponse};
use triago_core::domain::conversation::{
    Conversation, ConversationContext, ConversationId, ConversationStatus, ConversationTurn,
    TurnId, TurnMetadata, TurnRole,
};
use triago_core::domain::pending::PendingAction;
use triago_core::domain::tenant::{QuotaStatus, TenantContext, TenantId, UsageRecord, UsageState};
use triago_core::intent::{classify, IntentCategory};
use triago_core::prompt::{apply_guardrails, compose, scripted_opening, Daypart, PromptContext};
use triago_db::repositories::{ConversationStore, TenantReader};

use crate::llm::{AgentCallConfig, ChatMessage, LlmClient, LlmRequest, TokenUsage};
use crate::quota::UsageService;

/// Summary marker noting the conversation already got its one plan-question
/// clarifying probe.
const PLAN_PROBE_MARKER: &str = "[plan_probe]";

const TENANT_REFUSAL: &str =
    "Desculpe, não consegui localizar seu atendimento agora. Pode tentar de novo em instantes?";

#[derive(Clone, Debug)]
pub struct ProcessRequest {
    pub tenant_id: TenantId,
    pub user_id: String,
    /// When set, addresses that conversation directly instead of resolving
    /// the newest active one for (tenant, user, channel).
    pub conversation_id: Option<ConversationId>,
    pub channel: String,
    pub text: String,
    pub test_mode: bool,
}

pub struct Orchestrator {
    tenants: Arc<dyn TenantReader>,
    conversations: Arc<dyn ConversationStore>,
    usage: UsageService,
    registry: AgentRegistry,
    llm: Arc<dyn LlmClient>,
    audit: Arc<dyn AuditSink>,
    memory_window: usize,
    agent_call: AgentCallConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<dyn TenantReader>,
        conversations: Arc<dyn ConversationStore>,
        usage: UsageService,
        registry: AgentRegistry,
        llm: Arc<dyn LlmClient>,
        audit: Arc<dyn AuditSink>,
        config: &OrchestratorConfig,
        agent_call: AgentCallConfig,
    ) -> Self {
        Self {
            tenants,
            conversations,
            usage,
            registry,
            llm,
            audit,
            memory_window: config.memory_window.max(1),
            agent_call,
        }
    }

    pub async fn process_message(&self, request: ProcessRequest) -> OrchestratorResponse {
        let correlation_id = Uuid::new_v4().to_string();
        tracing::info!(
            event_name = "orchestrator.message_received",
            correlation_id = %correlation_id,
            tenant_id = %request.tenant_id.0,
            channel = %request.channel,
            "processing inbound message"
        );

        let tenant =
            match self.tenants.tenant_context(&request.tenant_id, request.test_mode).await {
            Ok(Some(tenant)) if tenant.is_active() => tenant,
            Ok(_) => {
                tracing::warn!(
                    event_name = "orchestrator.tenant_rejected",
                    correlation_id = %correlation_id,
                    tenant_id = %request.tenant_id.0,
                    "tenant missing or inactive"
                );
                return refusal_response(&request, "tenant_not_found");
            }
            Err(error) => {
                tracing::error!(
                    event_name = "orchestrator.tenant_lookup_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "tenant lookup failed"
                );
                return refusal_response(&request, "internal");
            }
        };

        let quota = self.usage.quota_status(&tenant).await;
        let consultive = quota.state == UsageState::Exhausted;
        let intent = classify(&request.text);

        let (conversation, mut context, window) = match self.load_conversation(&request).await {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::error!(
                    event_name = "orchestrator.conversation_load_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "conversation storage unavailable"
                );
                return refusal_response(&request, "internal");
            }
        };
        let is_first_interaction = window.is_empty();

        // The user turn is persisted before any processing so the transcript
        // is complete even when everything after this point degrades.
        let user_turn = ConversationTurn {
            id: TurnId(Uuid::new_v4().to_string()),
            conversation_id: conversation.id.clone(),
            role: TurnRole::User,
            content: request.text.clone(),
            metadata: TurnMetadata { intent: Some(intent.as_str().to_owned()), ..TurnMetadata::default() },
            created_at: Utc::now(),
        };
        if let Err(error) = self.conversations.append_turn(user_turn).await {
            tracing::error!(
                event_name = "orchestrator.turn_write_failed",
                correlation_id = %correlation_id,
                error = %error,
                "could not persist user turn"
            );
            return refusal_response(&request, "internal");
        }

        let agent_context = AgentContext {
            tenant_id: request.tenant_id.clone(),
            user_id: request.user_id.clone(),
            channel: request.channel.clone(),
            enabled_agents: tenant.enabled_agents.clone(),
            enabled_integrations: tenant.enabled_integrations.clone(),
            plan: tenant.plan.clone(),
            recent_messages: window.clone(),
            pending_action: context.pending_action.clone(),
            consultive,
        };

        // Pending-action replay. Skipped in consultive mode: an exhausted
        // tenant must not trigger side effects, not even by confirming.
        if !consultive {
            if let Some(pending) = context.pending_action.clone() {
                if let Some(reply) = self
                    .replay_pending(&request, &pending, &agent_context, &mut context)
                    .await
                {
                    return self
                        .finalize(&conversation, context, reply, intent, &quota, &request)
                        .await;
                }
            }
        }

        // First-contact greeting bypasses the model entirely: the opening is
        // scripted and must be verbatim.
        if intent == IntentCategory::Greeting && is_first_interaction {
            let daypart = Daypart::from_hour(Local::now().hour());
            let reply = Reply {
                message: scripted_opening(daypart),
                agent_used: None,
                pending_action: None,
                error: None,
            };
            return self.finalize(&conversation, context, reply, intent, &quota, &request).await;
        }

        // Plan questions get one clarifying probe before anything lists or
        // sells; the marker makes the second ask flow through normally.
        if matches!(intent, IntentCategory::Plan | IntentCategory::Price)
            && !context.summary.contains(PLAN_PROBE_MARKER)
        {
            if !context.summary.is_empty() {
                context.summary.push(' ');
            }
            context.summary.push_str(PLAN_PROBE_MARKER);
            context.hand_off("sales", "plan_probe");
            let reply = Reply {
                message: "Claro! Antes de falar de valores, me conta rapidinho: o que você \
                          está buscando resolver hoje?"
                    .to_owned(),
                agent_used: Some("sales".to_owned()),
                pending_action: None,
                error: None,
            };
            return self.finalize(&conversation, context, reply, intent, &quota, &request).await;
        }

        let (agent, route_reason) =
            match self.registry.route(&request.text, &tenant.enabled_agents) {
                Some(agent) => (agent, "keyword_route"),
                None => (self.registry.fallback(), "fallback"),
            };
        context.hand_off(agent.slug(), route_reason);

        let result = agent.process(&request.text, &agent_context).await;
        let reply = if consultive || result.pending_action.is_some() {
            self.deterministic_reply(agent.slug(), result, &mut context)
        } else {
            self.generated_reply(
                &request,
                &tenant,
                agent.as_ref(),
                &result,
                &window,
                is_first_interaction,
                intent,
                &conversation.id,
            )
            .await
        };

        self.finalize(&conversation, context, reply, intent, &quota, &request).await
    }

    async fn load_conversation(
        &self,
        request: &ProcessRequest,
    ) -> Result<
        (Conversation, ConversationContext, Vec<ConversationTurn>),
        triago_db::repositories::RepositoryError,
    > {
        let addressed = match &request.conversation_id {
            Some(conversation_id) => {
                match self.conversations.find_by_id(conversation_id).await? {
                    Some(conversation) if conversation.tenant_id == request.tenant_id => {
                        Some(conversation)
                    }
                    // Unknown id, or an id belonging to another tenant; fall
                    // back to participant resolution rather than failing.
                    _ => {
                        tracing::warn!(
                            event_name = "orchestrator.conversation_hint_unresolved",
                            conversation_id = %conversation_id.0,
                            "addressed conversation not found for this tenant"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let existing = match addressed {
            Some(conversation) => Some(conversation),
            None => {
                self.conversations
                    .find_active(&request.tenant_id, &request.user_id, &request.channel)
                    .await?
            }
        };

        let conversation = match existing {
            Some(conversation) => conversation,
            None => {
                let conversation = Conversation {
                    id: ConversationId(Uuid::new_v4().to_string()),
                    tenant_id: request.tenant_id.clone(),
                    user_id: request.user_id.clone(),
                    channel: request.channel.clone(),
                    status: ConversationStatus::Active,
                    created_at: Utc::now(),
                };
                self.conversations.create(conversation.clone()).await?;
                conversation
            }
        };

        let context = self
            .conversations
            .context(&conversation.id)
            .await?
            .unwrap_or_else(|| ConversationContext::empty(conversation.id.clone()));

        let window = self
            .conversations
            .recent_turns(&conversation.id, self.memory_window as u32)
            .await?;

        Ok((conversation, context, window))
    }

    /// Replays the user message against the pending action. `None` means the
    /// message was unrelated and normal routing should take over.
    async fn replay_pending(
        &self,
        request: &ProcessRequest,
        pending: &PendingAction,
        agent_context: &AgentContext,
        context: &mut ConversationContext,
    ) -> Option<Reply> {
        let Some(agent) = self.registry.by_slug(&pending.agent) else {
            // Owning agent no longer registered; drop the orphaned action.
            tracing::warn!(
                event_name = "orchestrator.pending_orphaned",
                agent = %pending.agent,
                "clearing pending action with no owning agent"
            );
            context.pending_action = None;
            return None;
        };

        match agent.resume(&request.text, pending, agent_context).await {
            PendingOutcome::Confirmed { result, outcome } => {
                let mut record = AuditRecord::new(
                    request.tenant_id.clone(),
                    "pending_action.confirmed",
                    pending.action_type.clone(),
                )
                .with_user(request.user_id.clone())
                .with_agent(pending.agent.clone())
                .with_before(pending.data.clone())
                .with_after(outcome.detail.clone());
                if let Some(entity_id) = &outcome.entity_id {
                    record = record.with_entity_id(entity_id.clone());
                }
                self.record_audit(record).await;

                context.pending_action = None;
                Some(Reply::from_result(result))
            }
            PendingOutcome::ExecutionFailed { result } => {
                // Pending action retained so the user can just confirm again;
                // the reply re-announces it so the turn is tagged as awaiting
                // confirmation.
                let mut reply = Reply::from_result(result);
                reply.pending_action = Some(pending.clone());
                Some(reply)
            }
            PendingOutcome::Cancelled { result } => {
                self.record_audit(
                    AuditRecord::new(
                        request.tenant_id.clone(),
                        "pending_action.cancelled",
                        pending.action_type.clone(),
                    )
                    .with_user(request.user_id.clone())
                    .with_agent(pending.agent.clone())
                    .with_before(pending.data.clone()),
                )
                .await;

                context.pending_action = None;
                Some(Reply::from_result(result))
            }
            PendingOutcome::Adjusted { result } => {
                context.pending_action = result.pending_action.clone();
                Some(Reply::from_result(result))
            }
            PendingOutcome::Unrelated => None,
        }
    }

    fn deterministic_reply(
        &self,
        slug: &str,
        result: AgentResult,
        context: &mut ConversationContext,
    ) -> Reply {
        if let Some(pending) = &result.pending_action {
            match pending.validate() {
                Ok(()) => context.pending_action = result.pending_action.clone(),
                Err(error) => {
                    tracing::warn!(
                        event_name = "orchestrator.pending_invalid",
                        agent = %slug,
                        error = %error,
                        "agent proposed an incomplete pending action; dropping it"
                    );
                }
            }
        }

        Reply {
            message: apply_guardrails(&result.suggested_user_message),
            agent_used: Some(slug.to_owned()),
            pending_action: context.pending_action.clone(),
            error: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn generated_reply(
        &self,
        request: &ProcessRequest,
        tenant: &TenantContext,
        agent: &dyn DomainAgent,
        result: &AgentResult,
        window: &[ConversationTurn],
        is_first_interaction: bool,
        intent: IntentCategory,
        conversation_id: &ConversationId,
    ) -> Reply {
        let reserved = match self.usage.reserve_tokens(&request.tenant_id).await {
            Ok(reserved) => reserved,
            Err(error) => {
                tracing::error!(
                    event_name = "quota.reserve_failed",
                    tenant_id = %request.tenant_id.0,
                    error = %error,
                    "reservation query failed"
                );
                false
            }
        };
        if !reserved {
            // Raced to exhaustion since the advisory check; answer with the
            // agent's deterministic text instead of calling the model.
            return Reply {
                message: apply_guardrails(&result.suggested_user_message),
                agent_used: Some(agent.slug().to_owned()),
                pending_action: None,
                error: None,
            };
        }

        let prompt_context = PromptContext {
            intent,
            is_first_interaction,
            consultive: false,
            daypart: Daypart::from_hour(Local::now().hour()),
        };
        let system_prompt =
            compose(agent.slug(), agent.base_prompt(), &tenant.personality, &prompt_context);

        let mut history = history_from(window);
        history.push(ChatMessage::user(request.text.clone()));

        let llm_request = LlmRequest {
            system_prompt,
            history,
            agent_config: self.agent_call.clone(),
        };

        match self.llm.complete(llm_request).await {
            Ok(reply) => {
                // Providers that omit usage are charged the estimate.
                let usage = reply.usage.unwrap_or(TokenUsage {
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: self.usage.reserve_estimate(),
                });
                let record = UsageRecord {
                    tenant_id: request.tenant_id.clone(),
                    user_id: request.user_id.clone(),
                    conversation_id: Some(conversation_id.clone()),
                    model: self.agent_call.model.clone(),
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                    purpose: agent.slug().to_owned(),
                };
                if let Err(error) = self.usage.track_usage(record).await {
                    tracing::error!(
                        event_name = "quota.track_failed",
                        tenant_id = %request.tenant_id.0,
                        error = %error,
                        "usage settlement failed"
                    );
                }

                Reply {
                    message: apply_guardrails(&reply.content),
                    agent_used: Some(agent.slug().to_owned()),
                    pending_action: None,
                    error: None,
                }
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "llm.call_failed",
                    tenant_id = %request.tenant_id.0,
                    error = %error,
                    "model call failed; releasing reservation"
                );
                if let Err(release_error) =
                    self.usage.release_reservation(&request.tenant_id).await
                {
                    tracing::error!(
                        event_name = "quota.release_failed",
                        tenant_id = %request.tenant_id.0,
                        error = %release_error,
                        "releasing reservation failed"
                    );
                }

                // Fall back to the agent's deterministic reply; raw model
                // errors never reach the user.
                Reply {
                    message: apply_guardrails(&result.suggested_user_message),
                    agent_used: Some(agent.slug().to_owned()),
                    pending_action: None,
                    error: Some("llm_unavailable".to_owned()),
                }
            }
        }
    }

    async fn finalize(
        &self,
        conversation: &Conversation,
        mut context: ConversationContext,
        reply: Reply,
        intent: IntentCategory,
        quota: &QuotaStatus,
        request: &ProcessRequest,
    ) -> OrchestratorResponse {
        context.updated_at = Utc::now();
        if let Err(error) = self.conversations.upsert_context(context.clone()).await {
            tracing::error!(
                event_name = "orchestrator.context_write_failed",
                conversation_id = %conversation.id.0,
                error = %error,
                "could not persist conversation context"
            );
        }

        let assistant_turn = ConversationTurn {
            id: TurnId(Uuid::new_v4().to_string()),
            conversation_id: conversation.id.clone(),
            role: TurnRole::Assistant,
            content: reply.message.clone(),
            metadata: TurnMetadata {
                agent_used: reply.agent_used.clone(),
                intent: Some(intent.as_str().to_owned()),
                requires_confirmation: reply.pending_action.is_some(),
            },
            created_at: Utc::now(),
        };
        if let Err(error) = self.conversations.append_turn(assistant_turn).await {
            tracing::error!(
                event_name = "orchestrator.turn_write_failed",
                conversation_id = %conversation.id.0,
                error = %error,
                "could not persist assistant turn"
            );
        }

        let mut response = OrchestratorResponse::new(reply.message)
            .with_metadata("intent", json!(intent.as_str()))
            .with_metadata("usage_state", json!(quota.state.as_str()));
        response.agent_used = reply.agent_used;
        response.pending_action = reply.pending_action;
        if let Some(error) = reply.error {
            response = response.with_metadata("error", json!(error));
        }
        if request.test_mode {
            response = response.with_metadata("test_mode", json!(true));
        }
        response
    }

    async fn record_audit(&self, record: AuditRecord) {
        if let Err(error) = self.audit.record(record).await {
            tracing::error!(
                event_name = "audit.write_failed",
                error = %error,
                "audit sink rejected the record"
            );
        }
    }
}

struct Reply {
    message: String,
    agent_used: Option<String>,
    pending_action: Option<PendingAction>,
    error: Option<String>,
}

impl Reply {
    fn from_result(result: AgentResult) -> Self {
        Self {
            pending_action: result.pending_action.clone(),
            agent_used: Some(result.agent_name.clone()),
            message: apply_guardrails(&result.suggested_user_message),
            error: None,
        }
    }
}

fn refusal_response(request: &ProcessRequest, error: &str) -> OrchestratorResponse {
    let mut response = OrchestratorResponse::new(TENANT_REFUSAL)
        .with_metadata("error", json!(error));
    if request.test_mode {
        response = response.with_metadata("test_mode", json!(true));
    }
    response
}

fn history_from(window: &[ConversationTurn]) -> Vec<ChatMessage> {
    window
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role.as_str().to_owned(),
            content: turn.content.clone(),
        })
        .collect()
}
