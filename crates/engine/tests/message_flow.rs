//! End-to-end orchestrator flows over the in-memory repositories and a
//! scripted model client.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use chrono::Utc;

use triago_agents::{AgentRegistry, ExecutionError, InMemoryActionExecutor};
use triago_core::audit::InMemoryAuditSink;
use triago_core::config::OrchestratorConfig;
use triago_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
use triago_core::domain::personality::Personality;
use triago_core::domain::tenant::{
    PlanLimits, TenantContext, TenantId, TenantQuotaState, TenantStatus,
};
use triago_db::repositories::{
    ConversationStore, InMemoryConversationStore, InMemoryTenantStore, QuotaRepository,
};
use triago_engine::llm::{AgentCallConfig, LlmClient, LlmError, LlmReply, LlmRequest, TokenUsage};
use triago_engine::orchestrator::{Orchestrator, ProcessRequest};
use triago_engine::quota::UsageService;

#[derive(Clone)]
struct FakeLlm {
    reply: String,
    usage: Option<TokenUsage>,
    fail: Arc<Mutex<bool>>,
    calls: Arc<Mutex<u32>>,
}

impl FakeLlm {
    fn replying(reply: &str, total_tokens: i64) -> Self {
        Self {
            reply: reply.to_owned(),
            usage: Some(TokenUsage {
                prompt_tokens: total_tokens / 2,
                completion_tokens: total_tokens - total_tokens / 2,
                total_tokens,
            }),
            fail: Arc::new(Mutex::new(false)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    fn failing() -> Self {
        let llm = Self::replying("unused", 0);
        *llm.fail.lock().expect("lock") = true;
        llm
    }

    fn call_count(&self) -> u32 {
        *self.calls.lock().expect("lock")
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmReply, LlmError> {
        *self.calls.lock().expect("lock") += 1;
        if *self.fail.lock().expect("lock") {
            return Err(LlmError::Timeout);
        }
        Ok(LlmReply { content: self.reply.clone(), usage: self.usage })
    }
}

struct Harness {
    orchestrator: Orchestrator,
    tenants: Arc<InMemoryTenantStore>,
    conversations: Arc<InMemoryConversationStore>,
    executor: InMemoryActionExecutor,
    audit: InMemoryAuditSink,
    llm: FakeLlm,
}

fn tenant(limit: i64, used: i64) -> TenantContext {
    TenantContext {
        tenant_id: TenantId("tnt-1".to_owned()),
        status: TenantStatus::Active,
        plan: PlanLimits { monthly_token_limit: limit, ..PlanLimits::default() },
        enabled_agents: vec![
            "scheduling".to_owned(),
            "finance".to_owned(),
            "sales".to_owned(),
            "content".to_owned(),
            "support".to_owned(),
        ],
        enabled_integrations: Vec::new(),
        personality: Personality::default(),
        quota: TenantQuotaState { tokens_used: used, tokens_reserved: 0, extra_balance: 0 },
    }
}

async fn harness_with(llm: FakeLlm, tenant_context: Option<TenantContext>) -> Harness {
    let tenants = Arc::new(InMemoryTenantStore::default());
    if let Some(context) = tenant_context {
        tenants.insert(context).await;
    }
    let conversations = Arc::new(InMemoryConversationStore::default());
    let executor = InMemoryActionExecutor::default();
    let audit = InMemoryAuditSink::default();

    let config = OrchestratorConfig { memory_window: 10, reserve_estimate_tokens: 1_000 };
    let orchestrator = Orchestrator::new(
        tenants.clone(),
        conversations.clone(),
        UsageService::new(tenants.clone(), config.reserve_estimate_tokens),
        AgentRegistry::with_defaults(Arc::new(executor.clone())),
        Arc::new(llm.clone()),
        Arc::new(audit.clone()),
        &config,
        AgentCallConfig {
            model: "test-model".to_owned(),
            max_tokens: 700,
            temperature: 0.4,
        },
    );

    Harness { orchestrator, tenants, conversations, executor, audit, llm }
}

async fn harness() -> Harness {
    harness_with(FakeLlm::replying("Claro, posso ajudar com isso!", 500), Some(tenant(100_000, 0)))
        .await
}

fn request(text: &str) -> ProcessRequest {
    ProcessRequest {
        tenant_id: TenantId("tnt-1".to_owned()),
        user_id: "usr-1".to_owned(),
        conversation_id: None,
        channel: "webchat".to_owned(),
        text: text.to_owned(),
        test_mode: false,
    }
}

async fn conversation_id(harness: &Harness) -> ConversationId {
    harness
        .conversations
        .find_active(&TenantId("tnt-1".to_owned()), "usr-1", "webchat")
        .await
        .expect("query")
        .expect("conversation exists")
        .id
}

#[tokio::test]
async fn unknown_tenant_is_refused_without_any_writes() {
    let harness = harness_with(FakeLlm::replying("x", 10), None).await;

    let response = harness.orchestrator.process_message(request("oi")).await;

    assert_eq!(response.metadata.get("error"), Some(&json!("tenant_not_found")));
    assert!(response.agent_used.is_none());
    let conversation = harness
        .conversations
        .find_active(&TenantId("tnt-1".to_owned()), "usr-1", "webchat")
        .await
        .expect("query");
    assert!(conversation.is_none());
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn suspended_tenant_is_refused() {
    let mut context = tenant(100_000, 0);
    context.status = TenantStatus::Suspended;
    let harness = harness_with(FakeLlm::replying("x", 10), Some(context)).await;

    let response = harness.orchestrator.process_message(request("oi")).await;
    assert_eq!(response.metadata.get("error"), Some(&json!("tenant_not_found")));
}

#[tokio::test]
async fn each_processed_message_appends_two_turns() {
    let harness = harness().await;

    for text in ["oi", "me explica como funciona?", "entendi, obrigado"] {
        harness.orchestrator.process_message(request(text)).await;
    }

    let id = conversation_id(&harness).await;
    let turns = harness.conversations.all_turns(&id).await;
    assert_eq!(turns.len(), 6);
}

#[tokio::test]
async fn first_greeting_gets_the_scripted_opening() {
    let harness = harness().await;

    let response = harness.orchestrator.process_message(request("oi")).await;

    assert!(response.message.contains("Eu sou a Lia"));
    assert!(response.message.contains("O que traz você por aqui hoje?"));
    let salutation_led = ["Bom dia", "Boa tarde", "Boa noite"]
        .iter()
        .any(|salutation| response.message.starts_with(salutation));
    assert!(salutation_led, "opening must start with a time-of-day salutation");
    assert!(!response.message.to_lowercase().contains("empresa"));
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn market_expense_proposes_then_numeric_one_confirms() {
    let harness = harness().await;

    let proposal = harness
        .orchestrator
        .process_message(request("Paguei R$ 150 no mercado"))
        .await;

    let pending = proposal.pending_action.as_ref().expect("pending action");
    assert_eq!(pending.action_type, "create_transaction");
    assert_eq!(pending.data["amount"], json!(150));
    assert!(proposal.message.contains("1 - confirmar"));
    assert_eq!(proposal.agent_used.as_deref(), Some("finance"));
    assert!(!proposal.message.contains("finance"));

    let confirmation = harness.orchestrator.process_message(request("1")).await;
    assert!(confirmation.pending_action.is_none());
    assert_eq!(harness.executor.executed().len(), 1);

    let records = harness.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "pending_action.confirmed");
    assert_eq!(records[0].before, Some(pending.data.clone()));
    assert!(records[0].after.is_some());
}

#[tokio::test]
async fn cancelar_discards_the_pending_action_without_side_effects() {
    let harness = harness().await;

    harness
        .orchestrator
        .process_message(request("Paguei R$ 150 no mercado"))
        .await;
    let cancellation = harness.orchestrator.process_message(request("cancelar")).await;

    assert!(cancellation.pending_action.is_none());
    assert!(harness.executor.executed().is_empty());

    let records = harness.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "pending_action.cancelled");
    assert!(records[0].after.is_none());
}

#[tokio::test]
async fn category_selection_reproposes_with_adjusted_data() {
    let harness = harness().await;

    harness
        .orchestrator
        .process_message(request("Paguei R$ 150 no mercado"))
        .await;
    let adjusted = harness.orchestrator.process_message(request("3")).await;

    let pending = adjusted.pending_action.expect("re-derived pending");
    assert_eq!(pending.data["category"], json!("Alimentação"));
    assert!(harness.executor.executed().is_empty());

    let confirmed = harness.orchestrator.process_message(request("sim")).await;
    assert!(confirmed.pending_action.is_none());
    assert_eq!(harness.executor.executed().len(), 1);
}

#[tokio::test]
async fn exhausted_tenant_degrades_to_consultive_mode() {
    let harness =
        harness_with(FakeLlm::replying("x", 10), Some(tenant(1_000, 1_000))).await;

    let response = harness
        .orchestrator
        .process_message(request("Quero agendar uma reunião amanhã às 15h"))
        .await;

    assert_eq!(response.metadata.get("usage_state"), Some(&json!("EXHAUSTED")));
    assert!(response.pending_action.is_none());
    assert!(harness.executor.executed().is_empty());
    assert_eq!(harness.llm.call_count(), 0);

    let lowered = response.message.to_lowercase();
    for forbidden in ["token", "cota", "quota", "limite", "plano"] {
        assert!(!lowered.contains(forbidden), "reply must not mention {forbidden}");
    }
}

#[tokio::test]
async fn model_failure_releases_the_reservation_and_falls_back() {
    let harness = harness_with(FakeLlm::failing(), Some(tenant(100_000, 0))).await;

    let response = harness
        .orchestrator
        .process_message(request("me explica como funciona o atendimento?"))
        .await;

    assert_eq!(response.metadata.get("error"), Some(&json!("llm_unavailable")));
    assert!(!response.message.to_lowercase().contains("timed out"));
    assert!(!response.message.is_empty());

    let state = harness
        .tenants
        .quota_state(&TenantId("tnt-1".to_owned()))
        .await
        .expect("state")
        .expect("row");
    assert_eq!(state.tokens_reserved, 0);
    assert_eq!(state.tokens_used, 0);
}

#[tokio::test]
async fn successful_model_call_commits_actual_usage() {
    let harness = harness_with(
        FakeLlm::replying("Funciona assim: você me conta e eu organizo.", 640),
        Some(tenant(100_000, 0)),
    )
    .await;

    let response = harness
        .orchestrator
        .process_message(request("me explica como funciona o atendimento?"))
        .await;

    assert_eq!(response.message, "Funciona assim: você me conta e eu organizo.");
    assert_eq!(harness.llm.call_count(), 1);

    let state = harness
        .tenants
        .quota_state(&TenantId("tnt-1".to_owned()))
        .await
        .expect("state")
        .expect("row");
    assert_eq!(state.tokens_used, 640);
    assert_eq!(state.tokens_reserved, 0);

    let entries = harness.tenants.usage_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tenant_id, TenantId("tnt-1".to_owned()));
    assert_eq!(entries[0].user_id, "usr-1");
    assert_eq!(entries[0].total_tokens, 640);
    assert_eq!(entries[0].model, "test-model");
    assert_eq!(entries[0].purpose, "support");
    assert!(entries[0].conversation_id.is_some());
}

#[tokio::test]
async fn first_plan_question_gets_a_clarifying_probe_not_a_listing() {
    let harness = harness().await;

    let probe = harness
        .orchestrator
        .process_message(request("qual plano vale mais a pena?"))
        .await;

    assert!(probe.message.contains('?'));
    assert!(!probe.message.to_lowercase().contains("r$"));
    assert_eq!(probe.agent_used.as_deref(), Some("sales"));
    assert_eq!(harness.llm.call_count(), 0);

    let followup = harness
        .orchestrator
        .process_message(request("qual plano vale mais a pena?"))
        .await;
    assert_eq!(followup.agent_used.as_deref(), Some("sales"));
    assert_eq!(harness.llm.call_count(), 1);
}

#[tokio::test]
async fn numbered_markers_from_the_model_are_rewritten() {
    let harness = harness_with(
        FakeLlm::replying("Você tem duas opções:\n1) Semanal\n2) Mensal", 200),
        Some(tenant(100_000, 0)),
    )
    .await;

    let response = harness
        .orchestrator
        .process_message(request("como funcionam os horários?"))
        .await;

    assert_eq!(response.message, "Você tem duas opções:\n- Semanal\n- Mensal");
}

#[tokio::test]
async fn test_mode_flag_is_echoed_in_metadata() {
    let harness = harness().await;
    let mut flagged = request("oi");
    flagged.test_mode = true;

    let response = harness.orchestrator.process_message(flagged).await;
    assert_eq!(response.metadata.get("test_mode"), Some(&json!(true)));
}

#[tokio::test]
async fn executor_failure_keeps_the_confirmation_open() {
    let harness = harness().await;

    harness
        .orchestrator
        .process_message(request("Paguei R$ 150 no mercado"))
        .await;
    harness.executor.fail_next(ExecutionError::Unavailable("ledger offline".to_owned()));

    let retry = harness.orchestrator.process_message(request("1")).await;
    assert!(retry.pending_action.is_some(), "the proposal must survive the failed attempt");
    assert!(harness.executor.executed().is_empty());
    assert!(harness.audit.records().is_empty());

    let id = conversation_id(&harness).await;
    let turns = harness.conversations.all_turns(&id).await;
    let last = turns.last().expect("assistant turn");
    assert!(last.metadata.requires_confirmation);

    let confirmed = harness.orchestrator.process_message(request("1")).await;
    assert!(confirmed.pending_action.is_none());
    assert_eq!(harness.executor.executed().len(), 1);
}

#[tokio::test]
async fn explicit_conversation_id_addresses_that_conversation() {
    let harness = harness().await;
    harness.orchestrator.process_message(request("oi")).await;
    let first_id = conversation_id(&harness).await;

    // A newer active conversation for the same participant.
    harness
        .conversations
        .create(Conversation {
            id: ConversationId("conv-newer".to_owned()),
            tenant_id: TenantId("tnt-1".to_owned()),
            user_id: "usr-1".to_owned(),
            channel: "webchat".to_owned(),
            status: ConversationStatus::Active,
            created_at: Utc::now() + chrono::Duration::seconds(60),
        })
        .await
        .expect("create");

    let mut addressed = request("me explica como funciona o atendimento?");
    addressed.conversation_id = Some(first_id.clone());
    harness.orchestrator.process_message(addressed).await;

    let turns = harness.conversations.all_turns(&first_id).await;
    assert_eq!(turns.len(), 4, "both turn pairs must land in the addressed conversation");
    assert!(harness
        .conversations
        .all_turns(&ConversationId("conv-newer".to_owned()))
        .await
        .is_empty());
}

#[tokio::test]
async fn unknown_conversation_id_falls_back_to_participant_resolution() {
    let harness = harness().await;
    harness.orchestrator.process_message(request("oi")).await;
    let existing = conversation_id(&harness).await;

    let mut addressed = request("me explica como funciona o atendimento?");
    addressed.conversation_id = Some(ConversationId("conv-missing".to_owned()));
    harness.orchestrator.process_message(addressed).await;

    let turns = harness.conversations.all_turns(&existing).await;
    assert_eq!(turns.len(), 4);
}

#[tokio::test]
async fn unrelated_message_keeps_the_pending_action_alive() {
    let harness = harness().await;

    harness
        .orchestrator
        .process_message(request("Paguei R$ 150 no mercado"))
        .await;
    let detour = harness
        .orchestrator
        .process_message(request("me explica como funciona o atendimento?"))
        .await;

    // The detour is answered normally and the proposal survives it.
    assert!(harness.executor.executed().is_empty());
    let id = conversation_id(&harness).await;
    let context = harness
        .conversations
        .context(&id)
        .await
        .expect("query")
        .expect("context exists");
    assert!(context.pending_action.is_some());
    assert!(!detour.message.is_empty());

    let confirmed = harness.orchestrator.process_message(request("confirmar")).await;
    assert!(confirmed.pending_action.is_none());
    assert_eq!(harness.executor.executed().len(), 1);
}
