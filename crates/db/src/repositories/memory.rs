//! In-memory doubles used by engine tests and local development. The tenant
//! store backs both the reader and the quota counters so reservation effects
//! are visible through `tenant_context` exactly as they are with SQL.

use std::collections::HashMap;

use tokio::sync::RwLock;

use triago_core::domain::conversation::{
    Conversation, ConversationContext, ConversationId, ConversationStatus, ConversationTurn,
};
use triago_core::domain::tenant::{TenantContext, TenantId, TenantQuotaState, UsageRecord};

use super::{ConversationStore, QuotaRepository, RepositoryError, TenantReader};

#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<String, TenantContext>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl InMemoryTenantStore {
    pub async fn insert(&self, context: TenantContext) {
        let mut tenants = self.tenants.write().await;
        tenants.insert(context.tenant_id.0.clone(), context);
    }

    /// Usage-log entries written by `commit_usage`, oldest first.
    pub async fn usage_entries(&self) -> Vec<UsageRecord> {
        self.usage.read().await.clone()
    }
}

#[async_trait::async_trait]
impl TenantReader for InMemoryTenantStore {
    async fn tenant_context(
        &self,
        tenant_id: &TenantId,
        _is_test_mode: bool,
    ) -> Result<Option<TenantContext>, RepositoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(&tenant_id.0).cloned())
    }
}

#[async_trait::async_trait]
impl QuotaRepository for InMemoryTenantStore {
    async fn quota_state(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantQuotaState>, RepositoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(&tenant_id.0).map(|tenant| tenant.quota))
    }

    async fn reserve(&self, tenant_id: &TenantId, estimate: i64) -> Result<bool, RepositoryError> {
        let mut tenants = self.tenants.write().await;
        let Some(tenant) = tenants.get_mut(&tenant_id.0) else {
            return Ok(false);
        };

        let capacity = tenant.quota.capacity(tenant.plan.monthly_token_limit);
        if tenant.quota.tokens_used + tenant.quota.tokens_reserved + estimate > capacity {
            return Ok(false);
        }
        tenant.quota.tokens_reserved += estimate;
        Ok(true)
    }

    async fn commit_usage(
        &self,
        record: &UsageRecord,
        reserved: i64,
    ) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write().await;
        if let Some(tenant) = tenants.get_mut(&record.tenant_id.0) {
            tenant.quota.tokens_used += record.total_tokens;
            tenant.quota.tokens_reserved = (tenant.quota.tokens_reserved - reserved).max(0);
        }
        drop(tenants);

        let mut usage = self.usage.write().await;
        usage.push(record.clone());
        Ok(())
    }

    async fn release(&self, tenant_id: &TenantId, estimate: i64) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write().await;
        if let Some(tenant) = tenants.get_mut(&tenant_id.0) {
            tenant.quota.tokens_reserved = (tenant.quota.tokens_reserved - estimate).max(0);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    contexts: RwLock<HashMap<String, ConversationContext>>,
    turns: RwLock<Vec<ConversationTurn>>,
}

impl InMemoryConversationStore {
    /// Every turn ever appended for a conversation, oldest first.
    pub async fn all_turns(&self, conversation_id: &ConversationId) -> Vec<ConversationTurn> {
        self.turns
            .read()
            .await
            .iter()
            .filter(|turn| &turn.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn find_active(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        channel: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .filter(|conversation| {
                conversation.status == ConversationStatus::Active
                    && conversation.tenant_id == *tenant_id
                    && conversation.user_id == user_id
                    && conversation.channel == channel
            })
            .max_by_key(|conversation| conversation.created_at)
            .cloned())
    }

    async fn find_by_id(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&conversation_id.0).cloned())
    }

    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.0.clone(), conversation);
        Ok(())
    }

    async fn context(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationContext>, RepositoryError> {
        let contexts = self.contexts.read().await;
        Ok(contexts.get(&conversation_id.0).cloned())
    }

    async fn upsert_context(&self, context: ConversationContext) -> Result<(), RepositoryError> {
        let mut contexts = self.contexts.write().await;
        contexts.insert(context.conversation_id.0.clone(), context);
        Ok(())
    }

    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        turns.push(turn);
        Ok(())
    }

    async fn recent_turns(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let turns = self.turns.read().await;
        let mut window: Vec<ConversationTurn> = turns
            .iter()
            .filter(|turn| &turn.conversation_id == conversation_id)
            .cloned()
            .collect();
        let keep = limit as usize;
        if window.len() > keep {
            window = window.split_off(window.len() - keep);
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use triago_core::domain::conversation::{
        Conversation, ConversationId, ConversationStatus, ConversationTurn, TurnId, TurnMetadata,
        TurnRole,
    };
    use triago_core::domain::personality::Personality;
    use triago_core::domain::tenant::{
        PlanLimits, TenantContext, TenantId, TenantQuotaState, TenantStatus, UsageRecord,
    };

    use super::{InMemoryConversationStore, InMemoryTenantStore};
    use crate::repositories::{ConversationStore, QuotaRepository, TenantReader};

    fn tenant(id: &str, limit: i64, used: i64) -> TenantContext {
        TenantContext {
            tenant_id: TenantId(id.to_owned()),
            status: TenantStatus::Active,
            plan: PlanLimits { monthly_token_limit: limit, ..PlanLimits::default() },
            enabled_agents: vec!["finance".to_owned(), "support".to_owned()],
            enabled_integrations: Vec::new(),
            personality: Personality::default(),
            quota: TenantQuotaState { tokens_used: used, tokens_reserved: 0, extra_balance: 0 },
        }
    }

    #[tokio::test]
    async fn reserve_effects_are_visible_through_tenant_context() {
        let store = InMemoryTenantStore::default();
        store.insert(tenant("tnt-1", 10_000, 0)).await;

        assert!(store.reserve(&TenantId("tnt-1".to_owned()), 1_000).await.expect("reserve"));

        let context = store
            .tenant_context(&TenantId("tnt-1".to_owned()), false)
            .await
            .expect("query")
            .expect("tenant");
        assert_eq!(context.quota.tokens_reserved, 1_000);
    }

    #[tokio::test]
    async fn reserve_respects_capacity() {
        let store = InMemoryTenantStore::default();
        store.insert(tenant("tnt-1", 1_000, 900)).await;

        assert!(!store.reserve(&TenantId("tnt-1".to_owned()), 500).await.expect("reserve"));
    }

    #[tokio::test]
    async fn commit_usage_settles_and_logs() {
        let store = InMemoryTenantStore::default();
        store.insert(tenant("tnt-1", 10_000, 0)).await;
        let id = TenantId("tnt-1".to_owned());

        assert!(store.reserve(&id, 1_000).await.expect("reserve"));
        let record = UsageRecord {
            tenant_id: id.clone(),
            user_id: "usr-1".to_owned(),
            conversation_id: None,
            model: "m".to_owned(),
            prompt_tokens: 400,
            completion_tokens: 300,
            total_tokens: 700,
            purpose: "support".to_owned(),
        };
        store.commit_usage(&record, 1_000).await.expect("commit");

        let state = store.quota_state(&id).await.expect("state").expect("row");
        assert_eq!(state.tokens_used, 700);
        assert_eq!(state.tokens_reserved, 0);
        assert_eq!(store.usage_entries().await, vec![record]);
    }

    #[tokio::test]
    async fn recent_turns_keeps_the_newest_window() {
        let store = InMemoryConversationStore::default();
        let conversation_id = ConversationId("conv-1".to_owned());
        store
            .create(Conversation {
                id: conversation_id.clone(),
                tenant_id: TenantId("tnt-1".to_owned()),
                user_id: "usr-1".to_owned(),
                channel: "webchat".to_owned(),
                status: ConversationStatus::Active,
                created_at: Utc::now(),
            })
            .await
            .expect("create");

        for index in 0..4 {
            store
                .append_turn(ConversationTurn {
                    id: TurnId(Uuid::new_v4().to_string()),
                    conversation_id: conversation_id.clone(),
                    role: TurnRole::User,
                    content: format!("m{index}"),
                    metadata: TurnMetadata::default(),
                    created_at: Utc::now(),
                })
                .await
                .expect("append");
        }

        let window = store.recent_turns(&conversation_id, 2).await.expect("query");
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "m2");
        assert_eq!(window[1].content, "m3");
    }
}
