use async_trait::async_trait;
use thiserror::Error;

use triago_core::domain::conversation::{
    Conversation, ConversationContext, ConversationId, ConversationTurn,
};
use triago_core::domain::tenant::{TenantContext, TenantId, TenantQuotaState, UsageRecord};

pub mod audit;
pub mod conversation;
pub mod memory;
pub mod quota;
pub mod tenant;

pub use audit::SqlAuditSink;
pub use conversation::SqlConversationStore;
pub use memory::{InMemoryConversationStore, InMemoryTenantStore};
pub use quota::SqlQuotaRepository;
pub use tenant::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Read-only tenant lookup producing the per-request snapshot.
#[async_trait]
pub trait TenantReader: Send + Sync {
    /// `is_test_mode` marks traffic from integration test runs. The bundled
    /// readers resolve the same tenant row either way; sandbox-aware
    /// implementations branch on it without a contract change.
    async fn tenant_context(
        &self,
        tenant_id: &TenantId,
        is_test_mode: bool,
    ) -> Result<Option<TenantContext>, RepositoryError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_active(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        channel: &str,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn find_by_id(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError>;

    async fn context(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationContext>, RepositoryError>;

    async fn upsert_context(&self, context: ConversationContext) -> Result<(), RepositoryError>;

    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), RepositoryError>;

    /// The most recent turns in chronological order.
    async fn recent_turns(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, RepositoryError>;
}

/// Two-phase token accounting. `reserve` is the only admission gate; it must
/// be a single conditional update so concurrent requests cannot both slip
/// under the limit.
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn quota_state(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantQuotaState>, RepositoryError>;

    /// Atomically hold `estimate` tokens. Returns false when the hold would
    /// push used + reserved past capacity; nothing changes in that case.
    /// A tenant that has never consumed anything gets its counter row seeded
    /// by the same statement.
    async fn reserve(&self, tenant_id: &TenantId, estimate: i64) -> Result<bool, RepositoryError>;

    /// Settle a reservation against actual consumption: the record's total
    /// becomes permanent usage, the original `reserved` estimate is released,
    /// and a usage_log row is written, all in one transaction.
    async fn commit_usage(
        &self,
        record: &UsageRecord,
        reserved: i64,
    ) -> Result<(), RepositoryError>;

    /// Drop a reservation without consuming anything (the LLM call failed).
    async fn release(&self, tenant_id: &TenantId, estimate: i64) -> Result<(), RepositoryError>;
}
