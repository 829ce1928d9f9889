use chrono::{DateTime, Utc};
use sqlx::Row;

use triago_core::domain::conversation::{
    Conversation, ConversationContext, ConversationId, ConversationStatus, ConversationTurn,
    HandoffRecord, TurnId, TurnMetadata, TurnRole,
};
use triago_core::domain::pending::PendingAction;
use triago_core::domain::tenant::TenantId;

use super::{ConversationStore, RepositoryError};
use crate::DbPool;

pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_role(raw: &str) -> TurnRole {
    match raw {
        "assistant" => TurnRole::Assistant,
        _ => TurnRole::User,
    }
}

fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ConversationTurn {
        id: TurnId(id),
        conversation_id: ConversationId(conversation_id),
        role: parse_role(&role),
        content,
        metadata: serde_json::from_str::<TurnMetadata>(&metadata).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
    })
}

#[async_trait::async_trait]
impl ConversationStore for SqlConversationStore {
    async fn find_active(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        channel: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, user_id, channel, status, created_at
             FROM conversation
             WHERE tenant_id = ? AND user_id = ? AND channel = ? AND status = 'active'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(user_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at: String =
            row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(Conversation {
            id: ConversationId(id),
            tenant_id: tenant_id.clone(),
            user_id: user_id.to_owned(),
            channel: channel.to_owned(),
            status: ConversationStatus::Active,
            created_at: parse_timestamp(&created_at),
        }))
    }

    async fn find_by_id(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, user_id, channel, status, created_at
             FROM conversation WHERE id = ?",
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tenant_id: String =
            row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let user_id: String =
            row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let channel: String =
            row.try_get("channel").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let status: String =
            row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at: String =
            row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(Conversation {
            id: conversation_id.clone(),
            tenant_id: TenantId(tenant_id),
            user_id,
            channel,
            status: if status == "closed" {
                ConversationStatus::Closed
            } else {
                ConversationStatus::Active
            },
            created_at: parse_timestamp(&created_at),
        }))
    }

    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let status = match conversation.status {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
        };

        sqlx::query(
            "INSERT INTO conversation (id, tenant_id, user_id, channel, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.tenant_id.0)
        .bind(&conversation.user_id)
        .bind(&conversation.channel)
        .bind(status)
        .bind(conversation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn context(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationContext>, RepositoryError> {
        let row = sqlx::query(
            "SELECT summary, active_agent, handoff_history, pending_action, updated_at
             FROM conversation_context WHERE conversation_id = ?",
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let summary: String =
            row.try_get("summary").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let active_agent: Option<String> =
            row.try_get("active_agent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let handoff_history: String =
            row.try_get("handoff_history").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let pending_action: Option<String> =
            row.try_get("pending_action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let updated_at: String =
            row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(ConversationContext {
            conversation_id: conversation_id.clone(),
            summary,
            active_agent,
            handoff_history: serde_json::from_str::<Vec<HandoffRecord>>(&handoff_history)
                .unwrap_or_default(),
            pending_action: pending_action
                .as_deref()
                .and_then(|json| serde_json::from_str::<PendingAction>(json).ok()),
            updated_at: parse_timestamp(&updated_at),
        }))
    }

    async fn upsert_context(&self, context: ConversationContext) -> Result<(), RepositoryError> {
        let handoff_history = serde_json::to_string(&context.handoff_history)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let pending_action = context
            .pending_action
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_context
                 (conversation_id, summary, active_agent, handoff_history, pending_action, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id) DO UPDATE SET
                 summary = excluded.summary,
                 active_agent = excluded.active_agent,
                 handoff_history = excluded.handoff_history,
                 pending_action = excluded.pending_action,
                 updated_at = excluded.updated_at",
        )
        .bind(&context.conversation_id.0)
        .bind(&context.summary)
        .bind(&context.active_agent)
        .bind(&handoff_history)
        .bind(&pending_action)
        .bind(context.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&turn.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_turn (id, conversation_id, role, content, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.id.0)
        .bind(&turn.conversation_id.0)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(&metadata)
        .bind(turn.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_turns(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, conversation_id, role, content, metadata, created_at
             FROM (SELECT * FROM conversation_turn
                   WHERE conversation_id = ?
                   ORDER BY created_at DESC, id DESC
                   LIMIT ?)
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&conversation_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_turn).collect::<Result<Vec<_>, _>>()
    }
}
