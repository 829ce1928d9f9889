use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::tenant::TenantId;

/// Append-only record of a side-effecting action. `before`/`after` carry the
/// operation payload snapshots; a cancelled action has no `after`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub tenant_id: TenantId,
    pub user_id: Option<String>,
    pub agent_slug: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        tenant_id: TenantId,
        action: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            user_id: None,
            agent_slug: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            before: None,
            after: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_agent(mut self, agent_slug: impl Into<String>) -> Self {
        self.agent_slug = Some(agent_slug.into());
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("audit sink failure: {0}")]
pub struct AuditError(pub String);

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::audit::{AuditRecord, AuditSink, InMemoryAuditSink};
    use crate::domain::tenant::TenantId;

    #[tokio::test]
    async fn in_memory_sink_records_before_and_after_payloads() {
        let sink = InMemoryAuditSink::default();
        sink.record(
            AuditRecord::new(
                TenantId("tnt-1".to_owned()),
                "pending_action.confirmed",
                "create_transaction",
            )
            .with_user("usr-9")
            .with_agent("finance")
            .with_before(json!({"amount": 150}))
            .with_after(json!({"transaction_id": "txn-1"})),
        )
        .await
        .expect("record");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent_slug.as_deref(), Some("finance"));
        assert_eq!(records[0].before, Some(json!({"amount": 150})));
        assert_eq!(records[0].after, Some(json!({"transaction_id": "txn-1"})));
    }

    #[tokio::test]
    async fn cancelled_action_carries_no_after_payload() {
        let sink = InMemoryAuditSink::default();
        sink.record(
            AuditRecord::new(
                TenantId("tnt-1".to_owned()),
                "pending_action.cancelled",
                "create_transaction",
            )
            .with_before(json!({"amount": 150})),
        )
        .await
        .expect("record");

        assert!(sink.records()[0].after.is_none());
    }
}
