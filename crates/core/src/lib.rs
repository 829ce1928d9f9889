pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod prompt;

pub use audit::{AuditError, AuditRecord, AuditSink, InMemoryAuditSink};
pub use domain::agent::{AgentResult, OrchestratorResponse, ProposedAction};
pub use domain::conversation::{
    Conversation, ConversationContext, ConversationId, ConversationStatus, ConversationTurn,
    HandoffRecord, TurnId, TurnMetadata, TurnRole,
};
pub use domain::pending::PendingAction;
pub use domain::personality::{Personality, PersonalityExample};
pub use domain::tenant::{
    PlanLimits, QuotaStatus, TenantContext, TenantId, TenantQuotaState, TenantStatus, UsageState,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use intent::IntentCategory;
