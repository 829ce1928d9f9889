pub mod llm;
pub mod orchestrator;
pub mod quota;

pub use llm::{AgentCallConfig, ChatMessage, HttpLlmClient, LlmClient, LlmError, LlmReply, LlmRequest, TokenUsage};
pub use orchestrator::{Orchestrator, ProcessRequest};
pub use quota::UsageService;
