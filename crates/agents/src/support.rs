//! Support agent: the consultive catch-all.
//!
//! Reached through `AgentRegistry::fallback` when no specialized agent
//! claims a message, so its keyword gate stays closed. Never proposes
//! actions.

use async_trait::async_trait;

use triago_core::domain::agent::AgentResult;

use crate::{AgentContext, DomainAgent};

pub const SLUG: &str = "support";

#[derive(Default)]
pub struct SupportAgent;

#[async_trait]
impl DomainAgent for SupportAgent {
    fn slug(&self) -> &'static str {
        SLUG
    }

    fn base_prompt(&self) -> &'static str {
        "Você acolhe qualquer dúvida do usuário: responde o que souber, pede detalhes \
         quando a pergunta está vaga e encaminha para o tema certo quando perceber do \
         que se trata."
    }

    // Routing reaches support only via the registry fallback.
    fn matches(&self, _text: &str) -> bool {
        false
    }

    async fn process(&self, text: &str, _context: &AgentContext) -> AgentResult {
        let normalized = text.to_lowercase();
        let intent = if normalized.contains('?') { "question" } else { "general" };

        AgentResult::reply(
            SLUG,
            intent,
            "Estou aqui para ajudar! Me conta um pouco mais do que você precisa.",
        )
        .with_confidence(0.4)
    }
}
