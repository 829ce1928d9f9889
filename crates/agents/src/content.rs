//! Content domain agent: posts, captions, and marketing copy.

use async_trait::async_trait;

use triago_core::domain::agent::AgentResult;

use crate::{AgentContext, DomainAgent};

pub const SLUG: &str = "content";

const KEYWORDS: &[&str] = &[
    "post",
    "legenda",
    "conteúdo",
    "conteudo",
    "instagram",
    "stories",
    "reels",
    "publicar",
    "publicação",
    "publicacao",
    "divulgar",
    "campanha",
    "anúncio",
    "anuncio",
];

#[derive(Default)]
pub struct ContentAgent;

#[async_trait]
impl DomainAgent for ContentAgent {
    fn slug(&self) -> &'static str {
        SLUG
    }

    fn base_prompt(&self) -> &'static str {
        "Você ajuda o usuário a criar conteúdo para redes sociais e divulgação: ideias \
         de post, legendas e textos curtos. Pergunte o tom e o público antes de escrever \
         e entregue versões prontas para usar."
    }

    fn matches(&self, text: &str) -> bool {
        let normalized = text.to_lowercase();
        KEYWORDS.iter().any(|keyword| normalized.contains(keyword))
    }

    async fn process(&self, _text: &str, _context: &AgentContext) -> AgentResult {
        AgentResult::reply(
            SLUG,
            "execution",
            "Adoro uma pauta de conteúdo! Me conta sobre o que é a publicação e para qual \
             canal, que eu te ajudo a montar o texto.",
        )
        .with_confidence(0.65)
        .with_missing_info("topic")
    }
}
