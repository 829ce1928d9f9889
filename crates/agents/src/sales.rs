//! Sales domain agent: prices, quotes, and plan questions.

use async_trait::async_trait;

use triago_core::domain::agent::AgentResult;

use crate::{AgentContext, DomainAgent};

pub const SLUG: &str = "sales";

const KEYWORDS: &[&str] = &[
    "quanto custa",
    "preço",
    "preco",
    "valor",
    "orçamento",
    "orcamento",
    "proposta",
    "desconto",
    "promoção",
    "promocao",
    "comprar",
    "contratar",
    "plano",
];

#[derive(Default)]
pub struct SalesAgent;

#[async_trait]
impl DomainAgent for SalesAgent {
    fn slug(&self) -> &'static str {
        SLUG
    }

    fn base_prompt(&self) -> &'static str {
        "Você ajuda o usuário com preços, orçamentos e condições comerciais. Apresente \
         opções de forma clara e pergunte o que a pessoa precisa antes de sugerir algo. \
         Nunca invente valores que você não conhece."
    }

    fn matches(&self, text: &str) -> bool {
        let normalized = text.to_lowercase();
        KEYWORDS.iter().any(|keyword| normalized.contains(keyword))
    }

    async fn process(&self, text: &str, _context: &AgentContext) -> AgentResult {
        let normalized = text.to_lowercase();
        let intent = if normalized.contains("plano") { "plan" } else { "price" };

        AgentResult::reply(
            SLUG,
            intent,
            "Posso te ajudar com isso! Me conta um pouco mais sobre o que você está \
             procurando para eu trazer as opções certas.",
        )
        .with_confidence(0.7)
        .with_option("Ver opções disponíveis")
        .with_option("Falar sobre condições de pagamento")
    }
}
