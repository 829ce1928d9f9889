//! Coarse conversational intent detection.
//!
//! Pure keyword/heuristic classification over an explicit ordered rule
//! table: first matching rule wins, default `General`. The priority order is
//! a visible contract — a message matching both a price pattern and a
//! question pattern resolves to `Price` because price outranks question.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Greeting,
    Complaint,
    Comparison,
    Decision,
    Price,
    Plan,
    Execution,
    Question,
    Curiosity,
    General,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Complaint => "complaint",
            Self::Comparison => "comparison",
            Self::Decision => "decision",
            Self::Price => "price",
            Self::Plan => "plan",
            Self::Execution => "execution",
            Self::Question => "question",
            Self::Curiosity => "curiosity",
            Self::General => "general",
        }
    }
}

type IntentPredicate = fn(&str) -> bool;

/// Ordered rule table, highest priority first. Greeting sits on top but only
/// fires on short salutation-led messages, so it cannot shadow the ranked
/// categories below it.
const RULES: &[(IntentCategory, IntentPredicate)] = &[
    (IntentCategory::Greeting, is_greeting),
    (IntentCategory::Complaint, is_complaint),
    (IntentCategory::Comparison, is_comparison),
    (IntentCategory::Decision, is_decision),
    (IntentCategory::Price, is_price),
    (IntentCategory::Plan, is_plan),
    (IntentCategory::Execution, is_execution),
    (IntentCategory::Question, is_question),
    (IntentCategory::Curiosity, is_curiosity),
];

pub fn classify(text: &str) -> IntentCategory {
    let normalized = normalize(text);
    for (category, predicate) in RULES {
        if predicate(&normalized) {
            return *category;
        }
    }
    IntentCategory::General
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn contains_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| text.contains(pattern))
}

const GREETINGS: &[&str] = &[
    "oi", "olá", "ola", "bom dia", "boa tarde", "boa noite", "hey", "hello", "hi", "e aí", "eai",
    "opa",
];

fn is_greeting(text: &str) -> bool {
    if text.chars().count() > 40 {
        return false;
    }
    GREETINGS.iter().any(|greeting| {
        text == *greeting
            || text.starts_with(&format!("{greeting} "))
            || text.starts_with(&format!("{greeting},"))
            || text.starts_with(&format!("{greeting}!"))
    })
}

fn is_complaint(text: &str) -> bool {
    contains_any(
        text,
        &[
            "reclama",
            "péssimo",
            "pessimo",
            "horrível",
            "horrivel",
            "não funciona",
            "nao funciona",
            "não está funcionando",
            "nao esta funcionando",
            "insatisfeit",
            "decepcion",
            "absurdo",
            "revoltad",
            "quero meu dinheiro",
        ],
    )
}

fn is_comparison(text: &str) -> bool {
    contains_any(
        text,
        &[
            "comparar",
            "comparado",
            "diferença entre",
            "diferenca entre",
            "qual a diferença",
            "qual a diferenca",
            " versus ",
            " vs ",
            "melhor que",
            "ou o ",
            "concorrente",
        ],
    )
}

fn is_decision(text: &str) -> bool {
    contains_any(
        text,
        &[
            "vou fechar",
            "vamos fechar",
            "quero contratar",
            "quero assinar",
            "pode ativar",
            "decidi",
            "fechado,",
            "aceito a proposta",
        ],
    )
}

fn is_price(text: &str) -> bool {
    contains_any(
        text,
        &[
            "preço",
            "preco",
            "quanto custa",
            "quanto fica",
            "quanto é",
            "quanto e",
            "quanto sai",
            "valor d",
            "qual o valor",
            "custo",
            "caro",
            "barato",
        ],
    )
}

fn is_plan(text: &str) -> bool {
    contains_any(
        text,
        &["plano", "planos", "assinatura", "mensalidade", "upgrade", "downgrade", "pacote"],
    )
}

fn is_execution(text: &str) -> bool {
    contains_any(
        text,
        &[
            "agendar",
            "marcar",
            "remarcar",
            "desmarcar",
            "criar",
            "registrar",
            "cadastrar",
            "lançar",
            "lancar",
            "executar",
            "enviar",
            "emitir",
            "paguei",
            "gastei",
            "recebi",
        ],
    )
}

const INTERROGATIVES: &[&str] =
    &["como", "quando", "onde", "por que", "porque", "qual", "quais", "quem", "o que"];

fn is_question(text: &str) -> bool {
    if text.contains('?') {
        return true;
    }
    INTERROGATIVES.iter().any(|word| text.starts_with(word))
}

fn is_curiosity(text: &str) -> bool {
    contains_any(
        text,
        &["curiosidade", "me conta", "conte mais", "interessante", "legal saber", "sabia que"],
    )
}

#[cfg(test)]
mod tests {
    use super::{classify, IntentCategory};

    #[test]
    fn greeting_on_short_salutation() {
        assert_eq!(classify("oi"), IntentCategory::Greeting);
        assert_eq!(classify("Bom dia!"), IntentCategory::Greeting);
        assert_eq!(classify("olá, tudo bem?"), IntentCategory::Greeting);
    }

    #[test]
    fn long_message_is_not_a_greeting() {
        let text = "oi, gostaria de entender como funciona o processo de agendamento de vocês";
        assert_ne!(classify(text), IntentCategory::Greeting);
    }

    #[test]
    fn price_outranks_question() {
        // Matches both a price pattern and the '?' question pattern; the
        // rule table resolves to price.
        assert_eq!(classify("Quanto custa o serviço?"), IntentCategory::Price);
    }

    #[test]
    fn complaint_outranks_question() {
        assert_eq!(classify("isso não funciona, por que?"), IntentCategory::Complaint);
    }

    #[test]
    fn comparison_outranks_price() {
        assert_eq!(
            classify("qual a diferença de preço entre os dois?"),
            IntentCategory::Comparison
        );
    }

    #[test]
    fn decision_outranks_plan() {
        assert_eq!(classify("quero contratar o plano anual"), IntentCategory::Decision);
    }

    #[test]
    fn plan_outranks_execution() {
        assert_eq!(classify("como faço upgrade para criar mais agentes"), IntentCategory::Plan);
    }

    #[test]
    fn execution_keywords_classify_as_execution() {
        assert_eq!(classify("Paguei R$ 150 no mercado"), IntentCategory::Execution);
        assert_eq!(classify("preciso agendar uma reunião amanhã cedo"), IntentCategory::Execution);
    }

    #[test]
    fn question_mark_alone_is_question() {
        assert_eq!(classify("vocês atendem aos sábados?"), IntentCategory::Question);
    }

    #[test]
    fn curiosity_before_default() {
        assert_eq!(classify("me conta mais sobre a empresa"), IntentCategory::Curiosity);
    }

    #[test]
    fn unmatched_text_defaults_to_general() {
        assert_eq!(classify("ok obrigado"), IntentCategory::General);
    }
}
