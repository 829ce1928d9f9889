//! Finance domain agent: registers expenses and income from chat.
//!
//! A message like "Paguei R$ 150 no mercado" becomes a `create_transaction`
//! pending action; the next turn confirms, cancels, or adjusts the category
//! by number before anything touches the ledger adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use triago_core::domain::agent::AgentResult;
use triago_core::domain::pending::PendingAction;

use crate::confirm::{parse_reply, ConfirmationReply};
use crate::executor::ActionExecutor;
use crate::{AgentContext, DomainAgent, PendingOutcome};

pub const SLUG: &str = "finance";

/// Selection numbers start at 3 because 1 confirms and 2 cancels.
const CATEGORIES: &[&str] = &["Alimentação", "Transporte", "Moradia", "Lazer", "Saúde"];
const FIRST_CATEGORY_OPTION: u32 = 3;

const KEYWORDS: &[&str] = &[
    "paguei",
    "gastei",
    "comprei",
    "recebi",
    "pagamento",
    "despesa",
    "receita",
    "transação",
    "transacao",
    "lançamento",
    "lancamento",
    "boleto",
    "pix",
    "extrato",
    "saldo",
    "financeiro",
    "r$",
];

pub struct FinanceAgent {
    executor: Arc<dyn ActionExecutor>,
}

impl FinanceAgent {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self { executor }
    }

    fn proposal(&self, amount: f64, description: &str, direction: &str, category: &str) -> PendingAction {
        PendingAction::new(
            "create_transaction",
            SLUG,
            json!({
                "amount": amount_value(amount),
                "description": description,
                "direction": direction,
                "category": category,
            }),
            summary_for(amount, direction, category),
        )
    }
}

#[async_trait]
impl DomainAgent for FinanceAgent {
    fn slug(&self) -> &'static str {
        SLUG
    }

    fn base_prompt(&self) -> &'static str {
        "Você ajuda o usuário a organizar as finanças: registrar despesas e receitas, \
         consultar lançamentos e entender o próprio fluxo de caixa. Explique sempre em \
         linguagem simples, sem jargão contábil."
    }

    fn matches(&self, text: &str) -> bool {
        let normalized = text.to_lowercase();
        KEYWORDS.iter().any(|keyword| normalized.contains(keyword))
    }

    async fn process(&self, text: &str, context: &AgentContext) -> AgentResult {
        if context.consultive {
            return AgentResult::reply(
                SLUG,
                "execution",
                "Posso orientar você sobre como organizar esse lançamento. Me conta um pouco \
                 mais sobre o que você quer registrar?",
            )
            .with_confidence(0.6);
        }

        let Some(amount) = extract_amount(text) else {
            return AgentResult::reply(
                SLUG,
                "execution",
                "Entendi que é um lançamento financeiro. Qual foi o valor?",
            )
            .with_confidence(0.5)
            .with_missing_info("amount");
        };

        let direction = detect_direction(text);
        let pending = self.proposal(amount, text.trim(), direction, "Outros");
        let summary = pending.summary.clone();

        AgentResult::reply(SLUG, "execution", summary)
            .with_confidence(0.85)
            .with_pending(pending)
    }

    async fn resume(
        &self,
        text: &str,
        pending: &PendingAction,
        context: &AgentContext,
    ) -> PendingOutcome {
        match parse_reply(text) {
            ConfirmationReply::Affirmative => match self.executor.execute(pending, context).await {
                Ok(outcome) => {
                    let amount = pending.data.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                    let result = AgentResult::reply(
                        SLUG,
                        "decision",
                        format!(
                            "Prontinho, lançamento de {} registrado. Quer registrar mais algum?",
                            format_brl(amount)
                        ),
                    )
                    .with_confidence(0.95);
                    PendingOutcome::Confirmed { result, outcome }
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.finance.execution_failed",
                        error = %error,
                        "transaction adapter failed; retaining pending action"
                    );
                    let result = AgentResult::reply(
                        SLUG,
                        "decision",
                        "Não consegui concluir o registro agora. Pode tentar confirmar de novo \
                         em instantes?",
                    )
                    .with_risk_flag("execution_error");
                    PendingOutcome::ExecutionFailed { result }
                }
            },
            ConfirmationReply::Negative => {
                let result = AgentResult::reply(
                    SLUG,
                    "decision",
                    "Sem problemas, cancelei esse lançamento. Se quiser registrar outro, é só \
                     me contar.",
                );
                PendingOutcome::Cancelled { result }
            }
            ConfirmationReply::Selection(option) => {
                let index = option.saturating_sub(FIRST_CATEGORY_OPTION) as usize;
                let Some(category) = CATEGORIES.get(index) else {
                    return PendingOutcome::Unrelated;
                };

                let amount = pending.data.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                let description = pending
                    .data
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let direction =
                    pending.data.get("direction").and_then(Value::as_str).unwrap_or("expense");

                let adjusted = self.proposal(amount, &description, direction, category);
                let summary = adjusted.summary.clone();
                let result = AgentResult::reply(SLUG, "execution", summary)
                    .with_confidence(0.9)
                    .with_pending(adjusted);
                PendingOutcome::Adjusted { result }
            }
            ConfirmationReply::Unrecognized => PendingOutcome::Unrelated,
        }
    }
}

fn summary_for(amount: f64, direction: &str, category: &str) -> String {
    let direction_label = if direction == "income" { "entrada" } else { "saída" };
    let mut summary = format!(
        "Vou registrar {} de {} na categoria {category}. Confirma?\n1 - confirmar\n2 - cancelar",
        direction_label,
        format_brl(amount)
    );
    summary.push_str("\nOu escolha outra categoria: ");
    let options = CATEGORIES
        .iter()
        .enumerate()
        .map(|(index, name)| format!("{} - {name}", index as u32 + FIRST_CATEGORY_OPTION))
        .collect::<Vec<_>>()
        .join(", ");
    summary.push_str(&options);
    summary
}

fn format_brl(amount: f64) -> String {
    format!("R$ {:.2}", amount).replace('.', ",")
}

/// Integral amounts serialize as integers so payload consumers see
/// `"amount": 150`, not `150.0`.
fn amount_value(amount: f64) -> Value {
    if amount.fract() == 0.0 && amount.abs() < i64::MAX as f64 {
        json!(amount as i64)
    } else {
        json!(amount)
    }
}

fn detect_direction(text: &str) -> &'static str {
    let normalized = text.to_lowercase();
    if ["recebi", "entrou", "receita", "me pagaram"]
        .iter()
        .any(|keyword| normalized.contains(keyword))
    {
        "income"
    } else {
        "expense"
    }
}

fn extract_amount(text: &str) -> Option<f64> {
    let tokens = tokenize(&text.to_lowercase());

    for (index, token) in tokens.iter().enumerate() {
        if let Some(rest) = token.strip_prefix("r$") {
            if rest.is_empty() {
                if let Some(value) = tokens.get(index + 1).and_then(|next| parse_money(next)) {
                    return Some(value);
                }
            } else if let Some(value) = parse_money(rest) {
                return Some(value);
            }
        }

        let next_is_currency_word = matches!(
            tokens.get(index + 1).map(String::as_str),
            Some("reais") | Some("real") | Some("conto") | Some("contos")
        );
        if next_is_currency_word {
            if let Some(value) = parse_money(token) {
                return Some(value);
            }
        }
    }

    None
}

fn parse_money(token: &str) -> Option<f64> {
    let trimmed = token.trim_matches(|ch: char| !ch.is_ascii_digit() && ch != ',' && ch != '.');
    if trimmed.is_empty() {
        return None;
    }

    // Brazilian notation: "1.500,00" uses '.' for thousands and ',' for
    // cents. Without a comma, parse as-is so "150" and "150.50" both work.
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_owned()
    };

    normalized.parse::<f64>().ok().filter(|value| *value > 0.0)
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || matches!(character, '$' | ',' | '.') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}
