//! Scheduling domain agent: books appointments and meetings.
//!
//! Proposes a `create_event` pending action when the message carries enough
//! detail, otherwise asks for the missing pieces. Listed first in the
//! routing table, so mixed phrases like "agendar o pagamento" land here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use triago_core::domain::agent::AgentResult;
use triago_core::domain::pending::PendingAction;

use crate::confirm::{parse_reply, ConfirmationReply};
use crate::executor::ActionExecutor;
use crate::{AgentContext, DomainAgent, PendingOutcome};

pub const SLUG: &str = "scheduling";

const KEYWORDS: &[&str] = &[
    "agendar",
    "agenda",
    "agendamento",
    "marcar",
    "remarcar",
    "desmarcar",
    "reunião",
    "reuniao",
    "horário",
    "horario",
    "compromisso",
    "consulta",
    "encaixe",
];

const WEEKDAYS: &[&str] = &[
    "segunda", "terça", "terca", "quarta", "quinta", "sexta", "sábado", "sabado", "domingo",
];

pub struct SchedulingAgent {
    executor: Arc<dyn ActionExecutor>,
}

impl SchedulingAgent {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl DomainAgent for SchedulingAgent {
    fn slug(&self) -> &'static str {
        SLUG
    }

    fn base_prompt(&self) -> &'static str {
        "Você ajuda o usuário a organizar a agenda: marcar, remarcar e desmarcar \
         compromissos. Sempre confirme dia e horário antes de concluir e avise quando \
         faltar alguma informação."
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
                "Posso ajudar você a planejar esse compromisso. Me conta o que você quer \
                 marcar e para quando?",
            )
            .with_confidence(0.6);
        }

        let when = extract_when(text);
        let time = extract_time(text);

        if when.is_none() && time.is_none() {
            return AgentResult::reply(
                SLUG,
                "execution",
                "Claro! Para qual dia e horário você quer marcar?",
            )
            .with_confidence(0.5)
            .with_missing_info("when");
        }

        let when_label = when.unwrap_or("a combinar");
        let time_label = time.clone().unwrap_or_else(|| "a combinar".to_owned());

        let pending = PendingAction::new(
            "create_event",
            SLUG,
            json!({
                "description": text.trim(),
                "when": when_label,
                "time": time_label,
            }),
            format!(
                "Vou marcar: {} ({when_label}, {time_label}). Confirma?\n1 - confirmar\n2 - cancelar",
                text.trim()
            ),
        );
        let summary = pending.summary.clone();

        let mut result =
            AgentResult::reply(SLUG, "execution", summary).with_confidence(0.85).with_pending(pending);
        if time.is_none() {
            result = result.with_missing_info("time");
        }
        result
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
                    let result = AgentResult::reply(
                        SLUG,
                        "decision",
                        "Agendado! Se precisar remarcar, é só me avisar.",
                    )
                    .with_confidence(0.95);
                    PendingOutcome::Confirmed { result, outcome }
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.scheduling.execution_failed",
                        error = %error,
                        "calendar adapter failed; retaining pending action"
                    );
                    let result = AgentResult::reply(
                        SLUG,
                        "decision",
                        "Não consegui confirmar o agendamento agora. Pode tentar de novo em \
                         instantes?",
                    )
                    .with_risk_flag("execution_error");
                    PendingOutcome::ExecutionFailed { result }
                }
            },
            ConfirmationReply::Negative => {
                let result = AgentResult::reply(
                    SLUG,
                    "decision",
                    "Tudo bem, não vou marcar. Quando quiser agendar de novo, me chama.",
                );
                PendingOutcome::Cancelled { result }
            }
            ConfirmationReply::Selection(_) | ConfirmationReply::Unrecognized => {
                PendingOutcome::Unrelated
            }
        }
    }
}

fn extract_when(text: &str) -> Option<&'static str> {
    let normalized = text.to_lowercase();
    if normalized.contains("depois de amanhã") || normalized.contains("depois de amanha") {
        return Some("depois de amanhã");
    }
    if normalized.contains("amanhã") || normalized.contains("amanha") {
        return Some("amanhã");
    }
    if normalized.contains("hoje") {
        return Some("hoje");
    }
    WEEKDAYS
        .iter()
        .zip([
            "segunda", "terça", "terça", "quarta", "quinta", "sexta", "sábado", "sábado",
            "domingo",
        ])
        .find(|(keyword, _)| normalized.contains(*keyword))
        .map(|(_, label)| label)
}

/// Finds "15h", "15:30" or "às 15" style time mentions.
fn extract_time(text: &str) -> Option<String> {
    let normalized = text.to_lowercase();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    for (index, token) in tokens.iter().enumerate() {
        let cleaned = token.trim_matches(|ch: char| !ch.is_alphanumeric() && ch != ':');

        if let Some(hour_part) = cleaned.strip_suffix('h').or_else(|| cleaned.strip_suffix("hs")) {
            if let Ok(hour) = hour_part.parse::<u32>() {
                if hour < 24 {
                    return Some(format!("{hour}h"));
                }
            }
        }

        if let Some((hours, minutes)) = cleaned.split_once(':') {
            if let (Ok(hour), Ok(minute)) = (hours.parse::<u32>(), minutes.parse::<u32>()) {
                if hour < 24 && minute < 60 {
                    return Some(format!("{hour}:{minute:02}"));
                }
            }
        }

        let previous = index.checked_sub(1).and_then(|prior| tokens.get(prior));
        if matches!(previous, Some(&"às") | Some(&"as")) {
            if let Ok(hour) = cleaned.parse::<u32>() {
                if hour < 24 {
                    return Some(format!("{hour}h"));
                }
            }
        }
    }

    None
}
