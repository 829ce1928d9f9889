//! Deterministic system-prompt composition and output guardrails.
//!
//! `compose` layers the shared safety-and-style contract under the tenant's
//! personality in a fixed concatenation order. Identical inputs always yield
//! the identical prompt string: no clock reads, no randomness, no I/O — the
//! daypart used by the scripted opening travels in as part of the context.

use serde::{Deserialize, Serialize};

use crate::domain::personality::Personality;
use crate::intent::IntentCategory;

/// Fixed persona name shown to end users in the opening script.
pub const PERSONA_NAME: &str = "Lia";

/// Ceiling applied to tenant free-text instructions so prompt size stays
/// bounded regardless of what the tenant typed into the admin screen.
pub const CUSTOM_INSTRUCTIONS_CEILING: usize = 1200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Daypart {
    Morning,
    Afternoon,
    Evening,
}

impl Daypart {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            _ => Self::Evening,
        }
    }

    pub fn salutation(&self) -> &'static str {
        match self {
            Self::Morning => "Bom dia",
            Self::Afternoon => "Boa tarde",
            Self::Evening => "Boa noite",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromptContext {
    pub intent: IntentCategory,
    pub is_first_interaction: bool,
    pub consultive: bool,
    pub daypart: Daypart,
}

/// The verbatim opening for a first-contact greeting: time-of-day
/// salutation, persona name, one qualifying question. Never a request for
/// personal or company data.
pub fn scripted_opening(daypart: Daypart) -> String {
    format!(
        "{}! Eu sou a {PERSONA_NAME}. O que traz você por aqui hoje?",
        daypart.salutation()
    )
}

pub fn compose(
    agent_slug: &str,
    base_prompt: &str,
    personality: &Personality,
    context: &PromptContext,
) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(6);

    sections.push(capability_section(agent_slug, base_prompt));
    sections.push(identity_section(context));
    sections.push(prohibitions_section(personality));
    if let Some(personality_section) = personality_section(personality) {
        sections.push(personality_section);
    }
    sections.push(response_shape_section());
    if context.consultive {
        sections.push(consultive_section());
    }

    sections.join("\n\n")
}

fn capability_section(agent_slug: &str, base_prompt: &str) -> String {
    format!("## Escopo do atendimento ({agent_slug})\n{}", base_prompt.trim())
}

fn identity_section(context: &PromptContext) -> String {
    let mut section = format!(
        "## Identidade\nVocê é {PERSONA_NAME}, atendente virtual. Apresente-se sempre como {PERSONA_NAME}."
    );
    if context.intent == IntentCategory::Greeting && context.is_first_interaction {
        section.push_str(&format!(
            "\nEsta é a primeira interação. Abra EXATAMENTE com: \"{}\"",
            scripted_opening(context.daypart)
        ));
        section.push_str(
            "\nNão peça nome, empresa, cargo ou qualquer dado pessoal nesta abertura.",
        );
    }
    section
}

fn prohibitions_section(personality: &Personality) -> String {
    let mut rules = vec![
        "Nunca responda em formato de lista numerada.".to_owned(),
        "Nunca peça dados pessoais ou da empresa no primeiro contato.".to_owned(),
        "Nunca use \"nossa equipe\" ou \"nós vamos\"; fale em primeira pessoa.".to_owned(),
    ];
    for custom in &personality.custom_prohibitions {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            rules.push(trimmed.to_owned());
        }
    }

    let mut section = String::from("## Regras obrigatórias");
    for rule in rules {
        section.push_str("\n- ");
        section.push_str(&rule);
    }
    section
}

fn personality_section(personality: &Personality) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();

    if let Some(tone) = personality.voice_tone.as_deref() {
        if !tone.trim().is_empty() {
            lines.push(format!("Tom de voz: {}", tone.trim()));
        }
    }
    if let Some(style) = personality.communication_style.as_deref() {
        if !style.trim().is_empty() {
            lines.push(format!("Estilo de comunicação: {}", style.trim()));
        }
    }
    if let Some(instructions) = personality.custom_instructions.as_deref() {
        let trimmed = instructions.trim();
        if !trimmed.is_empty() {
            lines.push(format!("Instruções da marca: {}", truncate_chars(trimmed)));
        }
    }
    for example in &personality.examples {
        lines.push(format!("Exemplo bom: \"{}\" / Exemplo ruim: \"{}\"", example.good, example.bad));
    }

    if lines.is_empty() {
        return None;
    }

    let mut section = String::from("## Personalidade da marca");
    for line in lines {
        section.push('\n');
        section.push_str(&line);
    }
    Some(section)
}

fn response_shape_section() -> String {
    [
        "## Formato da resposta",
        "Responda o assunto da mensagem antes de perguntar qualquer coisa.",
        "Faça no máximo uma pergunta, sempre ao final.",
        "Nunca abra com variações genéricas de \"como posso ajudar\".",
    ]
    .join("\n")
}

fn consultive_section() -> String {
    [
        "## Modo consultivo",
        "Neste atendimento você apenas orienta e explica; não execute nem prometa executar ações.",
        "Use linguagem neutra sobre o serviço, sem mencionar limites, cotas ou termos técnicos.",
    ]
    .join("\n")
}

fn truncate_chars(text: &str) -> String {
    if text.chars().count() <= CUSTOM_INSTRUCTIONS_CEILING {
        return text.to_owned();
    }
    text.chars().take(CUSTOM_INSTRUCTIONS_CEILING).collect()
}

/// Post-process model output before it reaches the user.
///
/// Rewrites line-leading numbered-list markers (`1)` / `1.`) into bullet
/// markers and collapses runs of 3+ newlines down to 2. Idempotent.
pub fn apply_guardrails(text: &str) -> String {
    let rewritten =
        text.lines().map(rewrite_numbered_marker).collect::<Vec<_>>().join("\n");

    let mut collapsed = rewritten;
    while collapsed.contains("\n\n\n") {
        collapsed = collapsed.replace("\n\n\n", "\n\n");
    }
    collapsed
}

fn rewrite_numbered_marker(line: &str) -> String {
    let trimmed = line.trim_start();
    let indent_len = line.len() - trimmed.len();
    let digits: String = trimmed.chars().take_while(|ch| ch.is_ascii_digit()).collect();
    if digits.is_empty() {
        return line.to_owned();
    }

    let rest = &trimmed[digits.len()..];
    let after_marker = rest.strip_prefix(')').or_else(|| rest.strip_prefix('.'));
    match after_marker {
        Some(body) if body.is_empty() || body.starts_with(' ') => {
            format!("{}- {}", &line[..indent_len], body.trim_start())
        }
        _ => line.to_owned(),
    }
}
