//! Confirmation-token parsing for the pending-action state machine.
//!
//! Replies are matched against a small fixed vocabulary: "1" and the
//! affirmative words confirm, "2" and the negative words cancel, any other
//! bare number is a domain-specific selection (category choice and the
//! like). Everything else is unrecognized and leaves the pending action to
//! the caller.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationReply {
    Affirmative,
    Negative,
    Selection(u32),
    Unrecognized,
}

// "no" stays out: it is a Portuguese preposition ("no mercado"), not a
// refusal.
const NEGATIVE_TOKENS: &[&str] = &["cancelar", "cancela", "não", "nao", "desisti", "deixa"];

const AFFIRMATIVE_TOKENS: &[&str] =
    &["confirmar", "confirma", "confirmo", "sim", "ok", "yes", "isso", "pode ser", "fechou"];

pub fn parse_reply(text: &str) -> ConfirmationReply {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return ConfirmationReply::Unrecognized;
    }

    if let Ok(number) = normalized.parse::<u32>() {
        return match number {
            1 => ConfirmationReply::Affirmative,
            2 => ConfirmationReply::Negative,
            other => ConfirmationReply::Selection(other),
        };
    }

    // Negative wins over affirmative so "não quero confirmar" cancels.
    if NEGATIVE_TOKENS.iter().any(|token| contains_token(&normalized, token)) {
        return ConfirmationReply::Negative;
    }
    if AFFIRMATIVE_TOKENS.iter().any(|token| contains_token(&normalized, token)) {
        return ConfirmationReply::Affirmative;
    }

    ConfirmationReply::Unrecognized
}

fn contains_token(text: &str, token: &str) -> bool {
    if token.contains(' ') {
        return text.contains(token);
    }
    text.split(|ch: char| !ch.is_alphanumeric() && ch != 'ã')
        .any(|word| word == token)
}

#[cfg(test)]
mod tests {
    use super::{parse_reply, ConfirmationReply};

    #[test]
    fn numeric_one_confirms() {
        assert_eq!(parse_reply("1"), ConfirmationReply::Affirmative);
        assert_eq!(parse_reply(" 1 "), ConfirmationReply::Affirmative);
    }

    #[test]
    fn numeric_two_cancels() {
        assert_eq!(parse_reply("2"), ConfirmationReply::Negative);
    }

    #[test]
    fn higher_numbers_are_selections() {
        assert_eq!(parse_reply("3"), ConfirmationReply::Selection(3));
        assert_eq!(parse_reply("7"), ConfirmationReply::Selection(7));
    }

    #[test]
    fn affirmative_words_confirm() {
        assert_eq!(parse_reply("confirmar"), ConfirmationReply::Affirmative);
        assert_eq!(parse_reply("Sim"), ConfirmationReply::Affirmative);
        assert_eq!(parse_reply("pode confirmar"), ConfirmationReply::Affirmative);
    }

    #[test]
    fn negative_words_cancel() {
        assert_eq!(parse_reply("cancelar"), ConfirmationReply::Negative);
        assert_eq!(parse_reply("não"), ConfirmationReply::Negative);
        assert_eq!(parse_reply("nao, obrigado"), ConfirmationReply::Negative);
    }

    #[test]
    fn negative_wins_over_affirmative() {
        assert_eq!(parse_reply("não quero confirmar"), ConfirmationReply::Negative);
    }

    #[test]
    fn free_text_is_unrecognized() {
        assert_eq!(parse_reply("na verdade foi no posto"), ConfirmationReply::Unrecognized);
        assert_eq!(parse_reply(""), ConfirmationReply::Unrecognized);
    }

    #[test]
    fn token_must_be_a_whole_word() {
        // "simpatia" must not read as "sim".
        assert_eq!(parse_reply("adorei a simpatia"), ConfirmationReply::Unrecognized);
    }
}
