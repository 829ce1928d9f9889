use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const SUPPORTED_PERSONALITY_VERSION: u32 = 1;
const MAX_PROHIBITIONS: usize = 20;
const MAX_EXAMPLES: usize = 10;
const MAX_FIELD_CHARS: usize = 500;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalityExample {
    pub good: String,
    pub bad: String,
}

/// Tenant-configurable voice overlay applied on top of the shared safety
/// contract. Explicitly typed and versioned; there is no free-form override
/// map. `custom_instructions` may be arbitrarily long at rest — the prompt
/// composer truncates it at composition time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    pub version: u32,
    #[serde(default)]
    pub voice_tone: Option<String>,
    #[serde(default)]
    pub communication_style: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
    #[serde(default)]
    pub custom_prohibitions: Vec<String>,
    #[serde(default)]
    pub examples: Vec<PersonalityExample>,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            version: SUPPORTED_PERSONALITY_VERSION,
            voice_tone: None,
            communication_style: None,
            custom_instructions: None,
            custom_prohibitions: Vec::new(),
            examples: Vec::new(),
        }
    }
}

impl Personality {
    /// Validation applied at the tenant-input boundary. Data already stored
    /// is re-validated on read and falls back to `Personality::default()`
    /// when it no longer passes.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.version != SUPPORTED_PERSONALITY_VERSION {
            return Err(DomainError::PersonalityRejected(format!(
                "unsupported personality version {} (expected {SUPPORTED_PERSONALITY_VERSION})",
                self.version
            )));
        }
        if self.custom_prohibitions.len() > MAX_PROHIBITIONS {
            return Err(DomainError::PersonalityRejected(format!(
                "too many custom prohibitions ({} > {MAX_PROHIBITIONS})",
                self.custom_prohibitions.len()
            )));
        }
        if self.custom_prohibitions.iter().any(|rule| rule.trim().is_empty()) {
            return Err(DomainError::PersonalityRejected(
                "custom prohibitions must not be blank".to_owned(),
            ));
        }
        if self.examples.len() > MAX_EXAMPLES {
            return Err(DomainError::PersonalityRejected(format!(
                "too many examples ({} > {MAX_EXAMPLES})",
                self.examples.len()
            )));
        }
        for field in [&self.voice_tone, &self.communication_style] {
            if let Some(value) = field {
                if value.chars().count() > MAX_FIELD_CHARS {
                    return Err(DomainError::PersonalityRejected(format!(
                        "tone/style fields are limited to {MAX_FIELD_CHARS} characters"
                    )));
                }
            }
        }
        Ok(())
    }
}
