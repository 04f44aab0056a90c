//! Built-in personas
//!
//! A persona selects both the synthesized voice and the personality text
//! used in the system instruction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// The fixed set of assistant personas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    /// Warm, articulate general-purpose assistant
    #[default]
    Aria,
    /// Precise, tactical operator
    Atlas,
    /// Energetic and playful
    Nova,
    /// Calm, reflective mentor
    Sage,
}

impl Persona {
    /// Every persona, in display order
    pub const ALL: [Self; 4] = [Self::Aria, Self::Atlas, Self::Nova, Self::Sage];

    /// Lowercase identifier
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Aria => "aria",
            Self::Atlas => "atlas",
            Self::Nova => "nova",
            Self::Sage => "sage",
        }
    }

    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aria => "Aria",
            Self::Atlas => "Atlas",
            Self::Nova => "Nova",
            Self::Sage => "Sage",
        }
    }

    /// Short descriptive phrase
    #[must_use]
    pub const fn tagline(self) -> &'static str {
        match self {
            Self::Aria => "warm, articulate companion",
            Self::Atlas => "precise tactical operator",
            Self::Nova => "energetic creative spark",
            Self::Sage => "calm reflective mentor",
        }
    }

    /// Prebuilt Gemini voice used for synthesized speech
    #[must_use]
    pub const fn voice(self) -> &'static str {
        match self {
            Self::Aria => "Kore",
            Self::Atlas => "Charon",
            Self::Nova => "Puck",
            Self::Sage => "Zephyr",
        }
    }

    /// Personality section of the system instruction
    #[must_use]
    pub const fn personality(self) -> &'static str {
        match self {
            Self::Aria => {
                "You are Aria, a warm and articulate assistant. You speak naturally, \
                 show genuine curiosity about the user's goals, and explain things \
                 clearly without talking down to anyone."
            }
            Self::Atlas => {
                "You are Atlas, a precise tactical operator. You answer in short, \
                 structured statements, lead with the most important fact, and never \
                 pad a response with pleasantries."
            }
            Self::Nova => {
                "You are Nova, an energetic and playful assistant. You are upbeat, \
                 quick-witted and enthusiastic, and you like to offer a creative angle \
                 the user may not have considered."
            }
            Self::Sage => {
                "You are Sage, a calm and reflective mentor. You speak slowly and \
                 thoughtfully, ask a clarifying question when a request is ambiguous, \
                 and help the user reason toward an answer."
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Persona {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::PersonaNotFound(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("NOVA".parse::<Persona>().unwrap(), Persona::Nova);
        assert_eq!(" sage ".parse::<Persona>().unwrap(), Persona::Sage);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "jarvis".parse::<Persona>().unwrap_err();
        assert!(matches!(err, Error::PersonaNotFound(name) if name == "jarvis"));
    }

    #[test]
    fn test_voices_are_distinct() {
        let mut voices: Vec<_> = Persona::ALL.iter().map(|p| p.voice()).collect();
        voices.sort_unstable();
        voices.dedup();
        assert_eq!(voices.len(), Persona::ALL.len());
    }
}
