//! System instruction builder

use crate::chat::ChatMessage;
use crate::persona::Persona;

/// Number of trailing history entries included in the transcript
pub const HISTORY_WINDOW: usize = 10;

/// Instructions shared by every persona
const BASE_INSTRUCTIONS: &str = "\
Keep replies concise and conversational; they are often read aloud.
Use web search when a question depends on current events or facts you are unsure of.
You can control the interface with these functions:
- clear_chat: erase the conversation history when the user asks for a fresh start.
- set_volume: change the playback volume (level 0-100).
- set_speed: change the speaking rate (rate 0.5-2.0).
After calling a function, briefly confirm what changed.";

/// Base instructions without any persona context
#[must_use]
pub fn build_base_instruction() -> String {
    BASE_INSTRUCTIONS.to_string()
}

/// Build the system instruction for a persona
///
/// Only the last [`HISTORY_WINDOW`] history entries are included; an empty
/// history produces no transcript section.
#[must_use]
pub fn build_system_instruction(persona: Persona, history: &[ChatMessage]) -> String {
    let mut sections = vec![persona.personality().to_string(), BASE_INSTRUCTIONS.to_string()];

    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    if !recent.is_empty() {
        sections.push(format_transcript(recent));
    }

    sections.join("\n\n")
}

fn format_transcript(messages: &[ChatMessage]) -> String {
    let lines: Vec<String> = messages
        .iter()
        .map(|m| {
            let role = m.role.as_str();
            format!("<{role}>\n{}\n</{role}>", m.content)
        })
        .collect();

    format!(
        "<conversation-history>\n{}\n</conversation-history>",
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_has_no_transcript() {
        let prompt = build_system_instruction(Persona::Aria, &[]);

        assert!(prompt.starts_with(Persona::Aria.personality()));
        assert!(prompt.contains("set_volume"));
        assert!(!prompt.contains("<conversation-history>"));
    }

    #[test]
    fn test_history_truncated_to_window() {
        let history: Vec<ChatMessage> = (0..15)
            .map(|i| ChatMessage::user(format!("message-{i:02}")))
            .collect();

        let prompt = build_system_instruction(Persona::Atlas, &history);

        for i in 0..5 {
            assert!(!prompt.contains(&format!("message-{i:02}")));
        }
        let positions: Vec<usize> = (5..15)
            .map(|i| prompt.find(&format!("message-{i:02}")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(prompt.matches("<user>").count(), HISTORY_WINDOW);
    }

    #[test]
    fn test_transcript_tags_roles() {
        let history = vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi there!")];

        let prompt = build_system_instruction(Persona::Nova, &history);

        assert!(prompt.contains("<user>\nHello\n</user>"));
        assert!(prompt.contains("<assistant>\nHi there!\n</assistant>"));
    }

    #[test]
    fn test_base_instruction_has_no_persona() {
        let prompt = build_base_instruction();
        for persona in Persona::ALL {
            assert!(!prompt.contains(persona.name()));
        }
    }
}
