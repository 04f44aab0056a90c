//! Conversation state shared by the chat and voice front ends

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{AudioSettings, Playback};
use crate::chat::ChatMessage;
use crate::config::Config;
use crate::gemini::{GeminiClient, LiveHandler};
use crate::tools::ToolCall;
use crate::Persona;

/// Chat history, session flags and live transcription buffers
#[derive(Debug, Clone)]
pub struct AssistantState {
    history: Vec<ChatMessage>,
    persona: Persona,
    plain_chat: bool,
    model: String,
    settings: AudioSettings,
    is_live: bool,
    is_thinking: bool,
    live_input: String,
    live_output: String,
}

impl AssistantState {
    /// Empty state for a persona and chat model
    #[must_use]
    pub fn new(persona: Persona, model: impl Into<String>, settings: AudioSettings) -> Self {
        Self {
            history: Vec::new(),
            persona,
            plain_chat: false,
            model: model.into(),
            settings,
            is_live: false,
            is_thinking: false,
            live_input: String::new(),
            live_output: String::new(),
        }
    }

    /// Empty state using the configured persona, chat model and audio settings
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.persona, config.models.chat.clone(), config.audio)
    }

    /// Send typed messages without persona context
    #[must_use]
    pub const fn with_plain_chat(mut self, plain: bool) -> Self {
        self.plain_chat = plain;
        self
    }

    /// Conversation so far, oldest first
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Active persona
    #[must_use]
    pub const fn persona(&self) -> Persona {
        self.persona
    }

    /// Switch persona; history is kept
    pub fn set_persona(&mut self, persona: Persona) {
        self.persona = persona;
    }

    /// Current volume and speed
    #[must_use]
    pub const fn settings(&self) -> AudioSettings {
        self.settings
    }

    /// Replace the audio settings
    pub fn set_settings(&mut self, settings: AudioSettings) {
        self.settings = settings;
    }

    /// Whether a live session is running
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.is_live
    }

    /// Mark a live session as started or ended; clears the transcription buffers
    pub fn set_live(&mut self, live: bool) {
        self.is_live = live;
        self.live_input.clear();
        self.live_output.clear();
    }

    /// Whether a typed message is awaiting its reply
    #[must_use]
    pub const fn is_thinking(&self) -> bool {
        self.is_thinking
    }

    /// Running (input, output) transcription of the current voice turn
    #[must_use]
    pub fn live_transcription(&self) -> (&str, &str) {
        (&self.live_input, &self.live_output)
    }

    /// Replace the running transcription of the current voice turn
    pub fn set_live_transcription(&mut self, input: &str, output: &str) {
        input.clone_into(&mut self.live_input);
        output.clone_into(&mut self.live_output);
    }

    /// Append a message to the history
    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Drop every message
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Send a typed message and append the outcome
    ///
    /// The user message is appended first. On success the reply and its
    /// sources follow; on failure an error notice is appended instead.
    /// Returns the appended reply or notice.
    pub async fn send(&mut self, client: &GeminiClient, text: &str) -> ChatMessage {
        let prior = self.history.len();
        self.history.push(ChatMessage::user(text));
        self.is_thinking = true;

        let persona = (!self.plain_chat).then_some(self.persona);
        let result = client
            .send_message(text, &self.model, &self.history[..prior], persona)
            .await;

        self.is_thinking = false;

        let reply = match result {
            Ok(reply) => ChatMessage::assistant(reply.text).with_sources(reply.sources),
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                ChatMessage::error(format!("Something went wrong: {e}"))
            }
        };
        self.history.push(reply.clone());
        reply
    }

    /// Apply a tool call and describe what changed
    pub fn apply_tool(&mut self, call: &ToolCall) -> String {
        match *call {
            ToolCall::ClearChat => {
                self.clear_history();
                "Chat history cleared.".to_string()
            }
            ToolCall::SetVolume { level } => {
                self.settings = self.settings.with_volume_percent(level);
                format!("Volume set to {}%", level.round())
            }
            ToolCall::SetSpeed { rate } => {
                self.settings = self.settings.with_speed(rate);
                format!("Playback speed set to {rate}x")
            }
        }
    }

    /// Append a finished voice turn; empty sides are skipped
    ///
    /// Returns the number of messages appended.
    pub fn commit_voice_turn(&mut self, input: &str, output: &str) -> usize {
        let before = self.history.len();
        if !input.trim().is_empty() {
            self.history.push(ChatMessage::user(input.trim()).voice());
        }
        if !output.trim().is_empty() {
            self.history.push(ChatMessage::assistant(output.trim()).voice());
        }
        self.live_input.clear();
        self.live_output.clear();
        self.history.len() - before
    }

    /// Record a live session failure
    pub fn fail_live(&mut self, message: &str) {
        self.set_live(false);
        self.history
            .push(ChatMessage::error(format!("Voice session error: {message}")));
    }
}

/// Shared, lockable [`AssistantState`]
pub type SharedState = Arc<Mutex<AssistantState>>;

/// Notifications for whatever is rendering the state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Transcription { input: String, output: String },
    TurnCommitted { input: String, output: String },
    ToolApplied(String),
    SessionError(String),
    SessionClosed,
}

/// Drives an [`AssistantState`] from live session callbacks
#[derive(Debug, Clone)]
pub struct StateHandler {
    state: SharedState,
    playback: Playback,
    updates: Option<mpsc::UnboundedSender<StateUpdate>>,
}

impl StateHandler {
    /// Handler updating `state` and applying audio changes to `playback`
    #[must_use]
    pub const fn new(state: SharedState, playback: Playback) -> Self {
        Self {
            state,
            playback,
            updates: None,
        }
    }

    /// Also report every change on `updates`
    #[must_use]
    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<StateUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    fn lock(&self) -> MutexGuard<'_, AssistantState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, update: StateUpdate) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(update);
        }
    }
}

#[async_trait]
impl LiveHandler for StateHandler {
    async fn on_tool_call(&self, call: &ToolCall) -> Option<String> {
        let (confirmation, settings) = {
            let mut state = self.lock();
            let confirmation = state.apply_tool(call);
            (confirmation, state.settings())
        };
        self.playback.set_audio_settings(settings);

        tracing::info!(function = call.name(), "{confirmation}");
        self.notify(StateUpdate::ToolApplied(confirmation.clone()));
        Some(confirmation)
    }

    fn on_transcription(&self, input: &str, output: &str) {
        self.lock().set_live_transcription(input, output);
        self.notify(StateUpdate::Transcription {
            input: input.to_string(),
            output: output.to_string(),
        });
    }

    fn on_turn_complete(&self, input: &str, output: &str) {
        let added = self.lock().commit_voice_turn(input, output);
        if added > 0 {
            self.notify(StateUpdate::TurnCommitted {
                input: input.trim().to_string(),
                output: output.trim().to_string(),
            });
        }
    }

    fn on_error(&self, message: &str) {
        self.lock().fail_live(message);
        self.notify(StateUpdate::SessionError(message.to_string()));
    }

    fn on_close(&self) {
        self.lock().set_live(false);
        self.notify(StateUpdate::SessionClosed);
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::{AudioOutput, OutputContext};
    use crate::chat::Role;

    use super::*;

    fn state() -> AssistantState {
        AssistantState::new(Persona::Aria, "gemini-test", AudioSettings::default())
    }

    #[test]
    fn test_apply_volume_tool() {
        let mut state = state();

        let reply = state.apply_tool(&ToolCall::SetVolume { level: 50.0 });

        assert_eq!(reply, "Volume set to 50%");
        assert!((state.settings().volume() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_apply_speed_and_clear() {
        let mut state = state();
        state.push(ChatMessage::user("hi"));

        assert_eq!(
            state.apply_tool(&ToolCall::SetSpeed { rate: 1.5 }),
            "Playback speed set to 1.5x"
        );
        assert!((state.settings().speed() - 1.5).abs() < f32::EPSILON);

        state.apply_tool(&ToolCall::ClearChat);
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_commit_voice_turn_skips_empty_sides() {
        let mut state = state();
        state.set_live_transcription("partial", "");

        assert_eq!(state.commit_voice_turn("  ", "Hello there"), 1);
        assert_eq!(state.commit_voice_turn("What time is it?", "Noon."), 2);
        assert_eq!(state.commit_voice_turn("", ""), 0);

        let history = state.history();
        assert_eq!(history[0].role, Role::Assistant);
        assert!(history.iter().all(|m| m.is_voice));
        assert_eq!(state.live_transcription(), ("", ""));
    }

    #[tokio::test]
    async fn test_handler_updates_state_and_playback() {
        let shared = Arc::new(Mutex::new(state()));
        let output: Box<dyn AudioOutput> = Box::new(OutputContext::offline(24_000));
        let playback = Playback::with_output(output, AudioSettings::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = StateHandler::new(Arc::clone(&shared), playback.clone()).with_updates(tx);

        let reply = handler.on_tool_call(&ToolCall::SetVolume { level: 25.0 }).await;
        assert_eq!(reply.as_deref(), Some("Volume set to 25%"));
        assert!((playback.settings().volume() - 0.25).abs() < f32::EPSILON);

        handler.on_transcription("hi", "");
        handler.on_turn_complete("hi", "hello");
        handler.on_error("boom");

        let state = shared.lock().unwrap();
        assert_eq!(state.history().len(), 3);
        assert!(state.history()[2].is_error);
        assert!(!state.is_live());
        drop(state);

        assert_eq!(
            rx.recv().await,
            Some(StateUpdate::ToolApplied("Volume set to 25%".to_string()))
        );
        assert!(matches!(rx.recv().await, Some(StateUpdate::Transcription { .. })));
        assert!(matches!(rx.recv().await, Some(StateUpdate::TurnCommitted { .. })));
        assert_eq!(rx.recv().await, Some(StateUpdate::SessionError("boom".to_string())));
    }
}
