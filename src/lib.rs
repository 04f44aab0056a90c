//! Lumen - Gemini chat and voice assistant
//!
//! This library provides the core functionality for Lumen:
//! - Persona prompts and conversation state
//! - One-shot chat with web grounding and speech synthesis
//! - Live voice sessions with remote function calls
//! - Gapless audio playback and microphone capture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Front end (CLI)                    │
//! │        chat  │  ask  │  say  │  live                 │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 AssistantState                       │
//! │   History  │  Persona  │  Audio settings  │  Flags   │
//! └─────────┬──────────────────────────────┬────────────┘
//!           │                              │
//! ┌─────────▼──────────┐        ┌──────────▼────────────┐
//! │    GeminiClient    │        │      LiveSession      │
//! │  chat  │  speech   │        │  mic ▲  │  ▼ events   │
//! └─────────┬──────────┘        └──────────┬────────────┘
//!           │                              │
//! ┌─────────▼──────────────────────────────▼────────────┐
//! │               Playback sequencer                     │
//! │        cursor  │  gain  │  software mixer            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod gemini;
pub mod persona;
pub mod prompt;
pub mod state;
pub mod tools;

pub use audio::{AudioSettings, CpalMicrophone, Microphone, Playback, PlaybackSequencer};
pub use chat::{ChatMessage, GroundingSource, Role};
pub use config::Config;
pub use error::{Error, Result};
pub use gemini::{ChatReply, GeminiClient, LiveHandler, LiveSession, LiveState};
pub use persona::Persona;
pub use prompt::{build_base_instruction, build_system_instruction};
pub use state::{AssistantState, SharedState, StateHandler, StateUpdate};
pub use tools::ToolCall;
