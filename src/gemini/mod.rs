//! Gemini backend access
//!
//! One-shot chat and speech synthesis go over REST; voice conversations use
//! the bidirectional live WebSocket API.

mod client;
pub mod live;
pub mod types;

pub use client::{ChatReply, GeminiClient, NO_RESPONSE};
pub use live::{Direction, LiveEvent, LiveHandler, LiveSession, LiveState, SETUP_TIMEOUT};
