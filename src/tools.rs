//! Functions the model may call during a live session

use serde::Deserialize;
use serde_json::{Value, json};

use crate::audio::{MAX_SPEED, MIN_SPEED};
use crate::{Error, Result};

/// A validated remote function call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolCall {
    /// Erase the conversation history
    ClearChat,
    /// Set playback volume as a percentage (0-100)
    SetVolume { level: f32 },
    /// Set playback speed (0.5-2.0)
    SetSpeed { rate: f32 },
}

#[derive(Deserialize)]
struct VolumeArgs {
    level: f32,
}

#[derive(Deserialize)]
struct SpeedArgs {
    rate: f32,
}

impl ToolCall {
    /// Parse and validate a call by function name
    ///
    /// # Errors
    ///
    /// Returns `InvalidToolCall` for unknown names, missing arguments, or
    /// values outside the declared range
    pub fn parse(name: &str, args: &Value) -> Result<Self> {
        match name {
            "clear_chat" => Ok(Self::ClearChat),
            "set_volume" => {
                let VolumeArgs { level } = parse_args(name, args)?;
                if !level.is_finite() || !(0.0..=100.0).contains(&level) {
                    return Err(Error::InvalidToolCall(format!(
                        "set_volume level must be between 0 and 100, got {level}"
                    )));
                }
                Ok(Self::SetVolume { level })
            }
            "set_speed" => {
                let SpeedArgs { rate } = parse_args(name, args)?;
                if !rate.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&rate) {
                    return Err(Error::InvalidToolCall(format!(
                        "set_speed rate must be between {MIN_SPEED} and {MAX_SPEED}, got {rate}"
                    )));
                }
                Ok(Self::SetSpeed { rate })
            }
            other => Err(Error::InvalidToolCall(format!("unknown function: {other}"))),
        }
    }

    /// Declared function name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ClearChat => "clear_chat",
            Self::SetVolume { .. } => "set_volume",
            Self::SetSpeed { .. } => "set_speed",
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: &str, args: &Value) -> Result<T> {
    // Some servers omit `args` entirely for argument-less calls
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args)
        .map_err(|e| Error::InvalidToolCall(format!("{name}: invalid arguments: {e}")))
}

/// Declarations sent in the live session setup
#[must_use]
pub fn function_declarations() -> Vec<Value> {
    vec![
        json!({
            "name": "clear_chat",
            "description": "Clear the conversation history shown to the user."
        }),
        json!({
            "name": "set_volume",
            "description": "Set the playback volume.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "level": {
                        "type": "NUMBER",
                        "description": "Volume level from 0 (muted) to 100 (full)."
                    }
                },
                "required": ["level"]
            }
        }),
        json!({
            "name": "set_speed",
            "description": "Set the speaking rate of audio playback.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "rate": {
                        "type": "NUMBER",
                        "description": "Playback rate from 0.5 (slow) to 2.0 (fast); 1.0 is normal."
                    }
                },
                "required": ["rate"]
            }
        }),
    ]
}
