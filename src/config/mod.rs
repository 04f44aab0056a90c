//! Configuration management for Lumen

pub mod file;

use secrecy::SecretString;

use crate::audio::AudioSettings;
use crate::{Persona, Result};

use self::file::LumenConfigFile;

/// Environment variables checked for the API key, in priority order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Default REST API base URL
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default live session WebSocket URL
pub const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Lumen configuration
#[derive(Debug)]
pub struct Config {
    /// Gemini API key, if one could be resolved
    pub api_key: Option<SecretString>,

    /// Active persona
    pub persona: Persona,

    /// Model identifiers
    pub models: ModelConfig,

    /// Backend endpoints
    pub endpoints: EndpointConfig,

    /// Initial playback settings
    pub audio: AudioSettings,
}

/// Model identifiers
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// One-shot chat model
    pub chat: String,

    /// Speech synthesis model
    pub tts: String,

    /// Live session model
    pub live: String,
}

/// Backend endpoints
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// REST API base URL (no trailing slash)
    pub api_base: String,

    /// Live session WebSocket URL
    pub live_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            live_url: DEFAULT_LIVE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the optional config file
    ///
    /// # Errors
    ///
    /// Returns error if the configured persona is unknown
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(|name| std::env::var(name).ok(), fc)
    }

    /// Build configuration from an env lookup and a parsed config file
    ///
    /// Precedence is env > file > default.
    ///
    /// # Errors
    ///
    /// Returns error if the configured persona is unknown
    pub fn from_sources<F>(env: F, fc: LumenConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = resolve_api_key(&env)
            .or_else(|| fc.api_key.filter(|k| !k.trim().is_empty()))
            .map(SecretString::from);

        if api_key.is_none() {
            tracing::warn!("no API key configured (set GEMINI_API_KEY or API_KEY)");
        }

        let persona = env("LUMEN_PERSONA")
            .or(fc.persona)
            .map(|p| p.parse::<Persona>())
            .transpose()?
            .unwrap_or_default();

        let models = ModelConfig {
            chat: env("LUMEN_CHAT_MODEL")
                .or(fc.models.chat)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            tts: env("LUMEN_TTS_MODEL")
                .or(fc.models.tts)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            live: env("LUMEN_LIVE_MODEL")
                .or(fc.models.live)
                .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
        };

        let endpoints = EndpointConfig {
            api_base: env("LUMEN_API_BASE")
                .or(fc.endpoints.api_base)
                .map_or_else(
                    || DEFAULT_API_BASE.to_string(),
                    |url| url.trim_end_matches('/').to_string(),
                ),
            live_url: env("LUMEN_LIVE_URL")
                .or(fc.endpoints.live_url)
                .unwrap_or_else(|| DEFAULT_LIVE_URL.to_string()),
        };

        let defaults = AudioSettings::default();
        let audio = AudioSettings::new(
            env("LUMEN_VOLUME")
                .and_then(|v| v.parse().ok())
                .or(fc.audio.volume)
                .unwrap_or_else(|| defaults.volume()),
            env("LUMEN_SPEED")
                .and_then(|v| v.parse().ok())
                .or(fc.audio.speed)
                .unwrap_or_else(|| defaults.speed()),
        );

        Ok(Self {
            api_key,
            persona,
            models,
            endpoints,
            audio,
        })
    }
}

/// Resolve the API key from the environment
///
/// The first variable in [`API_KEY_VARS`] with a non-empty value wins.
pub fn resolve_api_key<F>(env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_VARS
        .iter()
        .filter_map(|name| env(name))
        .find(|value| !value.trim().is_empty())
}
