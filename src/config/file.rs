//! TOML configuration file loading
//!
//! Supports `~/.config/lumen/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LumenConfigFile {
    /// Persona identifier (e.g. "nova")
    #[serde(default)]
    pub persona: Option<String>,

    /// Fallback API key when no environment variable is set
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifiers
    #[serde(default)]
    pub models: ModelsFileConfig,

    /// Playback configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Backend endpoints
    #[serde(default)]
    pub endpoints: EndpointsFileConfig,
}

/// Model identifiers
#[derive(Debug, Default, Deserialize)]
pub struct ModelsFileConfig {
    /// One-shot chat model (e.g. "gemini-2.5-flash")
    pub chat: Option<String>,

    /// Speech synthesis model
    pub tts: Option<String>,

    /// Live session model
    pub live: Option<String>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Volume in [0, 1]
    pub volume: Option<f32>,

    /// Playback speed in [0.5, 2.0]
    pub speed: Option<f32>,
}

/// Backend endpoints
#[derive(Debug, Default, Deserialize)]
pub struct EndpointsFileConfig {
    /// REST API base URL
    pub api_base: Option<String>,

    /// Live session WebSocket URL
    pub live_url: Option<String>,
}

/// Load the TOML config file from `LUMEN_CONFIG` or the standard path
///
/// Returns `LumenConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LumenConfigFile {
    let path = std::env::var("LUMEN_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(config_file_path);

    let Some(path) = path else {
        return LumenConfigFile::default();
    };

    if !path.exists() {
        return LumenConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            LumenConfigFile::default()
        }
    }
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<LumenConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/lumen/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lumen").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "persona = \"sage\"\n\n[audio]\nvolume = 0.4").unwrap();

        let config = read_config_file(file.path()).unwrap();

        assert_eq!(config.persona.as_deref(), Some("sage"));
        assert_eq!(config.audio.volume, Some(0.4));
        assert!(config.audio.speed.is_none());
        assert!(config.models.chat.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "persona = ").unwrap();

        assert!(matches!(
            read_config_file(file.path()),
            Err(crate::Error::Toml(_))
        ));
    }
}
