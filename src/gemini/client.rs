//! Request/response client for chat and speech synthesis

use secrecy::{ExposeSecret, SecretString};

use super::types::{
    ApiErrorBody, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Tool,
};
use crate::audio::pcm::decode_base64;
use crate::chat::{ChatMessage, GroundingSource, Role, dedupe_sources};
use crate::config::Config;
use crate::prompt::{build_base_instruction, build_system_instruction};
use crate::{Error, Persona, Result};

/// Reply text used when the backend returns no text
pub const NO_RESPONSE: &str = "NO_RESPONSE_RECEIVED";

/// A model reply with its web citations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    /// Deduplicated by uri, in first-seen order
    pub sources: Vec<GroundingSource>,
}

/// Gemini REST client
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    api_base: String,
    tts_model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("tts_model", &self.tts_model)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Create a client from configuration
    ///
    /// A missing API key is only reported when a request is made.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config
                .api_key
                .as_ref()
                .map(|key| SecretString::from(key.expose_secret().to_owned())),
            api_base: config.endpoints.api_base.clone(),
            tts_model: config.models.tts.clone(),
        }
    }

    /// Send a message with prior history and return the reply
    ///
    /// With a persona the instruction carries the persona's personality;
    /// without one only the base instructions are used. History is sent as
    /// conversation turns, so it is not repeated in the instruction.
    ///
    /// # Errors
    ///
    /// Returns a config error if no API key is available, or a backend error
    /// on transport or API failure
    pub async fn send_message(
        &self,
        text: &str,
        model: &str,
        history: &[ChatMessage],
        persona: Option<Persona>,
    ) -> Result<ChatReply> {
        let instruction = persona.map_or_else(build_base_instruction, |p| {
            build_system_instruction(p, &[])
        });

        let mut contents = history_to_contents(history);
        contents.push(Content::text(Some("user"), text));

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(Content::text(None, instruction)),
            tools: vec![Tool::google_search()],
            generation_config: None,
        };

        let response = self.generate(model, &request).await?;

        let mut reply = response.text();
        if reply.is_empty() {
            tracing::warn!(model, "backend returned no text");
            reply = NO_RESPONSE.to_string();
        }
        let sources = dedupe_sources(response.web_sources());

        tracing::debug!(model, sources = sources.len(), "chat reply received");
        Ok(ChatReply {
            text: reply,
            sources,
        })
    }

    /// Synthesize `text` with a prebuilt voice
    ///
    /// Returns raw PCM16 LE mono at 24 kHz.
    ///
    /// # Errors
    ///
    /// Returns a config error if no API key is available, or a backend error
    /// on transport failure or when the response carries no audio
    pub async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let request = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), text)],
            generation_config: Some(GenerationConfig::audio(voice)),
            ..GenerateContentRequest::default()
        };

        let response = self.generate(&self.tts_model, &request).await?;

        let blob = response
            .inline_data()
            .ok_or_else(|| Error::Backend("no audio in response".to_string()))?;
        let audio = decode_base64(&blob.data)
            .map_err(|e| Error::Backend(format!("invalid speech audio: {e}")))?;

        tracing::debug!(voice, bytes = audio.len(), "speech synthesized");
        Ok(audio)
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("API key missing: set GEMINI_API_KEY or API_KEY".to_string()))?;

        let url = format!("{}/models/{model}:generateContent", self.api_base);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(Error::Backend(format!("Gemini API error {status}: {message}")));
        }

        Ok(response.json().await?)
    }
}

/// Map history to backend turns; system messages are local-only
fn history_to_contents(history: &[ChatMessage]) -> Vec<Content> {
    history
        .iter()
        .filter_map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System => return None,
            };
            Some(Content::text(Some(role), msg.content.clone()))
        })
        .collect()
}
