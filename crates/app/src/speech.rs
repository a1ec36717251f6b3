use std::time::Duration;

use async_trait::async_trait;
use card_dealer_core::{AnnouncementGenerator, DealerError, GeneratorConfig, Language, Result};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    speed: f32,
}

/// Announcement generator backed by an OpenAI-compatible `audio/speech`
/// endpoint. The response body is mp3.
pub struct HttpSpeechGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
    api_key: Option<String>,
}

impl HttpSpeechGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("CardDealer/0.1")
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| DealerError::generation(err.to_string()))?;
        let api_key = std::env::var(&config.api_key_env).ok().filter(|key| !key.is_empty());
        if api_key.is_none() {
            tracing::warn!(var = %config.api_key_env, "no speech api key set; generation will fail");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl AnnouncementGenerator for HttpSpeechGenerator {
    async fn generate(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DealerError::generation("missing api key"))?;
        let request = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            speed: 1.0,
        };

        debug!(text, %language, "requesting announcement");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| DealerError::generation(err.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| DealerError::generation(err.to_string()))?;
        if body.is_empty() {
            return Err(DealerError::generation("empty response body"));
        }
        Ok(body.to_vec())
    }
}
