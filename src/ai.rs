//! Language-model port and the Gemini `generateContent` adapter behind it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A single stateless prompt. `system` is sent as a system instruction when present.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub system: Option<String>,
    pub text: String,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            system: None,
            text: text.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model's text response.
    async fn generate(&self, prompt: &Prompt) -> AppResult<String>;
}

/// Stand-in used when no AI credential is configured; every call fails.
pub struct UnconfiguredModel;

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn generate(&self, _prompt: &Prompt) -> AppResult<String> {
        Err(AppError::Model("no AI api key configured".into()))
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    base: String,
    model: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(base: &str, model: &str, api_key: SecretString) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    /// Builds the configured client, or [`UnconfiguredModel`] without a key.
    pub fn from_config(config: &AppConfig) -> AppResult<Arc<dyn LanguageModel>> {
        match config.google_ai_api_key.clone() {
            Some(key) => Ok(Arc::new(Self::new(
                &config.ai_api_base,
                &config.ai_model,
                key,
            )?)),
            None => {
                warn!(target: "language_model", "no AI api key configured; AI features use fallbacks");
                Ok(Arc::new(UnconfiguredModel))
            }
        }
    }

    fn endpoint(&self) -> AppResult<Url> {
        let mut url = Url::parse(&format!(
            "{}/models/{}:generateContent",
            self.base, self.model
        ))
        .map_err(|err| AppError::Config(format!("invalid AI api base: {err}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &Prompt) -> AppResult<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt.text }],
            }],
            system_instruction: prompt.system.as_deref().map(|text| Content {
                parts: vec![Part { text }],
            }),
        };

        let response = self
            .http
            .post(self.endpoint()?)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        debug!(target: "language_model", status = %status, model = %self.model, "response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Model(format!("API returned {status}: {body}")));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();
        Ok(text)
    }
}
