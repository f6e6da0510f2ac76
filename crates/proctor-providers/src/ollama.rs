//! Ollama (local model) essay grader.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use proctor_core::model::EssayFeedback;
use proctor_core::traits::{
    essay_prompt, parse_essay_feedback, EssayGrader, EssayRequest, ESSAY_SYSTEM_PROMPT,
};

use crate::{http, ProviderError};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";
const DEFAULT_TIMEOUT_SECS: u64 = 300; // Local models are slower

/// Grades essays with a locally served model.
pub struct OllamaGrader {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGrader {
    pub fn new(base_url: &str, model: Option<String>) -> anyhow::Result<Self> {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        Ok(Self {
            base_url: base.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: http::client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    /// Ask Ollama to constrain the output to JSON.
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl EssayGrader for OllamaGrader {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn grade_essay(&self, request: &EssayRequest) -> anyhow::Result<EssayFeedback> {
        let body = OllamaRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: ESSAY_SYSTEM_PROMPT.to_string(),
                },
                OllamaMessage {
                    role: "user",
                    content: essay_prompt(request),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProviderError::NetworkError(format!(
                        "Ollama not reachable at {}. Is it running? Start with: ollama serve",
                        self.base_url
                    ))
                } else {
                    http::send_error(e, DEFAULT_TIMEOUT_SECS)
                }
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ProviderError::ModelNotFound(format!(
                "Model '{}' not found locally. Pull it with: ollama pull {}",
                self.model, self.model
            ))
            .into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: OllamaResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        Ok(parse_essay_feedback(&api_response.message.content)?)
    }
}
