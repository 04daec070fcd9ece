//! Gateway to the external text-generation service.
//!
//! The host asks for text with a `run_ai` event; the reply goes back as a
//! `simulate_text` action. Only one call is live at a time: starting a new
//! one cancels the previous call together with its deadline.

use crate::config::{AiEndpointConfig, ConfigSnapshot};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Token in the global prompt template that receives the per-mapping prompt
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("No API Key")]
    MissingCredential,

    #[error("Request timed out ({}s)", .0.as_secs())]
    Timeout(Duration),

    /// Provider answered with a non-2xx status. `message` is the provider's
    /// own error text when it sent one, `HTTP <status>` otherwise.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Connection or body failure. Never carries the request URL.
    #[error("{0}")]
    Transport(#[source] reqwest::Error),

    #[error("Superseded by a newer request")]
    Superseded,
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Transport(e.without_url())
    }
}

/// One generation call as handed to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub api_key: String,
    pub prompt: String,
}

/// Backend that turns a prompt into text
pub trait TextGenerator: Send + Sync + 'static {
    fn model(&self) -> &str;

    fn generate(
        &self,
        request: GenerateRequest,
    ) -> impl Future<Output = Result<String, AiError>> + Send;
}

/// Substitute the prompt into the template's first placeholder. A template
/// without one is sent as is.
pub fn compose_prompt(template: &str, prompt: &str) -> String {
    template.replacen(PROMPT_PLACEHOLDER, prompt, 1)
}

/// Header the credential travels in, so it stays out of URLs
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Generative Language `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &AiEndpointConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing [`reqwest::Client`]
    pub fn with_client(client: reqwest::Client, config: &AiEndpointConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl TextGenerator for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, AiError> {
        let body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": request.prompt }]
            }]
        });

        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, request.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(ErrorEnvelope::into_message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(AiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let reply: GenerateContentResponse = response.json().await?;
        Ok(reply.into_first_text())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ErrorEnvelope {
    fn into_message(self) -> Option<String> {
        self.error
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// First candidate's first text part; anything missing reads as empty
    fn into_first_text(self) -> String {
        self.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|p| p.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default()
    }
}

/// Deadline-bound, cancel-and-replace front for a `TextGenerator`
pub struct AiGateway<G> {
    generator: Arc<G>,
    timeout: Duration,
    generation: watch::Sender<u64>,
}

impl<G: TextGenerator> AiGateway<G> {
    pub fn new(generator: G, timeout: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            generator: Arc::new(generator),
            timeout,
            generation,
        }
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Prepare a call for `prompt` using the mirrored host settings.
    ///
    /// Fails straight away, without touching the network, when no API key is
    /// configured. Otherwise the call claims the gateway right here, before
    /// the returned future is first polled: any call still in flight resolves
    /// to `Superseded` and its deadline goes with it.
    pub fn request(
        &self,
        prompt: &str,
        settings: &ConfigSnapshot,
    ) -> Result<impl Future<Output = Result<String, AiError>> + Send + 'static + use<G>, AiError> {
        if settings.ai_api_key.is_empty() {
            return Err(AiError::MissingCredential);
        }

        let request = GenerateRequest {
            api_key: settings.ai_api_key.clone(),
            prompt: compose_prompt(&settings.ai_global_prompt, prompt),
        };

        let mut token = 0;
        self.generation.send_modify(|current| {
            *current += 1;
            token = *current;
        });
        let mut newer = self.generation.subscribe();
        let generator = Arc::clone(&self.generator);
        let timeout = self.timeout;
        debug!("AI call {} started", token);

        Ok(async move {
            let call = tokio::time::timeout(timeout, generator.generate(request));
            tokio::select! {
                result = call => result.unwrap_or(Err(AiError::Timeout(timeout))),
                _ = superseded(&mut newer, token) => {
                    debug!("AI call {} superseded", token);
                    Err(AiError::Superseded)
                }
            }
        })
    }
}

/// Resolves once a call newer than `token` has started
async fn superseded(rx: &mut watch::Receiver<u64>, token: u64) {
    while rx.changed().await.is_ok() {
        if *rx.borrow_and_update() != token {
            return;
        }
    }
    // gateway dropped; nothing can supersede this call any more
    std::future::pending::<()>().await
}
