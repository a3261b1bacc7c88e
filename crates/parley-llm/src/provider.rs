use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use parley_core::errors::GenerationError;
use parley_core::messages::{Message, Role};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The generation backend boundary: one completion per call, no automatic
/// retries. Resubmitting a failed turn is the caller's decision.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Produce one completion for the conversation history, newest turn
    /// last. The returned text is final and non-empty.
    async fn generate(&self, history: &[Message]) -> Result<String, GenerationError>;
}

/// HTTP client for a `generateContent`-style generative-language API.
/// The API key travels as a query parameter; the request is bounded by an
/// explicit timeout surfaced as `GenerationError::Timeout`.
pub struct HttpGenerationBackend {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    request_timeout: Duration,
}

impl HttpGenerationBackend {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self::with_timeout(endpoint, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        api_key: SecretString,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            endpoint: endpoint.into(),
            api_key,
            request_timeout,
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    fn name(&self) -> &str {
        "generative-language"
    }

    #[instrument(skip(self, history), fields(turns = history.len()))]
    async fn generate(&self, history: &[Message]) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            contents: history.iter().map(to_content).collect(),
        };

        let result = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return Err(GenerationError::Timeout(self.request_timeout))
            }
            Err(e) => return Err(GenerationError::Network(e.to_string())),
        };

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream { status, body });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::MalformedReply(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            // A 2xx with nothing usable is not a reply; never fabricate one.
            return Err(GenerationError::EmptyReply);
        }

        Ok(text.to_string())
    }
}

fn to_content(message: &Message) -> Content {
    // The wire protocol only knows "user" and "model"; system turns ride
    // along as user content.
    let role = match message.role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    };
    Content {
        role: role.to_string(),
        parts: vec![Part {
            text: message.content.clone(),
        }],
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}
