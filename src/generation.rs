//! Outbound calls to the generative-text provider.
//!
//! [`GeminiClient`] speaks the `generateContent` wire format. Callers depend
//! on the [`ReplyGenerator`] trait so the provider can be swapped or stubbed.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, FailureKind};

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("replygate/", env!("CARGO_PKG_VERSION"));
const REDACTED: &str = "[REDACTED]";

/// Outcome of one provider call.
pub type GenerationResult = Result<String, GenerationError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider not configured: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Provider returned status {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    Malformed(#[from] MalformedResponse),
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration(_) => FailureKind::Configuration,
            Self::Connection(_) => FailureKind::Connection,
            Self::Provider { .. } => FailureKind::Provider,
            Self::Malformed(_) => FailureKind::MalformedResponse,
        }
    }
}

/// Ways a 2xx provider body can fail to yield reply text. Each variant keeps
/// the offending node (key already redacted) for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedResponse {
    #[error("no candidates in response: {raw}")]
    EmptyCandidates { raw: String },

    #[error("first candidate has no content: {raw}")]
    MissingContent { raw: String },

    #[error("candidate content has no parts: {raw}")]
    MissingParts { raw: String },

    #[error("first part has no text: {raw}")]
    MissingText { raw: String },

    #[error("unexpected shape at {path}: expected {expected}, got {raw}")]
    UnexpectedShape {
        path: &'static str,
        expected: &'static str,
        raw: String,
    },
}

/// Provider API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for ApiKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// True for values that are missing, blank or still hold a `${...}`
/// template placeholder.
pub fn is_unresolved(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.trim().is_empty() || v.contains("${"),
    }
}

/// Where and how to reach the provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_url: Option<String>,
    pub api_key: Option<ApiKey>,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(api_url: Option<String>, api_key: Option<ApiKey>) -> Self {
        Self {
            api_url,
            api_key,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolved URL and key, or a description of what is missing.
    pub fn credentials(&self) -> Result<(&str, &ApiKey), String> {
        let url = self.api_url.as_deref();
        let key = self.api_key.as_ref();
        match (url, key) {
            (Some(url), Some(key)) if !is_unresolved(Some(url)) && !is_unresolved(Some(key.expose())) => {
                match reqwest::Url::parse(url.trim()) {
                    Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok((url.trim(), key)),
                    Ok(parsed) => Err(format!("provider URL scheme '{}' is not http(s)", parsed.scheme())),
                    Err(e) => Err(format!("provider URL is not a valid URL: {e}")),
                }
            }
            _ => Err(format!(
                "provider URL is {}, API key is {}",
                describe_setting(url),
                describe_setting(key.map(ApiKey::expose))
            )),
        }
    }
}

fn describe_setting(value: Option<&str>) -> &'static str {
    match value {
        None => "missing",
        Some(v) if v.trim().is_empty() => "empty",
        Some(v) if v.contains("${") => "an unresolved placeholder",
        Some(_) => "set",
    }
}

/// Fixed sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1000,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// `generateContent` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a str, generation_config: GenerationConfig) -> Self {
        Self {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config,
            safety_settings: HARM_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Send `prompt` to the provider and return its text.
    async fn generate(&self, prompt: &str) -> GenerationResult;

    /// Whether credentials look usable, without making a call.
    fn is_configured(&self) -> bool;
}

/// reqwest-backed client for a Gemini-style endpoint. One POST per call,
/// no retries.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: ProviderSettings,
    generation_config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(settings: ProviderSettings) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.timeout)
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e.without_url())))?;

        Ok(Self {
            http,
            settings,
            generation_config: GenerationConfig::default(),
        })
    }

    pub fn with_generation_config(mut self, generation_config: GenerationConfig) -> Self {
        self.generation_config = generation_config;
        self
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> GenerationResult {
        let (url, key) = self.settings.credentials().map_err(|detail| {
            tracing::error!(%detail, "Provider configuration invalid");
            GenerationError::Configuration(detail)
        })?;

        tracing::info!(url = %format!("{url}?key={REDACTED}"), "Calling provider");
        tracing::debug!(prompt_chars = prompt.chars().count(), "Prompt built");

        let response = self
            .http
            .post(url)
            .query(&[("key", key.expose())])
            .json(&GenerateContentRequest::new(prompt, self.generation_config))
            .send()
            .await
            .map_err(|e| {
                let timed_out = e.is_timeout();
                let e = e.without_url();
                tracing::error!(error = %e, timed_out, "Provider request failed");
                GenerationError::Connection(redact(&e.to_string(), key))
            })?;

        let status = response.status();
        tracing::info!(status = status.as_u16(), "Provider responded");

        let body = response.text().await.map_err(|e| {
            let e = e.without_url();
            tracing::error!(error = %e, "Failed to read provider response body");
            GenerationError::Connection(redact(&e.to_string(), key))
        })?;
        let body = redact(&body, key);

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), %body, "Provider returned an error status");
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        parse_reply(&body).map_err(|malformed| {
            tracing::error!(error = %malformed, raw = %body, "Could not parse provider response");
            GenerationError::Malformed(malformed)
        })
    }

    fn is_configured(&self) -> bool {
        self.settings.credentials().is_ok()
    }
}

fn redact(text: &str, key: &ApiKey) -> String {
    if key.expose().is_empty() {
        return text.to_string();
    }
    text.replace(key.expose(), REDACTED)
}

/// Pull `candidates[0].content.parts[0].text` out of a provider body.
pub fn parse_reply(body: &str) -> Result<String, MalformedResponse> {
    let root: Value = serde_json::from_str(body).map_err(|_| MalformedResponse::UnexpectedShape {
        path: "$",
        expected: "JSON object",
        raw: body.to_string(),
    })?;

    let candidates = match field(&root, "$", "candidates")? {
        None => return Err(MalformedResponse::EmptyCandidates { raw: root.to_string() }),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(unexpected("candidates", "array", other)),
    };
    let candidate = candidates
        .first()
        .ok_or_else(|| MalformedResponse::EmptyCandidates { raw: root.to_string() })?;

    let content = field(candidate, "candidates[0]", "content")?
        .ok_or_else(|| MalformedResponse::MissingContent { raw: candidate.to_string() })?;

    let parts = match field(content, "candidates[0].content", "parts")? {
        None => return Err(MalformedResponse::MissingParts { raw: content.to_string() }),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(unexpected("candidates[0].content.parts", "array", other)),
    };
    let part = parts
        .first()
        .ok_or_else(|| MalformedResponse::MissingParts { raw: content.to_string() })?;

    match field(part, "candidates[0].content.parts[0]", "text")? {
        Some(Value::String(text)) if !text.is_empty() => Ok(text.clone()),
        Some(Value::String(_)) | None => Err(MalformedResponse::MissingText { raw: part.to_string() }),
        Some(other) => Err(unexpected("candidates[0].content.parts[0].text", "string", other)),
    }
}

/// Look up `key` on an object node. Null counts as absent; a non-object
/// node is a shape error.
fn field<'a>(node: &'a Value, path: &'static str, key: &str) -> Result<Option<&'a Value>, MalformedResponse> {
    match node {
        Value::Object(map) => Ok(map.get(key).filter(|value| !value.is_null())),
        other => Err(unexpected(path, "object", other)),
    }
}

fn unexpected(path: &'static str, expected: &'static str, node: &Value) -> MalformedResponse {
    MalformedResponse::UnexpectedShape {
        path,
        expected,
        raw: node.to_string(),
    }
}
