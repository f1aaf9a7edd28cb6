use crate::config::UpstreamConfig;
use axum::body::Bytes;
use http::StatusCode;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "sonar-pro";
pub const DEFAULT_MAX_TOKENS: u64 = 800;
pub const MAX_TOKENS_CAP: u64 = 1000;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const SEARCH_RECENCY_FILTER: &str = "month";

const MAINTENANCE_MESSAGE: &str =
    "Maaf, layanan AI sedang dalam pemeliharaan. Silakan coba lagi nanti.";
const UPSTREAM_DISRUPTION_MESSAGE: &str =
    "Maaf, sistem AI sedang mengalami gangguan. Silakan coba lagi dalam beberapa saat.";
const SERVER_FAULT_MESSAGE: &str =
    "Maaf, terjadi kesalahan pada server. Tim teknis kami sedang menangani masalah ini.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub max_tokens: u64,
    pub temperature: f64,
    pub top_p: f64,
    pub return_citations: bool,
    pub return_images: bool,
    pub return_related_questions: bool,
    pub search_recency_filter: String,
    pub stream: bool,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestShapeError {
    #[error("request body is not valid JSON")]
    NotJson,
    #[error("request body must be a JSON object")]
    NotObject,
    #[error("`messages` must be an array")]
    MessagesNotArray,
    #[error("`messages` must not be empty")]
    EmptyMessages,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedResponse {
    pub error: String,
    pub fallback: bool,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream API key is not configured")]
    MissingApiKey,
    #[error("upstream request timed out")]
    Timeout,
    #[error("failed to encode upstream request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("upstream returned an unusable body: {0}")]
    InvalidBody(String),
}

#[derive(Debug)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Bytes,
}

pub struct ChatProxy {
    client: reqwest::Client,
    chat_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
    user_agent: String,
}

impl DegradedResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            fallback: true,
            message: message.into(),
        }
    }

    pub fn internal_fault() -> Self {
        Self::new("Internal server error", SERVER_FAULT_MESSAGE)
    }
}

impl UpstreamError {
    pub fn degraded(&self) -> DegradedResponse {
        match self {
            Self::MissingApiKey => {
                DegradedResponse::new("API configuration error", MAINTENANCE_MESSAGE)
            }
            Self::Status { status, .. } => DegradedResponse::new(
                format!("API Error: {}", status.as_u16()),
                UPSTREAM_DISRUPTION_MESSAGE,
            ),
            Self::Timeout => DegradedResponse::new("Upstream timeout", SERVER_FAULT_MESSAGE),
            Self::Request(err) if err.is_timeout() => {
                DegradedResponse::new("Upstream timeout", SERVER_FAULT_MESSAGE)
            }
            Self::Encode(_) | Self::Request(_) | Self::InvalidBody(_) => {
                DegradedResponse::internal_fault()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::Timeout => "timeout",
            Self::Encode(_) => "encode",
            Self::Request(err) if err.is_timeout() => "timeout",
            Self::Request(err) if err.is_connect() => "connect",
            Self::Request(_) => "request",
            Self::Status { .. } => "status",
            Self::InvalidBody(_) => "invalid_body",
        }
    }
}

pub fn parse_chat_request(body: &[u8]) -> Result<UpstreamChatRequest, RequestShapeError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| RequestShapeError::NotJson)?;
    normalize_chat_request(&value)
}

pub fn normalize_chat_request(value: &Value) -> Result<UpstreamChatRequest, RequestShapeError> {
    let object = value.as_object().ok_or(RequestShapeError::NotObject)?;

    let messages = object
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(RequestShapeError::MessagesNotArray)?;
    if messages.is_empty() {
        return Err(RequestShapeError::EmptyMessages);
    }

    let model = object
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string();

    let max_tokens = object
        .get("max_tokens")
        .and_then(numeric_value)
        .filter(|tokens| tokens.is_finite() && *tokens >= 1.0)
        .map_or(DEFAULT_MAX_TOKENS, |tokens| {
            tokens.min(MAX_TOKENS_CAP as f64) as u64
        });

    let temperature = object
        .get("temperature")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_TEMPERATURE);

    let top_p = object
        .get("top_p")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_TOP_P);

    let return_citations = object.get("return_citations") != Some(&Value::Bool(false));

    Ok(UpstreamChatRequest {
        model,
        messages: messages.clone(),
        max_tokens,
        temperature,
        top_p,
        return_citations,
        return_images: false,
        return_related_questions: false,
        search_recency_filter: SEARCH_RECENCY_FILTER.to_string(),
        stream: false,
        presence_penalty: 0.0,
        frequency_penalty: 1.0,
    })
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl ChatProxy {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|err| format!("failed to build reqwest client: {err}"))?;

        Ok(Self {
            client,
            chat_url: config.chat_url(),
            api_key: config.api_key.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    // Deadline covers send and body read.
    pub async fn forward(
        &self,
        request: &UpstreamChatRequest,
    ) -> Result<UpstreamReply, UpstreamError> {
        let Some(api_key) = &self.api_key else {
            return Err(UpstreamError::MissingApiKey);
        };

        let body = serde_json::to_vec(request)?;
        let upstream_request = self
            .client
            .post(&self.chat_url)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.user_agent.as_str())
            .body(body);

        let deadline = tokio::time::Instant::now() + self.request_timeout;
        let response = match tokio::time::timeout_at(deadline, upstream_request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(UpstreamError::Request(err)),
            Err(_) => return Err(UpstreamError::Timeout),
        };

        let status = response.status();
        let body = match tokio::time::timeout_at(deadline, response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(err)) if status.is_success() => return Err(UpstreamError::Request(err)),
            Ok(Err(_)) => Bytes::new(),
            Err(_) if status.is_success() => return Err(UpstreamError::Timeout),
            Err(_) => Bytes::new(),
        };

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice::<serde::de::IgnoredAny>(&body)
            .map_err(|err| UpstreamError::InvalidBody(err.to_string()))?;

        Ok(UpstreamReply { status, body })
    }
}
