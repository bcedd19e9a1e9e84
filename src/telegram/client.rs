//! Bot API client
//!
//! Probes a chat by asking the Bot API to show a "typing" action in it.
//! The call has no visible side effect on reachable chats and fails with a
//! descriptive error on every other kind.

use crate::config::TelegramConfig;
use crate::error::Result;
use crate::status::ChatId;
use crate::telegram::CHAT_ACTION_METHOD;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Longest slice of a non-JSON error body kept as a description
const MAX_RAW_DESCRIPTION: usize = 240;

/// Fragments that identify a hostname lookup failure anywhere in an error chain
const NAME_RESOLUTION_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "Name or service not known",
    "nodename nor servname provided",
    "No such host is known",
];

/// What the Bot API answered to one probe
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// 2xx response; the parsed body, or the raw text as a string if it was not JSON
    Success(Value),
    /// Non-2xx response with the error description it carried
    Rejected { http_status: u16, description: String },
}

impl Reply {
    /// Human-readable form of the reply, for diagnostics
    pub fn detail(&self) -> String {
        match self {
            Reply::Success(payload) => payload.to_string(),
            Reply::Rejected { description, .. } => description.clone(),
        }
    }
}

/// Category of a failure that happened below HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The API hostname could not be resolved
    NameResolution,
    /// TCP/TLS connection could not be established
    Connect,
    /// The request timed out
    Timeout,
    Other,
}

/// Network-level failure of one probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    /// Classify a reqwest failure, keeping the bot token out of the message
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if is_name_resolution(&err) {
            TransportErrorKind::NameResolution
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };

        TransportError {
            kind,
            message: error_chain(&err),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for TransportError {}

/// Whether any error in the chain reports a failed hostname lookup
pub fn is_name_resolution(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string();
        if NAME_RESOLUTION_MARKERS.iter().any(|m| text.contains(m)) {
            return true;
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        current = e.source();
    }
    parts.join(": ")
}

/// The single Bot API call the prober needs
#[async_trait]
pub trait ChatActionApi: Send + Sync {
    /// Send a "typing" chat action to `chat_id`
    async fn send_typing(&self, chat_id: ChatId) -> std::result::Result<Reply, TransportError>;
}

/// HTTP implementation of [`ChatActionApi`]
pub struct BotApiClient {
    http: Client,
    endpoint: String,
}

impl BotApiClient {
    /// Create a client for the bot identified by `token`
    pub fn new(config: &TelegramConfig, token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(BotApiClient {
            http,
            endpoint: method_url(&config.api_base, token, CHAT_ACTION_METHOD),
        })
    }
}

/// `{base}/bot{token}/{method}`
pub fn method_url(api_base: &str, token: &str, method: &str) -> String {
    format!("{}/bot{}/{}", api_base.trim_end_matches('/'), token, method)
}

#[async_trait]
impl ChatActionApi for BotApiClient {
    async fn send_typing(&self, chat_id: ChatId) -> std::result::Result<Reply, TransportError> {
        let chat_id = chat_id.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("action", "typing"), ("chat_id", chat_id.as_str())])
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(TransportError::from_reqwest)?;
        debug!("Chat {} answered {}", chat_id, status);

        if status.is_success() {
            let payload = serde_json::from_str(&body).unwrap_or(Value::String(body));
            Ok(Reply::Success(payload))
        } else {
            Ok(Reply::Rejected {
                http_status: status.as_u16(),
                description: error_description(&body),
            })
        }
    }
}

/// `description` field of an error body, or the (truncated) raw body
fn error_description(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("description").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(MAX_RAW_DESCRIPTION).collect())
}
