//! Telegram Bot API module
//!
//! Handles all communication with the Bot API including:
//! - Issuing the chat-action probe over HTTP
//! - Classifying network failures
//! - Concurrency limiting and retry logic

mod client;
mod rate_limit;

pub use client::{
    is_name_resolution, method_url, BotApiClient, ChatActionApi, Reply, TransportError,
    TransportErrorKind,
};
pub use rate_limit::{InFlightGauge, ProbePermit, RateLimiter, RetryPolicy};

/// Public Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API method used as the probe
pub const CHAT_ACTION_METHOD: &str = "sendChatAction";
