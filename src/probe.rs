//! Single-chat probing
//!
//! [`classify`] turns a Bot API reply into a [`Status`]. [`probe_chat`]
//! drives one chat through its attempts until it reaches a verdict:
//!
//! ```text
//! Dispatched ──reply──────────────────────────▶ Terminal (classified)
//!     │ ──non-retryable transport error──────▶ Terminal (dropped)
//!     │ ──name resolution, cap reached───────▶ Terminal (dropped)
//!     └─name resolution──▶ AwaitingRetry ──delay──▶ Dispatched
//! ```

use crate::status::{ChatId, Status};
use crate::telegram::{ChatActionApi, Reply, RetryPolicy};

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Final outcome of probing one chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The chat received a status
    Classified(Status),
    /// Probing gave up without a status
    Dropped { reason: String },
}

/// What a finished probe task hands back to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub chat_id: ChatId,
    pub verdict: Verdict,
    /// Requests issued, retries included
    pub attempts: u32,
    /// Raw reply text when the chat was classified OTHER
    pub diagnostic: Option<String>,
}

enum ProbeState {
    Dispatched { attempt: u32 },
    AwaitingRetry { attempt: u32, delay: Duration },
    Terminal {
        verdict: Verdict,
        attempts: u32,
        diagnostic: Option<String>,
    },
}

/// Map a reply to its status. Pure and total.
pub fn classify(reply: &Reply) -> Status {
    match reply {
        Reply::Success(payload) => {
            let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
            let result = payload.get("result").map(is_truthy).unwrap_or(false);
            if ok && result {
                Status::Ok
            } else {
                Status::Other
            }
        }
        Reply::Rejected { description, .. } => {
            Status::from_description(description).unwrap_or(Status::Other)
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Probe one chat until it reaches a verdict
pub async fn probe_chat(api: &dyn ChatActionApi, policy: &RetryPolicy, chat_id: ChatId) -> ProbeReport {
    let mut state = ProbeState::Dispatched { attempt: 1 };

    loop {
        state = match state {
            ProbeState::Dispatched { attempt } => {
                match api.send_typing(chat_id).await {
                    Ok(reply) => {
                        let status = classify(&reply);
                        ProbeState::Terminal {
                            verdict: Verdict::Classified(status),
                            attempts: attempt,
                            diagnostic: (status == Status::Other).then(|| reply.detail()),
                        }
                    }
                    Err(err) if policy.should_retry(&err) => match policy.next_delay(attempt - 1) {
                        Some(delay) => {
                            debug!("Chat {} attempt {} failed, retrying in {:?}: {}", chat_id, attempt, delay, err);
                            ProbeState::AwaitingRetry { attempt, delay }
                        }
                        None => ProbeState::Terminal {
                            verdict: Verdict::Dropped {
                                reason: format!("name resolution failed after {} attempts: {}", attempt, err),
                            },
                            attempts: attempt,
                            diagnostic: None,
                        },
                    },
                    Err(err) => ProbeState::Terminal {
                        verdict: Verdict::Dropped { reason: err.message },
                        attempts: attempt,
                        diagnostic: None,
                    },
                }
            }
            ProbeState::AwaitingRetry { attempt, delay } => {
                tokio::time::sleep(delay).await;
                ProbeState::Dispatched { attempt: attempt + 1 }
            }
            ProbeState::Terminal {
                verdict,
                attempts,
                diagnostic,
            } => {
                return ProbeReport {
                    chat_id,
                    verdict,
                    attempts,
                    diagnostic,
                };
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{TransportError, TransportErrorKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of answers, one per call
    struct Scripted {
        answers: Mutex<VecDeque<std::result::Result<Reply, TransportError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(answers: Vec<std::result::Result<Reply, TransportError>>) -> Self {
            Scripted {
                answers: Mutex::new(answers.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatActionApi for Scripted {
        async fn send_typing(&self, _chat_id: ChatId) -> std::result::Result<Reply, TransportError> {
            *self.calls.lock() += 1;
            self.answers
                .lock()
                .pop_front()
                .expect("script exhausted")
        }
    }

    fn ok() -> std::result::Result<Reply, TransportError> {
        Ok(Reply::Success(json!({"ok": true, "result": true})))
    }

    fn dns() -> std::result::Result<Reply, TransportError> {
        Err(TransportError {
            kind: TransportErrorKind::NameResolution,
            message: "dns error: failed to lookup address information".to_string(),
        })
    }

    fn rejected(description: &str) -> Reply {
        Reply::Rejected {
            http_status: 403,
            description: description.to_string(),
        }
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(classify(&Reply::Success(json!({"ok": true, "result": true}))), Status::Ok);
        assert_eq!(classify(&Reply::Success(json!({"ok": true, "result": {}}))), Status::Ok);
        assert_eq!(classify(&Reply::Success(json!({"ok": true, "result": false}))), Status::Other);
        assert_eq!(classify(&Reply::Success(json!({"ok": false, "result": true}))), Status::Other);
        assert_eq!(classify(&Reply::Success(json!({"ok": true}))), Status::Other);
        assert_eq!(classify(&Reply::Success(json!("<html>"))), Status::Other);
    }

    #[test]
    fn test_classify_rejected() {
        assert_eq!(
            classify(&rejected("Forbidden: bot was blocked by the user")),
            Status::Blocked
        );
        assert_eq!(classify(&rejected("Bad Request: chat not found")), Status::NoChat);
        assert_eq!(classify(&rejected("some unmapped text")), Status::Other);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let replies = [
            rejected("Forbidden: user is deactivated"),
            rejected("some unmapped text"),
            Reply::Success(json!({"ok": true, "result": true})),
        ];
        for reply in &replies {
            assert_eq!(classify(reply), classify(reply));
        }
    }

    #[tokio::test]
    async fn test_probe_retries_name_resolution_then_succeeds() {
        let api = Scripted::new(vec![dns(), dns(), ok()]);
        let policy = RetryPolicy::new(1, 3, 10);

        let report = probe_chat(&api, &policy, 9).await;

        assert_eq!(report.chat_id, 9);
        assert_eq!(report.verdict, Verdict::Classified(Status::Ok));
        assert_eq!(report.diagnostic, None);
        assert_eq!(report.attempts, 3);
        assert_eq!(*api.calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_probe_drops_after_retry_cap() {
        let api = Scripted::new(vec![dns(), dns(), dns()]);
        let policy = RetryPolicy::new(1, 2, 2);

        let report = probe_chat(&api, &policy, 5).await;

        assert_eq!(report.attempts, 3);
        match report.verdict {
            Verdict::Dropped { reason } => {
                assert!(reason.starts_with("name resolution failed after 3 attempts"))
            }
            other => panic!("expected drop, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_drops_on_other_transport_error() {
        let api = Scripted::new(vec![Err(TransportError {
            kind: TransportErrorKind::Timeout,
            message: "operation timed out".to_string(),
        })]);

        let report = probe_chat(&api, &RetryPolicy::default(), 11).await;

        assert_eq!(
            report.verdict,
            Verdict::Dropped {
                reason: "operation timed out".to_string()
            }
        );
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn test_probe_classifies_rejection_without_retry() {
        let api = Scripted::new(vec![Ok(rejected("Forbidden: bot was blocked by the user"))]);

        let report = probe_chat(&api, &RetryPolicy::default(), 42).await;

        assert_eq!(report.verdict, Verdict::Classified(Status::Blocked));
        assert_eq!(report.diagnostic, None);
        assert_eq!(*api.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_unmapped_description_is_kept_as_diagnostic() {
        let api = Scripted::new(vec![Ok(rejected("Bad Request: something new"))]);

        let report = probe_chat(&api, &RetryPolicy::default(), 77).await;

        assert_eq!(report.verdict, Verdict::Classified(Status::Other));
        assert_eq!(report.diagnostic.as_deref(), Some("Bad Request: something new"));
    }

    #[tokio::test]
    async fn test_odd_success_payload_is_kept_as_diagnostic() {
        let api = Scripted::new(vec![Ok(Reply::Success(json!({"ok": true})))]);

        let report = probe_chat(&api, &RetryPolicy::default(), 78).await;

        assert_eq!(report.verdict, Verdict::Classified(Status::Other));
        assert_eq!(report.diagnostic.as_deref(), Some(r#"{"ok":true}"#));
    }
}
