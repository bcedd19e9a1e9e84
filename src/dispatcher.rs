//! Bounded probe dispatcher
//!
//! Walks the chat list in order and keeps at most K probes in flight. Each
//! probe runs as its own task holding one [`RateLimiter`] permit; while the
//! dispatcher waits for a free permit it reaps finished tasks, so results are
//! recorded as soon as they land. After the last dispatch it drains every
//! outstanding task before returning.
//!
//! All run state (ledger, error log, reporter) is owned here. Probe tasks only
//! return a [`ProbeReport`]; nothing is shared with them except the API client
//! and the retry policy.

use crate::config::ProbeConfig;
use crate::error::Result;
use crate::ledger::{ErrorLog, Ledger};
use crate::probe::{probe_chat, ProbeReport, Verdict};
use crate::report::{ReportSink, Reporter};
use crate::status::ChatId;
use crate::telegram::{ChatActionApi, RateLimiter, RetryPolicy};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Scheduling knobs for one run
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum probes in flight
    pub concurrency: usize,
    /// Identifiers skipped from the head of the input
    pub start_from: usize,
    /// Minimum spacing between dispatches
    pub dispatch_delay: Duration,
    /// Render a snapshot every N settled chats
    pub report_every: usize,
    /// Recent transport errors kept
    pub error_log_capacity: usize,
}

impl From<&ProbeConfig> for DispatchOptions {
    fn from(config: &ProbeConfig) -> Self {
        DispatchOptions {
            concurrency: config.concurrency,
            start_from: config.start_from,
            dispatch_delay: Duration::from_millis(config.dispatch_delay_ms),
            report_every: config.report_every,
            error_log_capacity: config.error_log_capacity,
        }
    }
}

/// Counters for a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Chats probed
    pub total: usize,
    /// Chats that received a status
    pub classified: usize,
    /// Chats dropped without a status
    pub dropped: usize,
    /// Input entries skipped by `start_from`
    pub skipped: usize,
    /// Repeated identifiers ignored
    pub duplicates: usize,
    /// Most probes ever in flight at once
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub ledger: Ledger,
    pub error_log: ErrorLog,
    /// Raw replies of chats classified OTHER, in settle order
    pub diagnostics: Vec<(ChatId, String)>,
    pub summary: RunSummary,
}

/// Drives a chat list through the prober
pub struct Dispatcher {
    api: Arc<dyn ChatActionApi>,
    policy: Arc<RetryPolicy>,
    limiter: RateLimiter,
    options: DispatchOptions,
}

/// State owned by one run
struct RunContext {
    ledger: Ledger,
    error_log: ErrorLog,
    reporter: Reporter,
    diagnostics: Vec<(ChatId, String)>,
    /// Dispatched and not yet settled
    pending: HashSet<ChatId>,
}

impl RunContext {
    fn settle(&mut self, joined: std::result::Result<ProbeReport, JoinError>) {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                // The chat stays pending and is dropped after the drain
                error!("Probe task failed: {}", e);
                return;
            }
        };

        self.pending.remove(&report.chat_id);
        if let Some(detail) = report.diagnostic {
            warn!("Chat {} unclassified: {}", report.chat_id, detail);
            self.diagnostics.push((report.chat_id, detail));
        }
        match report.verdict {
            Verdict::Classified(status) => {
                debug!("Chat {} is {} after {} attempt(s)", report.chat_id, status, report.attempts);
                self.ledger.record(report.chat_id, status);
            }
            Verdict::Dropped { reason } => {
                warn!("Chat {} dropped: {}", report.chat_id, reason);
                self.error_log.push(format!("{} {}", report.chat_id, reason));
                self.ledger.record_dropped(report.chat_id, reason);
            }
        }
        self.reporter.observe(&self.ledger, &self.error_log);
    }
}

impl Dispatcher {
    pub fn new(api: Arc<dyn ChatActionApi>, policy: RetryPolicy, options: DispatchOptions) -> Self {
        let limiter = RateLimiter::new(options.concurrency.max(1), options.dispatch_delay);
        Dispatcher {
            api,
            policy: Arc::new(policy),
            limiter,
            options,
        }
    }

    /// Probe every chat in `chat_ids` and return the results
    ///
    /// Only returns once every dispatched probe has settled.
    pub async fn run(
        &self,
        chat_ids: impl IntoIterator<Item = ChatId>,
        sink: Box<dyn ReportSink>,
    ) -> Result<RunOutcome> {
        let started = Instant::now();

        let mut skipped = 0;
        let mut duplicates = 0;
        let mut seen = HashSet::new();
        let mut queue = Vec::new();
        for (index, chat_id) in chat_ids.into_iter().enumerate() {
            if index < self.options.start_from {
                skipped += 1;
            } else if seen.insert(chat_id) {
                queue.push(chat_id);
            } else {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warn!("Ignoring {} repeated chat IDs", duplicates);
        }

        let total = queue.len();
        info!(
            "Probing {} chats ({} skipped) with up to {} in flight",
            total, skipped, self.options.concurrency
        );

        let mut ctx = RunContext {
            ledger: Ledger::new(),
            error_log: ErrorLog::new(self.options.error_log_capacity),
            reporter: Reporter::new(self.options.report_every, total, sink),
            diagnostics: Vec::new(),
            pending: HashSet::new(),
        };
        let mut tasks = JoinSet::new();

        for chat_id in queue {
            let permit = loop {
                tokio::select! {
                    biased;
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => ctx.settle(joined),
                    permit = self.limiter.acquire() => break permit?,
                }
            };
            while let Some(joined) = tasks.try_join_next() {
                ctx.settle(joined);
            }

            ctx.pending.insert(chat_id);
            let api = Arc::clone(&self.api);
            let policy = Arc::clone(&self.policy);
            tasks.spawn(async move {
                let report = probe_chat(api.as_ref(), &policy, chat_id).await;
                drop(permit);
                report
            });
        }

        while let Some(joined) = tasks.join_next().await {
            ctx.settle(joined);
        }

        let orphans: Vec<ChatId> = ctx.pending.drain().collect();
        for chat_id in orphans {
            ctx.error_log.push(format!("{} probe task failed", chat_id));
            ctx.ledger.record_dropped(chat_id, "probe task failed");
        }
        ctx.reporter.finish(&ctx.ledger, &ctx.error_log);

        let summary = RunSummary {
            total,
            classified: ctx.ledger.len(),
            dropped: ctx.ledger.dropped().len(),
            skipped,
            duplicates,
            peak_in_flight: self.limiter.gauge().peak(),
            elapsed: started.elapsed(),
        };
        info!(
            "Finished {} chats in {:.1?}: {} classified, {} dropped",
            summary.total, summary.elapsed, summary.classified, summary.dropped
        );

        Ok(RunOutcome {
            ledger: ctx.ledger,
            error_log: ctx.error_log,
            diagnostics: ctx.diagnostics,
            summary,
        })
    }
}
