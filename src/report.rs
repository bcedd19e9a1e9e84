//! Progress reporting
//!
//! The dispatcher calls [`Reporter::observe`] after every settled chat. The
//! reporter decides whether a snapshot is due and hands it to a
//! [`ReportSink`]; sinks only render, they never see the ledger itself.

use crate::ledger::{ErrorLog, Ledger};
use crate::status::Status;

use std::io::Write;
use tracing::info;

const FG_BG_RESET: &str = "\x1b[0m";
const BG_BLUE_FG_YELLOW: &str = "\x1b[44m\x1b[33m";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const LABEL_WIDTH: usize = 20;

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Dashboard rows in display order; kicked variants are merged
    pub counts: Vec<(&'static str, usize)>,
    /// Chats with a verdict, dropped included
    pub settled: usize,
    /// Chats the run will probe
    pub total: usize,
    /// Chats dropped without a status
    pub dropped: usize,
    /// Recent transport errors, oldest first
    pub errors: Vec<String>,
}

impl Snapshot {
    pub fn capture(ledger: &Ledger, error_log: &ErrorLog, total: usize) -> Self {
        let counts = Status::ALL
            .iter()
            .filter(|status| status.display_group() == **status)
            .map(|status| {
                let merged = Status::ALL
                    .iter()
                    .filter(|other| other.display_group() == *status)
                    .map(|other| ledger.count(*other))
                    .sum::<usize>();
                (status.label(), merged)
            })
            .collect();

        Snapshot {
            counts,
            settled: ledger.settled(),
            total,
            dropped: ledger.dropped().len(),
            errors: error_log.entries().map(str::to_string).collect(),
        }
    }

    /// Count shown on the row labelled `label`
    pub fn count(&self, label: &str) -> Option<usize> {
        self.counts.iter().find(|(l, _)| *l == label).map(|(_, n)| *n)
    }

    /// Rounded completion percentage
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        (100.0 * self.settled as f64 / self.total as f64).round() as u32
    }
}

/// Where snapshots go
pub trait ReportSink: Send {
    fn render(&mut self, snapshot: &Snapshot);
}

/// Decides when a snapshot is due
pub struct Reporter {
    every: usize,
    total: usize,
    last_rendered: Option<usize>,
    sink: Box<dyn ReportSink>,
}

impl Reporter {
    /// Render every `every` settled chats and once all `total` have settled
    pub fn new(every: usize, total: usize, sink: Box<dyn ReportSink>) -> Self {
        Reporter {
            every: every.max(1),
            total,
            last_rendered: None,
            sink,
        }
    }

    /// Render if the settled count hits the cadence or the total. Returns whether it rendered.
    pub fn observe(&mut self, ledger: &Ledger, error_log: &ErrorLog) -> bool {
        let settled = ledger.settled();
        if settled % self.every != 0 && settled != self.total {
            return false;
        }
        self.render(ledger, error_log)
    }

    /// Render the final state unless it was already rendered
    pub fn finish(&mut self, ledger: &Ledger, error_log: &ErrorLog) -> bool {
        self.render(ledger, error_log)
    }

    fn render(&mut self, ledger: &Ledger, error_log: &ErrorLog) -> bool {
        let settled = ledger.settled();
        if self.last_rendered == Some(settled) {
            return false;
        }
        self.last_rendered = Some(settled);
        self.sink
            .render(&Snapshot::capture(ledger, error_log, self.total));
        true
    }
}

/// Full-screen dashboard on stdout
pub struct TerminalDashboard {
    ansi: bool,
}

impl TerminalDashboard {
    /// `ansi` controls screen clearing and highlighting
    pub fn new(ansi: bool) -> Self {
        TerminalDashboard { ansi }
    }

    /// Text of one dashboard frame
    pub fn frame(&self, snapshot: &Snapshot) -> String {
        let mut rows: Vec<(String, String)> = snapshot
            .counts
            .iter()
            .map(|(label, n)| (label.to_string(), n.to_string()))
            .collect();
        if snapshot.dropped > 0 {
            rows.push(("DROPPED".to_string(), snapshot.dropped.to_string()));
        }
        rows.push((
            "TOTAL".to_string(),
            format!(
                "{} of {} ({}%)",
                snapshot.settled,
                snapshot.total,
                snapshot.percent()
            ),
        ));

        let mut out = String::new();
        if self.ansi {
            out.push_str(CLEAR_SCREEN);
        }
        for (label, value) in rows {
            let label = format!("{}:", label);
            if self.ansi {
                out.push_str(&format!(
                    "{:<width$}{} {} {}\n",
                    label,
                    BG_BLUE_FG_YELLOW,
                    value,
                    FG_BG_RESET,
                    width = LABEL_WIDTH
                ));
            } else {
                out.push_str(&format!("{:<width$} {}\n", label, value, width = LABEL_WIDTH));
            }
        }
        if !snapshot.errors.is_empty() {
            out.push('\n');
            for error in &snapshot.errors {
                out.push_str(error);
                out.push('\n');
            }
        }
        out
    }
}

impl ReportSink for TerminalDashboard {
    fn render(&mut self, snapshot: &Snapshot) {
        let frame = self.frame(snapshot);
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not stop the run
        let _ = stdout.write_all(frame.as_bytes());
        let _ = stdout.flush();
    }
}

/// Snapshots as structured log events
pub struct LogSink;

impl LogSink {
    /// Message of one progress event
    pub fn line(snapshot: &Snapshot) -> String {
        let counts = snapshot
            .counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(label, n)| format!("{}={}", label, n))
            .collect::<Vec<_>>()
            .join(" ");
        let mut line = format!("Progress {}% {}", snapshot.percent(), counts);
        if !snapshot.errors.is_empty() {
            line.push_str(&format!(" recent errors: [{}]", snapshot.errors.join("; ")));
        }
        line
    }
}

impl ReportSink for LogSink {
    fn render(&mut self, snapshot: &Snapshot) {
        info!(
            settled = snapshot.settled,
            total = snapshot.total,
            dropped = snapshot.dropped,
            "{}",
            LogSink::line(snapshot)
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Keeps every snapshot it is given
    #[derive(Clone, Default)]
    pub(crate) struct Recorder(pub Arc<Mutex<Vec<Snapshot>>>);

    impl ReportSink for Recorder {
        fn render(&mut self, snapshot: &Snapshot) {
            self.0.lock().push(snapshot.clone());
        }
    }

    #[test]
    fn test_cadence_and_final_report() {
        let recorder = Recorder::default();
        let mut reporter = Reporter::new(10, 25, Box::new(recorder.clone()));
        let mut ledger = Ledger::new();
        let log = ErrorLog::new(10);

        let mut rendered_at = Vec::new();
        for id in 0..25 {
            ledger.record(id, Status::Ok);
            if reporter.observe(&ledger, &log) {
                rendered_at.push(ledger.settled());
            }
        }
        assert!(!reporter.finish(&ledger, &log));

        assert_eq!(rendered_at, vec![10, 20, 25]);
        let settled: Vec<_> = recorder.0.lock().iter().map(|s| s.settled).collect();
        assert_eq!(settled, vec![10, 20, 25]);
    }

    #[test]
    fn test_drops_count_toward_cadence() {
        let recorder = Recorder::default();
        let mut reporter = Reporter::new(2, 3, Box::new(recorder.clone()));
        let mut ledger = Ledger::new();
        let log = ErrorLog::new(10);

        ledger.record(1, Status::Ok);
        assert!(!reporter.observe(&ledger, &log));
        ledger.record_dropped(2, "connection reset");
        assert!(reporter.observe(&ledger, &log));
        ledger.record(3, Status::Blocked);
        assert!(reporter.observe(&ledger, &log));

        let last = recorder.0.lock().last().cloned().unwrap();
        assert_eq!(last.settled, 3);
        assert_eq!(last.dropped, 1);
        assert_eq!(last.percent(), 100);
    }

    #[test]
    fn test_snapshot_merges_kicked() {
        let mut ledger = Ledger::new();
        ledger.record(1, Status::Kicked);
        ledger.record(2, Status::SupergroupKicked);
        ledger.record(3, Status::SupergroupKicked);
        ledger.record(4, Status::Ok);

        let snapshot = Snapshot::capture(&ledger, &ErrorLog::new(10), 8);

        assert_eq!(snapshot.count("KICKED"), Some(3));
        assert_eq!(snapshot.count("SG_KICKED"), None);
        assert_eq!(snapshot.count("OK"), Some(1));
        assert_eq!(snapshot.counts.len(), Status::ALL.len() - 1);
        assert_eq!(snapshot.percent(), 50);
    }

    #[test]
    fn test_plain_frame() {
        let mut ledger = Ledger::new();
        ledger.record(1, Status::Ok);
        ledger.record(2, Status::Blocked);
        ledger.record(3, Status::Blocked);
        let mut log = ErrorLog::new(10);
        log.push("4 connection reset");

        let snapshot = Snapshot::capture(&ledger, &log, 3);
        let frame = TerminalDashboard::new(false).frame(&snapshot);

        assert!(frame.starts_with("OK:                  1\n"));
        assert!(frame.contains("BLOCKED:             2\n"));
        assert!(frame.contains("TOTAL:               3 of 3 (100%)\n"));
        assert!(frame.ends_with("\n4 connection reset\n"));
        assert!(!frame.contains('\x1b'));
    }

    #[test]
    fn test_log_line_carries_error_log() {
        let mut ledger = Ledger::new();
        ledger.record(1, Status::Ok);
        ledger.record_dropped(2, "connection reset");
        let mut log = ErrorLog::new(10);
        log.push("2 connection reset");
        log.push("5 operation timed out");

        let line = LogSink::line(&Snapshot::capture(&ledger, &log, 4));

        assert_eq!(
            line,
            "Progress 50% OK=1 recent errors: [2 connection reset; 5 operation timed out]"
        );
        let quiet = LogSink::line(&Snapshot::capture(&ledger, &ErrorLog::new(10), 4));
        assert_eq!(quiet, "Progress 50% OK=1");
    }

    #[test]
    fn test_ansi_frame_highlights_values() {
        let snapshot = Snapshot::capture(&Ledger::new(), &ErrorLog::new(10), 0);
        let frame = TerminalDashboard::new(true).frame(&snapshot);

        assert!(frame.starts_with(CLEAR_SCREEN));
        assert!(frame.contains(&format!("{:<20}{} 0 {}", "OK:", BG_BLUE_FG_YELLOW, FG_BG_RESET)));
    }
}
