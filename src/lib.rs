//! tgaudit - Telegram chat deliverability audit
//!
//! This library probes a list of chat IDs through the Bot API and sorts
//! each chat into a closed set of statuses (reachable, blocked, kicked,
//! deleted, ...), keeping a bounded number of requests in flight.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod input;
pub mod ledger;
pub mod probe;
pub mod report;
pub mod status;
pub mod telegram;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dispatcher::{DispatchOptions, Dispatcher, RunOutcome, RunSummary};
    pub use crate::error::{Error, Result};
    pub use crate::status::{ChatId, Status};
}
