//! tgaudit - Telegram chat deliverability audit
//!
//! Usage:
//!   tgaudit <TOKEN> <INPUT>    - Probe every chat in INPUT (.json or .txt)

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tgaudit::{
    config::Config,
    dispatcher::{DispatchOptions, Dispatcher},
    input::load_chat_ids,
    report::{LogSink, ReportSink, TerminalDashboard},
    status::Status,
    telegram::{BotApiClient, RetryPolicy},
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tgaudit")]
#[command(author = "tgaudit Contributors")]
#[command(version)]
#[command(about = "Check which Telegram chats a bot can still reach")]
struct Cli {
    /// Bot token from @BotFather
    token: String,

    /// Chat list: JSON array (.json) or one ID per line (.txt)
    input: PathBuf,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum requests in flight
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Skip this many chats from the start of the list
    #[arg(long)]
    skip: Option<usize>,

    /// Refresh the dashboard every N chats
    #[arg(long)]
    report_every: Option<usize>,

    /// Bot API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Print the dashboard without clearing the screen or colors
    #[arg(long)]
    plain: bool,

    /// Report progress as log events on stderr instead of the dashboard
    #[arg(long, conflicts_with = "plain")]
    log_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging; stdout belongs to the dashboard
    let log_level = if cli.verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    let chat_ids = load_chat_ids(&cli.input)?;
    info!("Loaded {} chat IDs from {:?}", chat_ids.len(), cli.input);

    let client = BotApiClient::new(&config.telegram, &cli.token)
        .context("Failed to build Bot API client")?;
    let policy = RetryPolicy::new(
        config.probe.retry_min_delay_ms,
        config.probe.retry_max_delay_ms,
        config.probe.max_retries,
    );
    let dispatcher = Dispatcher::new(
        Arc::new(client),
        policy,
        DispatchOptions::from(&config.probe),
    );

    let sink: Box<dyn ReportSink> = if cli.log_progress {
        Box::new(LogSink)
    } else {
        Box::new(TerminalDashboard::new(!cli.plain))
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let outcome = runtime.block_on(dispatcher.run(chat_ids, sink))?;

    let summary = &outcome.summary;
    println!();
    println!("Reachable: {} of {}", outcome.ledger.count(Status::Ok), summary.total);
    if summary.dropped > 0 {
        println!("Dropped (network errors): {}", summary.dropped);
    }
    if summary.skipped > 0 || summary.duplicates > 0 {
        println!(
            "Skipped: {}, duplicates ignored: {}",
            summary.skipped, summary.duplicates
        );
    }
    println!("Elapsed: {:.1?}", summary.elapsed);

    Ok(())
}

/// Defaults < config file < environment < flags
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = expand_tilde(path);
            Config::load(&path).with_context(|| format!("Config {:?}", path))?
        }
        None => Config::from_env()?,
    };

    if let Some(concurrency) = cli.concurrency {
        config.probe.concurrency = concurrency;
    }
    if let Some(skip) = cli.skip {
        config.probe.start_from = skip;
    }
    if let Some(every) = cli.report_every {
        config.probe.report_every = every;
    }
    if let Some(base) = &cli.api_base {
        config.telegram.api_base = base.trim_end_matches('/').to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
