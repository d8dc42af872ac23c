//! Deal Watcher - Headless Server
//!
//! Polls the deals feed on two cadences and posts newly discovered deals
//! to Telegram.

mod config;
mod scheduler;

use clap::Parser;
use config::{ensure_json_path, load_filter_config, ConfigError, EnvSettings};
use scheduler::{CycleSettings, DealSink, DealSource, Scheduler};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use deals_alerts::{Notifier, NotifierConfig, TelegramClient};
use deals_core::AgeMode;
use deals_engine::{run_snapshot_loop, SeenStore, SNAPSHOT_INTERVAL};
use deals_feeds::{DealFeed, ProxyRotatedClient, DEFAULT_TIMEOUT};

/// Deal Watcher CLI
#[derive(Parser, Debug)]
#[command(name = "deal-watcher")]
#[command(about = "Watches the deals feed and posts new deals to Telegram", long_about = None)]
struct Args {
    /// Filter configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Seen-set file path
    #[arg(short, long, default_value = "data.json")]
    data: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log alerts instead of sending them
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Deal age: new, old
    #[arg(long, default_value = "new")]
    age: AgeMode,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Everything the running watcher needs, built from config and environment.
struct App {
    scheduler: Arc<Scheduler>,
    seen: Arc<SeenStore>,
    data_path: PathBuf,
}

async fn build_app(args: &Args, env: EnvSettings) -> Result<App, ConfigError> {
    ensure_json_path(&args.data)?;
    let filters = Arc::new(load_filter_config(&args.config)?);
    let seen = Arc::new(SeenStore::load(&args.data).await?);

    if env.proxies.is_empty() {
        warn!("DEAL_PROXIES is empty, fetching without a proxy");
    }
    let client = ProxyRotatedClient::from_proxies(&env.proxies, DEFAULT_TIMEOUT)?;
    info!(pool_size = client.pool_size(), "Proxy pool ready");
    let feed = DealFeed::new(client, &env.feed_url)?;

    let notifier = if args.dry_run {
        Notifier::dry_run(env.chat_id.clone().unwrap_or_default())
    } else {
        let telegram = TelegramClient::new(env.require_bot_token()?)?;
        Notifier::new(
            Some(telegram),
            NotifierConfig {
                default_chat_id: env.require_chat_id()?.to_string(),
                dry_run: false,
            },
        )
    };

    let source: Arc<dyn DealSource> = Arc::new(feed);
    let sink: Arc<dyn DealSink> = Arc::new(notifier);
    let scheduler = Arc::new(Scheduler::new(
        source,
        sink,
        seen.clone(),
        filters,
        args.age,
    ));

    Ok(App {
        scheduler,
        seen,
        data_path: args.data.clone(),
    })
}

/// Resolve on Ctrl+C or SIGTERM, naming the signal.
///
/// The SIGTERM handler is installed before this returns, so a signal
/// delivered while the future is pending is not lost.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    })
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Deal Watcher starting...");
    info!("  Config: {}", args.config.display());
    info!("  Data: {}", args.data.display());
    info!("  Age: {:?}", args.age);
    info!("  Dry Run: {}", args.dry_run);

    let app = match EnvSettings::from_env() {
        Ok(env) => build_app(&args, env).await,
        Err(e) => Err(e),
    };
    let app = match app {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let snapshot_handle = tokio::spawn(run_snapshot_loop(
        app.seen.clone(),
        app.data_path.clone(),
        SNAPSHOT_INTERVAL,
        shutdown_rx.clone(),
    ));
    let priority_handle = app
        .scheduler
        .spawn(CycleSettings::priority(), shutdown_rx.clone());
    let regular_handle = app.scheduler.spawn(CycleSettings::regular(), shutdown_rx);

    // Handle shutdown
    info!("Press Ctrl+C to stop...");

    match shutdown_signal() {
        Ok(signal) => {
            let name = signal.await;
            warn!(signal = name, "Shutdown signal received");
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            warn!("Shutdown signal received");
        }
    }
    let _ = shutdown_tx.send(true);

    // Let in-flight iterations finish, then abort
    for handle in [priority_handle, regular_handle] {
        let abort = handle.abort_handle();
        if tokio::time::timeout(Duration::from_secs(15), handle).await.is_err() {
            warn!("Discovery cycle did not stop in time, aborting");
            abort.abort();
        }
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), snapshot_handle).await;

    match app.seen.persist(&app.data_path).await {
        Ok(count) => info!(count, "Final seen-set saved"),
        Err(e) => error!(error = %e, "Failed to save seen-set on shutdown"),
    }

    info!("Deal Watcher stopped");
}
