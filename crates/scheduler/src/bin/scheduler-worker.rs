//! scheduler-worker: polls connpass for every active rule and sends
//! notifications on a fixed interval.
//!
//! Modes:
//! - default: run every `SCHEDULER_POLL_INTERVAL` until ctrl-c
//! - `--once`: a single run, non-zero exit on failure
//! - `--status`: print the last run status as JSON
//! - `--test-channel <id>`: send a test message and exit

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use radar_core::config::{load_dotenv, Config};
use radar_core::RadarError;
use radar_notify::{DiscordNotifier, Notifier, WebhookNotifier};
use radar_scheduler::{ConnpassClient, RateGate, Scheduler};
use radar_storage::{connect_with_retry, migrate, LogStore, PgStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Event radar scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "scheduler-worker", version, about)]
struct Cli {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "RADAR_PROFILE", default_value = "")]
    profile: String,

    /// Perform a single run and exit.
    #[arg(long, conflicts_with_all = ["status", "test_channel"])]
    once: bool,

    /// Print the scheduler status as JSON and exit.
    #[arg(long, conflicts_with = "test_channel")]
    status: bool,

    /// Send a test notification to this channel id and exit.
    #[arg(long, value_name = "CHANNEL_ID")]
    test_channel: Option<String>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::for_profile(&cli.profile)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                cancel.cancel();
            }
        });
    }

    if cli.status {
        if config.database.url.is_empty() {
            anyhow::bail!("DATABASE_URL is required");
        }
        let pool = connect_with_retry(&config.database, &cancel).await?;
        let store = PgStore::new(pool);
        let status = store.status().await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    config.validate()?;
    config.log_summary();

    let pool = connect_with_retry(&config.database, &cancel).await?;
    migrate(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url, config.webhook_headers.clone())?),
        None => Arc::new(DiscordNotifier::from_config(&config.discord)?),
    };
    info!(channel = notifier.channel_name(), "Messaging channel ready");

    let gate = Arc::new(RateGate::new(config.connpass.request_interval));
    let source = Arc::new(ConnpassClient::new(&config.connpass, gate)?);
    let scheduler = Scheduler::new(store, source, notifier, &config.scheduler);

    if let Some(channel_id) = cli.test_channel {
        scheduler.test_channel(&channel_id).await?;
        info!(channel_id, "Test notification sent");
        return Ok(());
    }

    if cli.once {
        return match scheduler.run_once(&cancel).await {
            Ok(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
            Err(RadarError::Cancelled) => {
                warn!("Run cancelled");
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
    }

    info!(interval = ?config.scheduler.poll_interval, "scheduler-worker starting");
    scheduler
        .run_periodic(config.scheduler.poll_interval, &cancel)
        .await;
    info!("scheduler-worker exited cleanly");
    Ok(())
}
