//! claw-alertd - Clawbernetes threshold alerting daemon
//!
//! Loads rules from a JSON config file, evaluates them on a fixed interval,
//! and delivers notifications to the configured channels.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use claw_alertd::channels::{LogChannel, WEBHOOK_KINDS, WebhookChannel};
use claw_alertd::{AlertEngine, DaemonConfig, NotificationDispatcher, StaticMetricProvider};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "claw-alertd")]
#[command(about = "Clawbernetes threshold alerting daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation loop
    Run {
        /// Path to config file
        #[arg(short, long, env = "CLAW_ALERTD_CONFIG", default_value = "/etc/claw-alertd/config.json")]
        config: PathBuf,

        /// Override the evaluation interval (seconds)
        #[arg(long)]
        interval: Option<u64>,

        /// Emit logs as JSON
        #[arg(long)]
        json_logs: bool,
    },

    /// Validate a config file and print its rules
    Check {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/claw-alertd/config.json")]
        config: PathBuf,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "/etc/claw-alertd/config.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let json_logs = matches!(cli.command, Commands::Run { json_logs: true, .. });
    init_tracing(json_logs)?;

    match cli.command {
        Commands::Run {
            config, interval, ..
        } => {
            run_daemon(config, interval).await?;
        }

        Commands::Check { config } => {
            check_config(&config)?;
        }

        Commands::InitConfig { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("claw_alertd=info".parse()?);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

async fn run_daemon(config_path: PathBuf, interval: Option<u64>) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting claw-alertd");

    let config = DaemonConfig::load(&config_path)?;
    let interval = interval.map_or_else(|| config.engine.evaluation_interval(), Duration::from_secs);
    info!(
        rules = config.rules.len(),
        metrics = config.metrics.len(),
        interval_secs = interval.as_secs(),
        "loaded config"
    );

    let metrics = StaticMetricProvider::with_values(config.metrics.clone());
    let dispatcher = build_dispatcher(&config)?;
    let engine = AlertEngine::new(config.engine.clone(), Arc::new(metrics.clone()), dispatcher);

    for rule in config.rules {
        engine.add_rule(rule)?;
    }

    let cancel = CancellationToken::new();
    let reloader = tokio::spawn(reload_metrics(
        config_path,
        metrics,
        interval,
        cancel.clone(),
    ));

    engine.start(interval)?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    cancel.cancel();
    engine.shutdown().await;
    if let Err(e) = reloader.await {
        warn!(error = %e, "metric reload task failed");
    }

    let stats = engine.get_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let active = engine.get_active_alerts();
    if !active.is_empty() {
        warn!(count = active.len(), "exiting with unresolved alerts");
    }

    Ok(())
}

fn build_dispatcher(config: &DaemonConfig) -> anyhow::Result<NotificationDispatcher> {
    let webhook = Arc::new(WebhookChannel::new("http", config.engine.delivery_timeout())?);

    let mut dispatcher = NotificationDispatcher::new()
        .with_timeout(config.engine.delivery_timeout())
        .with_fallback(Arc::new(LogChannel::default()));
    for kind in WEBHOOK_KINDS {
        dispatcher.register(kind, webhook.clone());
    }
    Ok(dispatcher)
}

/// Re-reads the `metrics` section of the config file every `interval`.
async fn reload_metrics(
    path: PathBuf,
    metrics: StaticMetricProvider,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately and the values are already loaded.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match DaemonConfig::load(&path) {
            Ok(config) => metrics.replace_all(config.metrics),
            Err(e) => warn!(config = %path.display(), error = %e, "failed to reload metrics, keeping previous values"),
        }
    }
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = DaemonConfig::load(path)?;

    println!("Config OK: {}", path.display());
    println!(
        "  interval: {}s, metric timeout: {}ms, delivery timeout: {}ms",
        config.engine.evaluation_interval_secs,
        config.engine.metric_timeout_ms,
        config.engine.delivery_timeout_ms
    );
    println!("  rules: {}", config.rules.len());
    for rule in &config.rules {
        let channels: Vec<_> = rule.channels.iter().map(|c| c.display_name()).collect();
        println!(
            "    [{}] {} {} {} {} for {}s{} -> {}",
            rule.severity,
            rule.id,
            rule.metric,
            rule.condition.as_symbol(),
            rule.threshold,
            rule.duration_secs,
            if rule.enabled { "" } else { " (disabled)" },
            if channels.is_empty() {
                "(no channels)".to_string()
            } else {
                channels.join(", ")
            }
        );
    }
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    DaemonConfig::sample().save(output)?;
    println!("Config written to: {}", output.display());
    println!("Edit the rules and channels, then run: claw-alertd run --config {}", output.display());
    Ok(())
}
