//! kube-sentry-events: forward Kubernetes cluster events to Sentry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use kube_sentry_events::config::Config;
use kube_sentry_events::dedup::Deduplicator;
use kube_sentry_events::filter::EventFilter;
use kube_sentry_events::sink::{DryRunSink, EventSink, SentrySink, LOG_TARGET};
use kube_sentry_events::watcher::{create_client, EventPipeline, EventWatcher};

/// How long the final flush may block at shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Forward Kubernetes cluster events to Sentry as logs and issues.
#[derive(Parser)]
#[command(name = "kube-sentry-events", version)]
struct Cli {
    /// Print emission decisions to stdout instead of sending to Sentry
    #[arg(long)]
    dry_run: bool,

    /// Path to kubeconfig file (defaults to in-cluster config or ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// List matching events once and exit (don't watch)
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(cli.dry_run).context("failed to load configuration")?;

    // The Sentry client must exist before the subscriber is installed so
    // the tracing layer can hand observability records to it.
    let sink: Arc<dyn EventSink> = if cli.dry_run {
        Arc::new(DryRunSink::new(std::io::stdout()))
    } else {
        Arc::new(
            SentrySink::new(&config.sentry_dsn, &config.sentry_environment, config.enable_logs)
                .context("failed to initialize Sentry")?,
        )
    };

    init_tracing(&config.log_level, cli.dry_run);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dry_run = cli.dry_run,
        once = cli.once,
        environment = %config.sentry_environment,
        namespaces = ?config.namespaces,
        exclude_namespaces = ?config.exclude_namespaces,
        event_reasons = ?config.event_reasons,
        dedup_window = %config.dedup_window,
        "starting kube-sentry-events"
    );
    if cli.dry_run {
        info!("dry-run mode enabled, emission decisions will be printed to stdout");
    } else if config.enable_logs {
        info!("sentry logs enabled - all accepted events will be logged for observability");
    }

    let filter = EventFilter::new(
        &config.namespaces,
        &config.exclude_namespaces,
        &config.event_reasons,
        config.event_thresholds.clone(),
    );
    let dedup = Deduplicator::new(config.dedup_window);
    dedup.spawn_sweeper();

    let client = create_client(cli.kubeconfig.as_deref())
        .await
        .context("failed to create watcher")?;
    let pipeline = EventPipeline::new(filter, dedup, Arc::clone(&sink));
    let watcher = EventWatcher::new(client, pipeline);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    if cli.once {
        watcher.list_once().await?;
    } else {
        watcher.run(cancel).await?;
    }

    info!("flushing pending records");
    if sink.flush(FLUSH_TIMEOUT) {
        info!("all records flushed");
    } else {
        warn!("some records may not have been sent (flush timeout)");
    }

    info!("shutdown complete");
    Ok(())
}

/// Install the tracing subscriber.
///
/// Dry-run keeps human-readable text on stderr (stdout belongs to the
/// dry-run record stream); otherwise logs are JSON on stdout and the
/// sentry layer forwards observability records and breadcrumbs.
fn init_tracing(level: &str, dry_run: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    if dry_run {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let sentry_layer = sentry_tracing::layer().event_filter(|metadata| {
            if metadata.target() == LOG_TARGET {
                // Observability records become Sentry Logs.
                sentry_tracing::EventFilter::Log
            } else if *metadata.level() <= Level::WARN {
                sentry_tracing::EventFilter::Breadcrumb
            } else {
                sentry_tracing::EventFilter::Ignore
            }
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout))
            .with(sentry_layer)
            .init();
    }
}

fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("received SIGTERM, shutting down gracefully");
        },
    }
}
