use clap::Parser;
use crate::config::{Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

/// Publishes the API gateway topology export to the topology service.
///
/// Configuration is read from environment variables unless a YAML file is given.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(config.logging.as_ref());
    init_metrics(config.metrics.as_ref());

    // All work is sequential, a single thread is enough.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(topology::sync::run(&config.sync)) {
        Ok(summary) => {
            tracing::info!(
                sent = summary.sent(),
                failed = summary.failed(),
                "Topology sync finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Topology sync failed");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` controls verbosity, default `info`. With a DSN configured,
/// error events are also reported to Sentry.
fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.and_then(|logging| {
        match logging.sentry_dsn.parse::<sentry::types::Dsn>() {
            Ok(dsn) => Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            })),
            Err(e) => {
                eprintln!("Invalid Sentry DSN, error reporting is disabled: {e}");
                None
            }
        }
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .init();

    guard
}

fn init_metrics(metrics: Option<&MetricsConfig>) {
    let Some(metrics) = metrics else {
        return;
    };

    let builder = StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port);
    match builder.build(Some("topo_sync")) {
        Ok(recorder) => {
            if metrics::set_global_recorder(recorder).is_err() {
                tracing::warn!("A metrics recorder is already installed");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not create statsd recorder, metrics are disabled");
        }
    }
}
