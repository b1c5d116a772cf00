//! hotspot-meter - resident wireless data-usage meter.
//!
//! This is the daemon entry point: it loads configuration, reloads the
//! persisted usage records, and runs the accounting engine until SIGINT or
//! SIGTERM.

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, Level};

use hotspot_meter::cli::{Args, LogLevel};
use hotspot_meter::config::{resolve_config, show_config, validate_effective_config, Config};
use hotspot_meter::meter::{Meter, MeterPolicy};
use hotspot_meter::path_watch::PathWatcher;
use hotspot_meter::runtime::MeterRuntime;
use hotspot_meter::sampler::ProcNetDevSampler;
use hotspot_meter::store::UsageStore;
use hotspot_meter::UsageAggregator;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(_config: &Config, args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    let config = resolve_config(&args)?;

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config, &args);

    info!("Starting hotspot-meter");

    let data_dir = config.data_dir();
    let store = UsageStore::open(&data_dir)
        .with_context(|| format!("failed to open usage store at {}", data_dir.display()))?;
    let aggregator = UsageAggregator::load(
        store,
        config.history_capacity(),
        config.monthly_retention(),
        config.enable_monthly(),
    );

    let sampler = ProcNetDevSampler::new(config.wireless_prefixes());
    let policy = MeterPolicy {
        debounce: config.debounce(),
        start_on_first_expensive: config.start_on_first_expensive(),
    };
    let meter = Meter::new(sampler, aggregator, policy);

    let runtime = MeterRuntime::new(meter, config.poll_interval());
    let handle = runtime.handle();

    let watcher = PathWatcher::new(config.expensive_prefixes(), config.route_poll_interval());
    let watcher_task = tokio::spawn(watcher.run(runtime.event_sender()));

    let engine_task = tokio::spawn(runtime.run());

    // Setup graceful shutdown signal handlers
    let shutdown_signal = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    };

    shutdown_signal.await;

    handle.shutdown().await;
    watcher_task.abort();
    if let Err(e) = engine_task.await {
        error!("Meter control loop task failed: {}", e);
    }

    info!("hotspot-meter stopped gracefully");
    Ok(())
}
