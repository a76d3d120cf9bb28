//! Attune — context-aware message-delivery decision engine.
//!
//! Daemon entry point: loads configuration, wires the engine with whatever
//! collaborators the deployment registers, and runs the supervised
//! scheduler loops until shutdown.

use attune_core::config::AppConfig;
use attune_pipeline::DeliveryEngine;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "attune")]
#[command(about = "Context-aware message-delivery decision engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ATTUNE__NODE_ID")]
    node_id: Option<String>,

    /// Deferred-promotion polling interval in seconds (overrides config)
    #[arg(long, env = "ATTUNE__SCHEDULER__PROMOTION_INTERVAL_SECS")]
    promotion_interval_secs: Option<u64>,

    /// Session idle timeout in seconds (overrides config)
    #[arg(long, env = "ATTUNE__SCHEDULER__SESSION_IDLE_TIMEOUT_SECS")]
    session_idle_timeout_secs: Option<u64>,

    /// Seconds between status log lines
    #[arg(long, default_value_t = 30)]
    status_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attune=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Attune starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(interval) = cli.promotion_interval_secs {
        config.scheduler.promotion_interval_secs = interval;
    }
    if let Some(timeout) = cli.session_idle_timeout_secs {
        config.scheduler.session_idle_timeout_secs = timeout;
    }

    info!(
        node_id = %config.node_id,
        promotion_interval_secs = config.scheduler.promotion_interval_secs,
        eviction_interval_secs = config.scheduler.eviction_interval_secs,
        "Configuration loaded"
    );

    // Collaborators (context analyzer, attention provider, presentation
    // generator) are registered here by the embedding deployment; without
    // them the engine runs entirely on its fallback paths.
    let engine = DeliveryEngine::builder(config).build();
    engine.start();

    info!("Attune is ready");

    // Periodic status logging until shutdown.
    let mut status_interval =
        tokio::time::interval(std::time::Duration::from_secs(cli.status_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let status = engine.status();
                info!(
                    active_deferred = status.active_deferred,
                    ready_queue_depth = status.ready_queue_depth,
                    avg_processing_ms = status.avg_processing_ms,
                    context_integration = status.integrations.context,
                    attention_integration = status.integrations.attention,
                    "engine status"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    engine.shutdown();
    info!("Attune stopped");
    Ok(())
}
