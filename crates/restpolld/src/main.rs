use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use restpolld::api;
use restpolld::config::LoggingConfig;
use restpolld::format_diagnostics;
use restpolld::Config;
use restpolld::Engine;
use restpolld::JinjaRenderer;
use restpolld::Poller;
use restpolld::ReqwestFetch;

/// Polls JSON HTTP endpoints and republishes them as sensors
#[derive(Debug, Parser)]
#[command(name = "restpolld", version)]
struct Args {
    /// Configuration file(s); may be given multiple times, merged first-wins
    #[arg(short, long = "config", default_value = "restpolld.toml")]
    config: Vec<PathBuf>,

    /// Validate the configuration and exit without polling
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration before logging is up; diagnostics go to stderr
    let (config, diagnostics) = match Config::from_files(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&diagnostics));
    }

    if args.check {
        println!("Configuration OK: {} sensor(s)", config.sensors.len());
        return Ok(());
    }

    init_tracing(&config.logging);

    tracing::info!("restpolld starting");
    tracing::info!(
        "Loaded config from: {}",
        args.config
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut engine = Engine::new();

    for (id, sensor) in &config.sensors {
        tracing::info!(
            "Starting sensor poller: {} ({}, every {}s)",
            id,
            sensor.url,
            sensor.scan_interval.as_secs()
        );

        let fetch = ReqwestFetch::new(sensor.timeout)
            .with_context(|| format!("failed to build HTTP client for sensor '{}'", id))?;
        let poller = Poller::new(
            id.clone(),
            sensor.clone(),
            Box::new(fetch),
            Box::new(JinjaRenderer::new()),
        )
        .with_context(|| format!("failed to build poller for sensor '{}'", id))?;

        engine.register_poller(poller);
    }

    let engine = Arc::new(engine);

    // Engine run loop applies poll outcomes to the state snapshot
    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.run().await;
        })
    };

    // Published value surface
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = if config.api.enabled {
        let listen = config.api.listen.clone();
        let port = config.api.port;
        let engine = engine.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(listen, port, engine, shutdown_rx).await {
                tracing::error!("HTTP API server error: {}", e);
            }
        }))
    } else {
        tracing::info!("HTTP API disabled by configuration");
        None
    };

    // Wait for Ctrl+C
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    // Shut down the API gracefully, then stop applying poll outcomes
    let _ = shutdown_tx.send(());
    if let Some(task) = api_task {
        if let Err(e) = task.await {
            tracing::error!("HTTP API task error: {}", e);
        }
    }
    engine_task.abort();

    tracing::info!("restpolld shutdown complete");

    Ok(())
}

/// Initialize the fmt subscriber with the configured default level and
/// per-target overrides
fn init_tracing(logging: &LoggingConfig) {
    let mut targets = Targets::new().with_default(logging.level);

    for (target, level) in &logging.overrides {
        targets = targets.with_target(target.as_str(), *level);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(targets)
        .init();
}
