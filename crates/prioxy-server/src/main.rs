use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prioxy_common::Config;
use prioxy_gateway::serve;
use prioxy_scheduler::{QueueManager, Scheduler};
use prioxy_telemetry::{InfluxSink, NullSink, TelemetrySink};
use prioxy_upstream::OpenAIClient;

#[derive(Parser)]
#[command(name = "prioxy")]
#[command(about = "Priority-preemption reverse proxy for OpenAI-compatible APIs", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load_from_file(&cli.config)?;
    config.validate().context("invalid configuration")?;

    let forwarder = Arc::new(OpenAIClient::new(
        &config.openai_api_url,
        &config.openai_api_key,
    ));
    let telemetry: Arc<dyn TelemetrySink> = if config.influxdb_url.is_empty() {
        info!("no influxdb_url configured, telemetry disabled");
        Arc::new(NullSink)
    } else {
        Arc::new(InfluxSink::new(
            &config.influxdb_url,
            &config.influx_token,
            &config.influx_org,
            &config.influx_bucket,
        ))
    };

    let manager = Arc::new(QueueManager::new(&config.endpoints));
    let scheduler = Scheduler::new(manager.clone(), forwarder, telemetry);

    let shutdown = CancellationToken::new();
    let scheduler_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });
    let mut server_task = tokio::spawn({
        let endpoints = config.endpoints.clone();
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        async move { serve(&endpoints, manager, shutdown).await }
    });

    info!("proxy running with preemption prioritization");
    tokio::select! {
        _ = shutdown_signal() => info!("shutting down"),
        result = &mut server_task => {
            // The listeners went away on their own (e.g. a bind failure).
            shutdown.cancel();
            scheduler_task.await.ok();
            result??;
            return Ok(());
        }
    }

    shutdown.cancel();
    scheduler_task.await.ok();
    server_task.await??;
    info!("servers stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(err) => {
                    tracing::error!("failed to install SIGTERM handler: {err}");
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
