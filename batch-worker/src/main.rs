//! Consume a Kafka topic in batches, committing each batch once it is processed.
use std::sync::Arc;

use axum::Router;
use batch_consumer::kafka_reader::KafkaReader;
use batch_consumer::Consumer;
use config::Config;
use envconfig::Envconfig;
use eyre::{eyre, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod processor;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) -> Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
        _ = shutdown.cancelled() => return Ok(()),
    };

    info!("Shutting down gracefully...");
    shutdown.cancel();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env()?;

    let reader = KafkaReader::new(&config.kafka)?;
    let consumer = Arc::new(Consumer::new(reader, &config.settings));
    let data = consumer
        .data()
        .ok_or_else(|| eyre!("data channel was already taken"))?;
    let shutdown = CancellationToken::new();

    let recorder_handle = PrometheusBuilder::new().install_recorder()?;
    let app = handlers::app(
        {
            let consumer = consumer.clone();
            move || consumer.is_healthy()
        },
        Some(recorder_handle),
    );
    let bind = config.bind();
    tokio::spawn(async move {
        if let Err(e) = listen(app, bind).await {
            error!("failed to start batch-worker http server, {}", e);
        }
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = shutdown_signal(shutdown.clone()).await {
                error!("failed to register signal handlers, {}", e);
                shutdown.cancel();
            }
        }
    });

    let processing = tokio::spawn(processor::process(
        consumer.clone(),
        data,
        shutdown.clone(),
    ));

    let consumed = consumer.run(shutdown.clone()).await;
    shutdown.cancel();
    let processed = processing.await?;

    let stats = consumer.stats();
    info!(
        messages = stats.messages,
        bytes = stats.bytes,
        commits = stats.commits,
        errors = stats.errors,
        lag = stats.lag,
        "batch-worker stopped"
    );

    consumed?;
    processed?;

    Ok(())
}
