//! PokeSync Ingest Service Entry Point
//!
//! Loads configuration, connects the store, then runs the consumer loop, the
//! poison reprocessor and the observability endpoints until Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;

use pokesync_ingest::consumer::KafkaConsumerFactory;
use pokesync_ingest::telemetry::{init_tracer, serve, ServerState, TelemetryConfig};
use pokesync_ingest::{
    reprocess_task, run_consumer_loop, IngestConfig, IngestMetrics, MessageHandler, PoisonStore,
    Readiness,
};
use pokesync_storage::PgStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let telemetry_config = TelemetryConfig::from_env();
    if let Err(e) = init_tracer(&telemetry_config) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let config = match IngestConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match PgStore::from_config(&config.db) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create database pool");
            return ExitCode::FAILURE;
        }
    };

    let metrics = match IngestMetrics::new() {
        Ok(metrics) => metrics,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register metrics");
            return ExitCode::FAILURE;
        }
    };

    let handler = Arc::new(MessageHandler::with_unowned_field(
        Arc::clone(&store),
        config.unowned_field.clone(),
    ));
    let poison = Arc::new(PoisonStore::new(config.poison_file.clone()));
    let readiness = Readiness::new(store.clone());

    let cancel = CancellationToken::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reprocessor = tokio::spawn(reprocess_task(
        Arc::clone(&poison),
        Arc::clone(&handler),
        config.reprocess.clone(),
        Some(metrics.clone()),
        shutdown_rx,
    ));

    let server = tokio::spawn(serve(
        config.http_addr,
        ServerState {
            readiness: readiness.clone(),
            metrics: metrics.clone(),
        },
        cancel.clone(),
    ));

    let consumer = {
        let factory = KafkaConsumerFactory::new(config.bus.clone());
        let bus = config.bus.clone();
        let handler = Arc::clone(&handler);
        let poison = Arc::clone(&poison);
        let metrics = metrics.clone();
        let readiness = readiness.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_consumer_loop(
                &factory,
                &bus,
                handler.as_ref(),
                &poison,
                &metrics,
                &readiness,
                cancel,
            )
            .await;
        })
    };

    tracing::info!(
        topic = %config.bus.topic,
        poison_file = %config.poison_file.display(),
        http_addr = %config.http_addr,
        "PokeSync ingest started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let _ = shutdown_tx.send(true);

    let mut exit = ExitCode::SUCCESS;
    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "Consumer task panicked");
        exit = ExitCode::FAILURE;
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Observability server failed");
            exit = ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!(error = %e, "Observability server task panicked");
            exit = ExitCode::FAILURE;
        }
    }
    match reprocessor.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                passes = snapshot.passes,
                lines_recovered = snapshot.lines_recovered,
                "Reprocessor stopped"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Reprocess task panicked");
            exit = ExitCode::FAILURE;
        }
    }

    exit
}
