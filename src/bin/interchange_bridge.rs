//! interchange-bridge
//!
//! Subscribes to the ledger event feed, answers IMs addressed to this
//! participant and serves the local engine's task queue until the feed
//! closes, the transport fails or a PIIS cannot be published.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use interchange_bridge::bus::{websocket, EventListener, ListenerError};
use interchange_bridge::clients::{
    http_client, HttpLedgerClient, HttpMessageRegistry, HttpWorkflowEngine, WorkflowEngine,
};
use interchange_bridge::config::Config;
use interchange_bridge::sagas::{ImCorrelationSaga, ReplayGuard};
use interchange_bridge::utils::bootstrap::{init_tracing, parse_config_path};
use interchange_bridge::utils::retry::connection_backoff;
use interchange_bridge::workers::spawn_workers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        process_id = %config.participant.process_id,
        participant_id = %config.participant.participant_id,
        role = %config.participant.subscriber_role,
        "Starting interchange bridge"
    );

    let http = http_client(config.http.timeout())?;
    let registry = Arc::new(HttpMessageRegistry::new(
        http.clone(),
        config.ledger.api_url.as_str(),
    )?);
    let ledger = Arc::new(HttpLedgerClient::new(
        http.clone(),
        config.ledger.api_url.as_str(),
    )?);
    let engine: Arc<dyn WorkflowEngine> = Arc::new(HttpWorkflowEngine::new(
        http,
        config.workflow.address.as_str(),
    )?);

    let mut saga = ImCorrelationSaga::new(
        config.participant.clone(),
        registry,
        ledger,
        engine.clone(),
    )
    .with_publish_config(config.publish.clone());
    if config.dispatch.dedupe_replays {
        info!("Replay guard enabled");
        saga = saga.with_replay_guard(Arc::new(ReplayGuard::new()));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = spawn_workers(engine, &config.workflow, shutdown_rx);
    info!(job_types = ?config.workflow.job_types, "Job workers started");

    let outcome = listen(&config, saga).await;

    let _ = shutdown_tx.send(true);
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Job worker task failed");
        }
    }

    outcome.map_err(|e| {
        error!(error = %e, "Interchange bridge stopped");
        e.into()
    })
}

/// Connect to the event feed and run the listener until it stops or ctrl-c.
async fn listen(config: &Config, saga: ImCorrelationSaga) -> Result<(), ListenerError> {
    let frames = websocket::connect_with_retry(&config.ledger, connection_backoff()).await?;

    let listener = EventListener::new(Arc::new(saga), config.dispatch.max_in_flight);

    tokio::select! {
        result = listener.run(frames) => {
            let stats = result?;
            info!(?stats, "Ledger event stream closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }
    Ok(())
}
