// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use relational_lightning::{
    api::router,
    auth::AuthConfig,
    config::Config,
    lightning::{lnd::LndRestClient, LightningClient},
    logging::init_tracing,
    payments::{
        listener::SETTLEMENT_CHANNEL_CAPACITY, Deps, HttpWebhookSender, Reconciler,
        SettlementListener, SubscriptionTask, WebhookNotifier, WebhookSender,
    },
    state::AppState,
    storage::{LedgerDb, LEDGER_FILE},
};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(config.log_format);

    if let Err(e) = run(config).await {
        error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join(LEDGER_FILE);
    let db = Arc::new(LedgerDb::open(&db_path)?);
    info!(path = %db_path.display(), "Ledger opened");

    let lightning: Arc<dyn LightningClient> = Arc::new(LndRestClient::new(&config.lnd)?);
    info!(url = %config.lnd.rest_url, "LND REST client configured");

    let deps = Deps::new(db.clone(), lightning, config.ledger.clone());
    let sender: Arc<dyn WebhookSender> = Arc::new(HttpWebhookSender::new(config.webhook_timeout)?);
    let notifier = WebhookNotifier::new(db, sender, config.webhook_max_in_flight);

    // Background tasks
    let shutdown = CancellationToken::new();
    let tasks = TaskTracker::new();

    let (events_tx, events_rx) = mpsc::channel(SETTLEMENT_CHANNEL_CAPACITY);
    tasks.spawn(SubscriptionTask::new(&deps, events_tx).run(shutdown.clone()));
    tasks.spawn(SettlementListener::new(&deps, notifier.clone()).run(events_rx));
    tasks.spawn(
        Reconciler::new(deps.clone(), notifier.clone(), config.reconcile_interval)
            .run(shutdown.clone()),
    );
    tasks.close();

    // HTTP server
    let auth_config = AuthConfig::new(&config.jwt_secret, config.jwt_issuer.clone());
    let app = router(AppState::new(deps, notifier.clone(), auth_config));
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Relational Lightning server listening (docs at /docs)");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server failed");
    }

    // The listener drains buffered settlement events once the subscription
    // task has dropped its sender.
    shutdown.cancel();
    tasks.wait().await;
    info!("Background tasks stopped");

    if notifier.shutdown(config.shutdown_timeout).await {
        let stats = notifier.stats();
        warn!(in_flight = stats.in_flight, "Webhook deliveries abandoned at shutdown");
    }
    info!("Shutdown complete");

    served.map_err(Into::into)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
