use anyhow::Context;
use runq_core::dto::worker::RegisterWorker;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod accountant;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod links;
pub mod pool;
pub mod queue;
pub mod selection;
pub mod task;

#[cfg(test)]
mod testing;

use crate::collaborators::Collaborators;
use crate::collaborators::http::{HttpBuildTrigger, HttpProjectProvider, HttpWorkspaceProvider};
use crate::config::SchedulerConfig;
use crate::events::BroadcastEventBus;
use crate::pool::HttpConnector;
use crate::queue::RunQueue;

const EVENT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runq_scheduler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Runq Scheduler...");

    let config = SchedulerConfig::from_env()?;
    config.validate()?;

    let client = reqwest::Client::builder()
        .timeout(config.worker_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let events = Arc::new(BroadcastEventBus::new(EVENT_BUFFER));
    let event_logger = events::spawn_event_logger(events.subscribe());

    let collaborators = Collaborators {
        projects: Arc::new(HttpProjectProvider::new(&config.project_api_url, client.clone())),
        workspaces: Arc::new(HttpWorkspaceProvider::new(
            &config.workspace_api_url,
            client.clone(),
        )),
        builder: Arc::new(HttpBuildTrigger::new(&config.builder_api_url, client.clone())),
        events: events.clone(),
    };

    let addr = config.bind_addr.clone();
    let workers = config.workers.clone();
    let queue = Arc::new(RunQueue::new(
        config,
        Arc::new(HttpConnector::new(client)),
        collaborators,
    ));
    queue.start();

    for address in workers {
        let req = RegisterWorker {
            address: address.clone(),
            infra: None,
            workspace: None,
            project: None,
        };
        if let Err(e) = queue.register_worker(req).await {
            tracing::warn!("Failed to register worker {}: {}", address, e);
        }
    }

    // Build router with all API endpoints
    let app = api::create_router(Arc::clone(&queue));

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    tracing::info!("Shutting down...");
    queue.shutdown().await;
    event_logger.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
