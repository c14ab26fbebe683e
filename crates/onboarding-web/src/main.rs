//! Tenant Onboarding Web Server
//!
//! Serves the onboarding request surface and event ingest, and hosts the two
//! background loops: the event drain (loopback bus) and the validation queue
//! listener.

mod routes;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenant_onboarding::clients::{
    HttpContainerRegistry, HttpDnsRegistry, HttpNetworkAllocator, HttpObjectStorage,
    HttpProvisioningEngine, HttpSettingsService, HttpTenantDirectory, UrlSigner,
};
use tenant_onboarding::events::{ChannelPublisher, EventDrain};
use tenant_onboarding::local::sample_app_config;
use tenant_onboarding::queue::PgValidationQueue;
use tenant_onboarding::store::PgOnboardingStore;
use tenant_onboarding::{
    Backend, Collaborators, EventRouter, LocalEnvironment, OnboardingConfig, OnboardingService,
    ValidationQueueListener,
};

use crate::state::AppState;

/// Loopback bus capacity.
const EVENT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "onboarding_web=debug,tenant_onboarding=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OnboardingConfig::from_env().context("Invalid onboarding configuration")?;
    tracing::info!(
        environment = %config.environment,
        backend = ?config.backend,
        "Starting tenant onboarding server"
    );

    let bind_addr = config.bind_addr.clone();
    let (publisher, receiver) = ChannelPublisher::new(EVENT_BUFFER);
    let publisher = Arc::new(publisher);

    let service = match config.backend {
        Backend::Memory => {
            tracing::warn!("Using in-memory records, queue and collaborators");
            let env = LocalEnvironment::seeded(config, sample_app_config()).await?;
            Arc::new(env.service(publisher))
        }
        Backend::Postgres => Arc::new(postgres_service(config, publisher).await?),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let drain = EventDrain::new(receiver, Arc::new(EventRouter::new(service.clone())));
    let drain_shutdown = shutdown_rx.clone();
    let drain_task = tokio::spawn(async move { drain.run(drain_shutdown).await });

    let listener = ValidationQueueListener::new(service.clone());
    let listener_shutdown = shutdown_rx.clone();
    let listener_task = tokio::spawn(async move { listener.run(listener_shutdown).await });

    let app = routes::create_router(AppState::new(service));
    let tcp = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(tcp, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(drain_task, listener_task);
    tracing::info!("Server stopped");
    Ok(())
}

/// Postgres records and queue, HTTP collaborators.
async fn postgres_service(
    config: OnboardingConfig,
    publisher: Arc<ChannelPublisher>,
) -> anyhow::Result<OnboardingService> {
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL is required for the postgres backend")?;
    let endpoints = config
        .endpoints
        .clone()
        .context("Collaborator endpoints are required for the postgres backend")?;

    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .context("Database connection failed")?;
    tracing::info!("Database connection established");

    let signer = UrlSigner::new(config.object_store_secret.clone());
    let retry_delay = config.queue.retry_delay;
    let clients = Collaborators {
        tenants: Arc::new(HttpTenantDirectory::new(&endpoints.api)?),
        settings: Arc::new(HttpSettingsService::new(&endpoints.api)?),
        network: Arc::new(HttpNetworkAllocator::new(&endpoints.api)?),
        registry: Arc::new(HttpContainerRegistry::new(&endpoints.registry)?),
        dns: Arc::new(HttpDnsRegistry::new(&endpoints.dns)?),
        provisioning: Arc::new(HttpProvisioningEngine::new(&endpoints.provisioning)?),
        storage: Arc::new(HttpObjectStorage::new(endpoints.object_store, signer)),
    };

    Ok(OnboardingService::new(
        Arc::new(config),
        Arc::new(PgOnboardingStore::new(pool.clone())),
        Arc::new(PgValidationQueue::new(pool, retry_delay)),
        publisher,
        clients,
    ))
}
