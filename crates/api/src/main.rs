//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{Collaborators, SharedGateway};
use checkout::{
    HttpPaymentGateway, InMemoryAddressBook, InMemoryCatalog, InMemoryPaymentGateway,
    PaymentGatewayAdapter, SignatureVerifier,
};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn collaborators(config: &Config) -> Result<Collaborators, BoxError> {
    let secrets = config.signing_secrets()?;
    let gateway: SharedGateway = match config.http_gateway()? {
        Some(http) => {
            tracing::info!(base_url = %http.base_url, "using HTTP payment gateway");
            Arc::new(HttpPaymentGateway::new(http)?)
        }
        None => {
            tracing::warn!("GATEWAY_BASE_URL not set, using the sandbox payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    };

    let verifier = SignatureVerifier::new(
        secrets.key_secret.as_bytes(),
        secrets.webhook_secret.as_bytes(),
    )
    .map_err(|e| format!("invalid gateway secret: {e}"))?;

    Ok(Collaborators {
        catalog: InMemoryCatalog::new(),
        addresses: InMemoryAddressBook::new(),
        gateway: PaymentGatewayAdapter::new(gateway, verifier, config.currency.clone())
            .with_timeout(config.gateway.timeout),
        pricing: config.pricing,
    })
}

async fn serve<S: EventStore + Clone + 'static>(
    event_store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let state = api::create_state(event_store, collaborators(config)?);

    // Replay existing events into the read models
    state.catch_up().await?;

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    match &config.database_url {
        Some(url) => {
            let store = PostgresEventStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL event store");
            serve(store, &config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory");
            serve(InMemoryEventStore::new(), &config, metrics_handle).await
        }
    }
}
