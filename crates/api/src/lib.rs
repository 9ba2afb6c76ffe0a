//! HTTP API server for the checkout system.
//!
//! Exposes checkout, payment confirmation, order administration and promo
//! code management over REST, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Collaborators, SharedGateway, create_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route("/checkout", post(routes::checkout::checkout::<S>))
        .route("/promo-codes/validate", post(routes::promos::validate::<S>))
        .route("/payments/verify", post(routes::payments::verify::<S>))
        .route("/payments/webhook", post(routes::payments::webhook::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/return", post(routes::orders::request_return::<S>))
        .route("/users/{id}/orders", get(routes::orders::list_for_user::<S>))
        .route("/users/{id}/addresses", post(routes::orders::add_address::<S>))
        .route("/admin/orders/{id}/status", put(routes::admin::change_status::<S>))
        .route("/admin/orders/{id}/refund", post(routes::admin::refund::<S>))
        .route(
            "/admin/orders/{id}/cash-collected",
            post(routes::admin::cash_collected::<S>),
        )
        .route("/admin/products/{id}", put(routes::admin::upsert_product::<S>))
        .route("/admin/promo-codes", post(routes::admin::create_promo::<S>))
        .route(
            "/admin/promo-codes/{code}/usages",
            get(routes::admin::promo_usages::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
