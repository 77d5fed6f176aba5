//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: builds the workflow services, their store and event bus
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and query parameters
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Connects to Postgres first when the config names a database.
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_app_with(config, services))
}

/// Router over in-process services only.
pub fn build_in_memory_app(config: &ApiConfig) -> Router {
    build_app_with(config, Arc::new(services::build_in_memory_services(config)))
}

/// Build the router over already constructed services.
pub fn build_app_with(config: &ApiConfig, services: Arc<services::AppServices>) -> Router {
    let jwt = Arc::new(clinicflow_auth::Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
