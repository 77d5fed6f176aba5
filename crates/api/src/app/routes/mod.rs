use axum::{routing::get, Router};

pub mod invoices;
pub mod procedures;
pub mod requisitions;
pub mod stock;
pub mod system;
pub mod visits;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/visits", visits::router())
        .nest("/invoices", invoices::router())
        .nest("/requisitions", requisitions::router())
        .nest("/stock", stock::router())
        .nest("/procedures", procedures::router())
}
