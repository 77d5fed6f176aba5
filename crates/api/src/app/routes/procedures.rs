use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::post,
    Json, Router,
};

use clinicflow_core::PatientProcedureId;

use crate::app::services::{AppServices, run};
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new().route("/:id/usage", post(record_usage).get(list_usage))
}

pub async fn record_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UsageRequest>,
) -> Response {
    match errors::parse::<PatientProcedureId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.record_usage(id, actor.user_id(), body.lines)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn list_usage(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match errors::parse::<PatientProcedureId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.usage_by_procedure(id))
                .await
                .map(|items| serde_json::json!({ "items": items })),
        ),
        Err(resp) => resp,
    }
}
