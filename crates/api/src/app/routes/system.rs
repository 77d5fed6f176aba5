use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::ActorContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(actor): Extension<ActorContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": actor.user_id().to_string(),
        "name": actor.name(),
        "roles": actor.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}
