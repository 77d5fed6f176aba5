use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use clinicflow_core::RequisitionId;
use clinicflow_requisitions::RequisitionStatus;

use crate::app::services::{AppServices, run};
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_requisition).get(list_requisitions))
        .route(
            "/:id",
            get(get_requisition).put(update_requisition).delete(delete_requisition),
        )
        .route("/:id/submit", post(submit_requisition))
        .route("/:id/approve", post(approve_requisition))
        .route("/:id/reject", post(reject_requisition))
        .route("/:id/transfers", get(list_transfers))
}

pub async fn create_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::RequisitionRequest>,
) -> Response {
    errors::respond(
        StatusCode::CREATED,
        run(&services, move |s| {
            s.create_requisition(actor.user_id(), body.details, body.items)
        })
        .await,
    )
}

pub async fn list_requisitions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Query(query): Query<dto::RequisitionListQuery>,
) -> Response {
    let result = if query.mine {
        run(&services, move |s| s.requisitions_by_requester(actor.user_id())).await
    } else {
        let status = match query.status.as_deref() {
            Some(raw) => match errors::parse::<RequisitionStatus>(raw) {
                Ok(s) => s,
                Err(resp) => return resp,
            },
            None => RequisitionStatus::Submitted,
        };
        run(&services, move |s| s.requisitions_by_status(status)).await
    };
    errors::respond(StatusCode::OK, result.map(|items| serde_json::json!({ "items": items })))
}

pub async fn get_requisition(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match errors::parse::<RequisitionId>(&id) {
        Ok(id) => errors::respond(StatusCode::OK, run(&services, move |s| s.requisition(id)).await),
        Err(resp) => resp,
    }
}

pub async fn update_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RequisitionRequest>,
) -> Response {
    match errors::parse::<RequisitionId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| {
                s.update_requisition(id, actor.user_id(), body.details, body.items)
            })
            .await,
        ),
        Err(resp) => resp,
    }
}

pub async fn delete_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse::<RequisitionId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match run(&services, move |s| s.delete_requisition(id, actor.user_id())).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn submit_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    match errors::parse::<RequisitionId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.submit_requisition(id, actor.user_id())).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn approve_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ApproveRequisitionRequest>>,
) -> Response {
    let id = match errors::parse::<RequisitionId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let approvals: Vec<_> = body
        .approvals
        .into_iter()
        .map(|line| (line.item_id, line.quantity))
        .collect();
    errors::respond(
        StatusCode::OK,
        run(&services, move |s| {
            s.approve_requisition(id, actor.user_id(), approvals, body.target_store_id)
        })
        .await
        .map(|(requisition, transfer)| {
            serde_json::json!({ "requisition": requisition, "transfer": transfer })
        }),
    )
}

pub async fn reject_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RejectRequisitionRequest>,
) -> Response {
    match errors::parse::<RequisitionId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.reject_requisition(id, actor.user_id(), body.reason)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn list_transfers(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match errors::parse::<RequisitionId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.transfers_for_requisition(id))
                .await
                .map(|items| serde_json::json!({ "items": items })),
        ),
        Err(resp) => resp,
    }
}
