use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};

use clinicflow_core::InvoiceId;
use clinicflow_infra::NewInvoice;
use clinicflow_invoicing::InvoiceStatus;

use crate::app::services::{AppServices, run};
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/deleted", get(list_deleted))
        .route("/:id", get(get_invoice).delete(delete_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/status", post(set_status))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewInvoice>,
) -> Response {
    errors::respond(
        StatusCode::CREATED,
        run(&services, move |s| s.create_invoice(actor.user_id(), body)).await,
    )
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::InvoiceListQuery>,
) -> Response {
    match dto::patient_filter(query.patient_id.as_deref()) {
        Ok(Some(patient_id)) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.invoices_by_patient(patient_id))
                .await
                .map(|items| serde_json::json!({ "items": items })),
        ),
        Ok(None) => errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "patient_id query parameter is required",
        ),
        Err(resp) => resp,
    }
}

pub async fn list_deleted(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(
        StatusCode::OK,
        run(&services, |s| s.deleted_invoices())
            .await
            .map(|items| serde_json::json!({ "items": items })),
    )
}

pub async fn get_invoice(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match errors::parse::<InvoiceId>(&id) {
        Ok(id) => errors::respond(StatusCode::OK, run(&services, move |s| s.invoice(id)).await),
        Err(resp) => resp,
    }
}

pub async fn delete_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    match errors::parse::<InvoiceId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.delete_invoice(id, actor.user_id())).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::InvoicePaymentRequest>,
) -> Response {
    match errors::parse::<InvoiceId>(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| {
                s.record_invoice_payment(id, actor.user_id(), body.amount, body.method, body.reference)
            })
            .await,
        ),
        Err(resp) => resp,
    }
}

pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::InvoiceStatusRequest>,
) -> Response {
    let id = match errors::parse::<InvoiceId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match errors::parse::<InvoiceStatus>(&body.status) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    errors::respond(
        StatusCode::OK,
        run(&services, move |s| {
            s.set_invoice_status(id, actor.user_id(), status, body.method, body.reference)
        })
        .await,
    )
}
