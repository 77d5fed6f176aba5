use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};

use clinicflow_core::VisitSessionId;
use clinicflow_infra::{BillingSource, NewVisit};
use clinicflow_invoicing::{NewInvestigation, NewProcedure, NewTreatment};
use clinicflow_visits::{BasicRefractionExam, MainExamination, TriageMeasurement, VisitStatus};

use crate::app::services::{AppServices, run};
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_visit).get(list_visits))
        .route("/missing-consultation-invoice", get(list_missing_consultation_invoice))
        .route("/:id", get(get_visit))
        .route("/:id/advance", post(advance_visit))
        .route("/:id/payment", post(record_payment))
        .route("/:id/cancel", post(cancel_visit))
        .route("/:id/no-show", post(mark_no_show))
        .route("/:id/complete", post(complete_visit))
        .route("/:id/status", post(set_status))
        .route("/:id/consultation-invoice", post(retry_consultation_invoice))
        .route("/:id/triage", post(create_triage).get(get_triage))
        .route("/:id/refraction", post(create_refraction).get(get_refraction))
        .route("/:id/main-exam", post(create_main_exam).get(get_main_exam))
        .route("/:id/procedures", post(add_procedure).get(list_procedures))
        .route("/:id/investigations", post(add_investigation).get(list_investigations))
        .route("/:id/treatments", post(add_treatment).get(list_treatments))
        .route("/:id/invoices", get(list_visit_invoices))
        .route("/:id/invoices/:source", post(generate_invoice))
}

fn visit_id(raw: &str) -> Result<VisitSessionId, Response> {
    errors::parse::<VisitSessionId>(raw)
}

pub async fn create_visit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewVisit>,
) -> Response {
    errors::respond(
        StatusCode::CREATED,
        run(&services, move |s| s.create_visit(actor.user_id(), body)).await,
    )
}

pub async fn list_visits(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::VisitListQuery>,
) -> Response {
    let patient = match dto::patient_filter(query.patient_id.as_deref()) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = match (patient, query.status.as_deref()) {
        (Some(patient_id), _) => run(&services, move |s| s.visits_by_patient(patient_id)).await,
        (None, Some(raw)) => match errors::parse::<VisitStatus>(raw) {
            Ok(status) => run(&services, move |s| s.visits_by_status(status)).await,
            Err(resp) => return resp,
        },
        (None, None) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "patient_id or status query parameter is required",
            );
        }
    };
    errors::respond(StatusCode::OK, result.map(|items| serde_json::json!({ "items": items })))
}

/// Fee-bearing visits whose consultation invoice still has to be created.
pub async fn list_missing_consultation_invoice(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(
        StatusCode::OK,
        run(&services, |s| s.visits_missing_consultation_invoice())
            .await
            .map(|items| serde_json::json!({ "items": items })),
    )
}

pub async fn get_visit(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(StatusCode::OK, run(&services, move |s| s.visit(id)).await),
        Err(resp) => resp,
    }
}

pub async fn advance_visit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.advance_stage(id, actor.user_id())).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VisitPaymentRequest>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| {
                s.record_visit_payment(id, actor.user_id(), body.method, body.reference)
            })
            .await,
        ),
        Err(resp) => resp,
    }
}

pub async fn cancel_visit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelVisitRequest>>,
) -> Response {
    let reason = body.and_then(|Json(b)| b.reason);
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.cancel_visit(id, actor.user_id(), reason)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn mark_no_show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.mark_no_show(id, actor.user_id())).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn complete_visit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.complete_visit(id, actor.user_id())).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VisitStatusRequest>,
) -> Response {
    let id = match visit_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match errors::parse::<VisitStatus>(&body.status) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    errors::respond(
        StatusCode::OK,
        run(&services, move |s| s.set_visit_status(id, actor.user_id(), status)).await,
    )
}

pub async fn retry_consultation_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.retry_consultation_invoice(id, actor.user_id())).await,
        ),
        Err(resp) => resp,
    }
}

// -------------------------
// Clinical records
// -------------------------

pub async fn create_triage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<TriageMeasurement>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.create_triage(id, actor.user_id(), body)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn create_refraction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<BasicRefractionExam>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.create_basic_refraction(id, actor.user_id(), body)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn create_main_exam(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<MainExamination>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.create_main_examination(id, actor.user_id(), body)).await,
        ),
        Err(resp) => resp,
    }
}

async fn clinical_record<T>(services: &Arc<AppServices>, raw_id: &str) -> Response
where
    T: clinicflow_infra::ClinicalTable + serde::Serialize + Send + 'static,
{
    let id = match visit_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match run(services, move |s| s.clinical_record_for_visit::<T>(id)).await {
        Ok(Some(record)) => errors::respond(StatusCode::OK, Ok(record)),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("{} not recorded for visit session {id}", T::KIND.label()),
        ),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_triage(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    clinical_record::<TriageMeasurement>(&services, &id).await
}

pub async fn get_refraction(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    clinical_record::<BasicRefractionExam>(&services, &id).await
}

pub async fn get_main_exam(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    clinical_record::<MainExamination>(&services, &id).await
}

// -------------------------
// Billable sources and generated invoices
// -------------------------

pub async fn add_procedure(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<NewProcedure>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.add_procedure(id, actor.user_id(), body)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn list_procedures(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.procedures_for_visit(id)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn add_investigation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<NewInvestigation>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.add_investigation(id, actor.user_id(), body)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn list_investigations(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.investigations_for_visit(id)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn add_treatment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<NewTreatment>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::CREATED,
            run(&services, move |s| s.add_treatment(id, actor.user_id(), body)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn list_treatments(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.treatments_for_visit(id)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn list_visit_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    match visit_id(&id) {
        Ok(id) => errors::respond(
            StatusCode::OK,
            run(&services, move |s| s.invoices_for_visit(id)).await,
        ),
        Err(resp) => resp,
    }
}

pub async fn generate_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path((id, source)): Path<(String, String)>,
    body: Option<Json<dto::GenerateInvoiceRequest>>,
) -> Response {
    let id = match visit_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let source = match source.as_str() {
        "procedures" => BillingSource::Procedures,
        "investigations" => BillingSource::Investigations {
            investigation_ids: body.investigation_ids,
        },
        "treatments" => BillingSource::Treatments,
        "optics" => BillingSource::Optics {
            selections: body.selections,
        },
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_source",
                "source must be one of: procedures, investigations, treatments, optics",
            );
        }
    };
    errors::respond(
        StatusCode::CREATED,
        run(&services, move |s| s.generate_invoice(id, actor.user_id(), source)).await,
    )
}
