use crate::auth::auth::AuthUser;
use crate::service::reconciliation::ReconciliationRunner;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Default)]
pub struct ReconciliationBody {
    /// Civil date to sweep; today when omitted
    #[schema(example = "2026-01-05", format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
}

/// Manual reconciliation trigger
#[utoipa::path(
    post,
    path = "/api/reconciliation",
    request_body(content = ReconciliationBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Sweep finished; per-assignment failures are listed in the report", body = ReconciliationReport),
        (status = 400, description = "The cutoff for that date has not passed yet", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "A sweep is already running", body = Object, example = json!({
            "message": "Reconciliation already running"
        })),
        (status = 504, description = "Storage did not answer in time", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reconciliation"
)]
pub async fn trigger_reconciliation(
    auth: AuthUser,
    runner: web::Data<ReconciliationRunner>,
    payload: Option<web::Json<ReconciliationBody>>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let body = payload.map(|p| p.into_inner()).unwrap_or_default();
    let date = body.date.unwrap_or_else(|| runner.today());

    match runner.trigger(date).await {
        Some(report) => Ok(HttpResponse::Ok().json(report?)),
        None => Ok(HttpResponse::Conflict().json(serde_json::json!({
            "message": "Reconciliation already running"
        }))),
    }
}
