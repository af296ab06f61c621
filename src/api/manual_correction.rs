use crate::auth::auth::AuthUser;
use crate::model::approval::{ApprovalDecision, Decision};
use crate::model::manual_request::{CorrectionStatus, ManualAttendanceRequest};
use crate::service::AttendanceEngine;
use crate::service::manual_correction::NewManualCorrection;
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct CreateCorrection {
    #[schema(example = 42)]
    pub assignment_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "2026-01-05T08:00:00", format = "date-time", value_type = String)]
    pub claimed_tap_in: NaiveDateTime,
    #[schema(example = "2026-01-05T16:30:00", format = "date-time", value_type = String)]
    pub claimed_tap_out: NaiveDateTime,
    #[schema(example = "Phone battery died before tap-out; mentor saw me leave at 16:30")]
    pub justification: String,
    /// References to uploaded proof files
    #[serde(default)]
    pub evidence: Vec<String>,
    #[schema(example = "Pak Budi")]
    pub witness_name: Option<String>,
}

/// Body shared by every approve/reject endpoint.
#[derive(Deserialize, ToSchema)]
pub struct DecisionBody {
    pub decision: Decision,
    #[schema(example = "Confirmed with the site mentor")]
    pub notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DecisionResponse {
    #[schema(example = 7)]
    pub approver_id: u64,
    pub decision: Decision,
    pub notes: Option<String>,
    #[schema(example = "2026-01-06T09:00:00", format = "date-time", value_type = String)]
    pub decided_at: NaiveDateTime,
}

impl From<ApprovalDecision> for DecisionResponse {
    fn from(d: ApprovalDecision) -> Self {
        Self {
            approver_id: d.approver_id,
            decision: d.decision,
            notes: d.notes,
            decided_at: d.decided_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CorrectionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub assignment_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub requester_id: u64,
    #[schema(format = "date-time", value_type = String)]
    pub claimed_tap_in: NaiveDateTime,
    #[schema(format = "date-time", value_type = String)]
    pub claimed_tap_out: NaiveDateTime,
    pub justification: String,
    pub evidence: Vec<String>,
    pub witness_name: Option<String>,
    pub status: CorrectionStatus,
    pub decisions: Vec<DecisionResponse>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
}

impl From<ManualAttendanceRequest> for CorrectionResponse {
    fn from(r: ManualAttendanceRequest) -> Self {
        Self {
            id: r.id,
            assignment_id: r.assignment_id,
            date: r.date,
            requester_id: r.requester_id,
            claimed_tap_in: r.claimed_tap_in,
            claimed_tap_out: r.claimed_tap_out,
            justification: r.justification,
            evidence: r.evidence,
            witness_name: r.witness_name,
            status: r.status,
            decisions: r.decisions.into_iter().map(DecisionResponse::from).collect(),
            created_at: r.created_at,
        }
    }
}

/* =========================
File a correction
========================= */
#[utoipa::path(
    post,
    path = "/api/corrections",
    request_body(content = CreateCorrection, content_type = "application/json"),
    responses(
        (status = 201, description = "Correction filed, awaiting approval", body = CorrectionResponse),
        (status = 400, description = "Invalid claim or one already pending for that day", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Assignment belongs to another student", body = ErrorBody),
        (status = 404, description = "Assignment not found", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Corrections"
)]
pub async fn create_correction(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<CreateCorrection>,
) -> actix_web::Result<impl Responder> {
    let body = payload.into_inner();
    let request = engine
        .request_manual_correction(
            &auth.principal,
            NewManualCorrection {
                assignment_id: body.assignment_id,
                date: body.date,
                claimed_tap_in: body.claimed_tap_in,
                claimed_tap_out: body.claimed_tap_out,
                justification: body.justification,
                evidence: body.evidence,
                witness_name: body.witness_name,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(CorrectionResponse::from(request)))
}

#[utoipa::path(
    get,
    path = "/api/corrections/{id}",
    params(("id" = String, Path, description = "Correction request id")),
    responses(
        (status = 200, description = "Correction request", body = CorrectionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to view this request", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Corrections"
)]
pub async fn get_correction(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let request = engine
        .get_manual_correction(path.into_inner(), &auth.principal)
        .await?;
    Ok(HttpResponse::Ok().json(CorrectionResponse::from(request)))
}

/* =========================
Approve / reject
========================= */
#[utoipa::path(
    put,
    path = "/api/corrections/{id}/decision",
    params(("id" = String, Path, description = "Correction request id")),
    request_body(content = DecisionBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Decision recorded; approval rewrites the session", body = CorrectionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not an eligible approver", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Already decided or changed concurrently", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Corrections"
)]
pub async fn decide_correction(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<Uuid>,
    payload: web::Json<DecisionBody>,
) -> actix_web::Result<impl Responder> {
    let body = payload.into_inner();
    let request = engine
        .decide_manual_correction(path.into_inner(), &auth.principal, body.decision, body.notes)
        .await?;
    Ok(HttpResponse::Ok().json(CorrectionResponse::from(request)))
}
