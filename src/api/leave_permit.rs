use crate::api::manual_correction::DecisionResponse;
use crate::auth::auth::AuthUser;
use crate::model::approval::Decision;
use crate::model::leave_permit::{LeavePermit, LeaveStatus, LeaveType, PermitMember, RequesterType};
use crate::service::AttendanceEngine;
use crate::service::leave_permit::NewLeavePermit;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeavePermit {
    pub requester_type: RequesterType,
    #[schema(example = "sick")]
    pub leave_type: LeaveType,
    #[schema(example = "Fever since last night")]
    pub reason: String,
    #[schema(example = "2026-01-05T10:00:00", format = "date-time", value_type = String)]
    pub start_at: NaiveDateTime,
    #[schema(example = "2026-01-05T13:00:00", format = "date-time", value_type = String)]
    pub estimated_return_at: Option<NaiveDateTime>,
    /// Other students covered by a group permit
    #[serde(default)]
    #[schema(example = json!([1002, 1003]))]
    pub member_ids: Vec<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct LeaveDecisionBody {
    pub decision: Decision,
    /// Required when rejecting
    #[schema(example = "Exam week, please reschedule")]
    pub notes: Option<String>,
    #[schema(example = "2026-01-05T14:00:00", format = "date-time", value_type = String)]
    pub confirmed_return_at: Option<NaiveDateTime>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct ReturnBody {
    /// Defaults to now
    #[schema(example = "2026-01-05T13:40:00", format = "date-time", value_type = String)]
    pub returned_at: Option<NaiveDateTime>,
    #[schema(example = "Back at class, clinic note attached")]
    pub notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MemberResponse {
    pub user_id: u64,
    pub status: LeaveStatus,
}

impl From<PermitMember> for MemberResponse {
    fn from(m: PermitMember) -> Self {
        Self {
            user_id: m.user_id,
            status: m.status,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeavePermitResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub requester_id: u64,
    pub requester_type: RequesterType,
    pub leave_type: LeaveType,
    pub reason: String,
    #[schema(format = "date-time", value_type = String)]
    pub start_at: NaiveDateTime,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub estimated_return_at: Option<NaiveDateTime>,
    pub status: LeaveStatus,
    pub decisions: Vec<DecisionResponse>,
    pub rejection_reason: Option<String>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub confirmed_return_at: Option<NaiveDateTime>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub returned_at: Option<NaiveDateTime>,
    pub completion_notes: Option<String>,
    /// Requester first, then group members; empty when only the permit was returned
    pub members: Vec<MemberResponse>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
}

impl LeavePermitResponse {
    fn new(p: LeavePermit, members: Vec<PermitMember>) -> Self {
        let mut members: Vec<MemberResponse> =
            members.into_iter().map(MemberResponse::from).collect();
        let requester_id = p.requester_id;
        members.sort_by_key(|m| (m.user_id != requester_id, m.user_id));
        Self {
            id: p.id,
            requester_id: p.requester_id,
            requester_type: p.requester_type,
            leave_type: p.leave_type,
            reason: p.reason,
            start_at: p.start_at,
            estimated_return_at: p.estimated_return_at,
            status: p.status,
            decisions: p.decisions.into_iter().map(DecisionResponse::from).collect(),
            rejection_reason: p.rejection_reason,
            confirmed_return_at: p.confirmed_return_at,
            returned_at: p.returned_at,
            completion_notes: p.completion_notes,
            members,
            created_at: p.created_at,
        }
    }
}

impl From<LeavePermit> for LeavePermitResponse {
    fn from(p: LeavePermit) -> Self {
        Self::new(p, Vec::new())
    }
}

/* =========================
File a leave permit
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(content = CreateLeavePermit, content_type = "application/json"),
    responses(
        (status = 201, description = "Leave permit filed (status Open)", body = LeavePermitResponse),
        (status = 400, description = "Bad request", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Role may not file this kind of permit", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<CreateLeavePermit>,
) -> actix_web::Result<impl Responder> {
    let body = payload.into_inner();
    let permit = engine
        .create_leave_permit(
            &auth.principal,
            NewLeavePermit {
                requester_type: body.requester_type,
                leave_type: body.leave_type,
                reason: body.reason,
                start_at: body.start_at,
                estimated_return_at: body.estimated_return_at,
                member_ids: body.member_ids,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(LeavePermitResponse::from(permit)))
}

#[utoipa::path(
    get,
    path = "/api/leave/{id}",
    params(("id" = String, Path, description = "Leave permit id")),
    responses(
        (status = 200, description = "Leave permit with member entries", body = LeavePermitResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let (permit, members) = engine
        .get_leave_permit(path.into_inner(), &auth.principal)
        .await?;
    Ok(HttpResponse::Ok().json(LeavePermitResponse::new(permit, members)))
}

#[utoipa::path(
    put,
    path = "/api/leave/{id}/review",
    params(("id" = String, Path, description = "Leave permit id")),
    responses(
        (status = 200, description = "Permit under review (status Proses)", body = LeavePermitResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not an eligible approver", body = ErrorBody),
        (status = 409, description = "Already decided", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn review_leave(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let permit = engine
        .start_leave_review(path.into_inner(), &auth.principal)
        .await?;
    Ok(HttpResponse::Ok().json(LeavePermitResponse::from(permit)))
}

/* =========================
Approve / reject
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{id}/decision",
    params(("id" = String, Path, description = "Leave permit id")),
    request_body(content = LeaveDecisionBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Decision applied to the permit and every member", body = LeavePermitResponse),
        (status = 400, description = "Rejection without a reason", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not an eligible approver", body = ErrorBody),
        (status = 409, description = "Already decided or changed concurrently", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn decide_leave(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<Uuid>,
    payload: web::Json<LeaveDecisionBody>,
) -> actix_web::Result<impl Responder> {
    let body = payload.into_inner();
    let permit = engine
        .decide_leave_permit(
            path.into_inner(),
            &auth.principal,
            body.decision,
            body.notes,
            body.confirmed_return_at,
        )
        .await?;
    Ok(HttpResponse::Ok().json(LeavePermitResponse::from(permit)))
}

#[utoipa::path(
    put,
    path = "/api/leave/{id}/return",
    params(("id" = String, Path, description = "Leave permit id")),
    request_body(content = ReturnBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Return recorded", body = LeavePermitResponse),
        (status = 400, description = "Permit not approved or return already recorded", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn record_return(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<Uuid>,
    payload: Option<web::Json<ReturnBody>>,
) -> actix_web::Result<impl Responder> {
    let body = payload.map(|p| p.into_inner()).unwrap_or_default();
    let permit = engine
        .record_leave_return(path.into_inner(), &auth.principal, body.returned_at, body.notes)
        .await?;
    Ok(HttpResponse::Ok().json(LeavePermitResponse::from(permit)))
}
