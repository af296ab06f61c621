use crate::auth::auth::AuthUser;
use crate::model::attendance::{AttendanceSession, SessionStatus};
use crate::service::AttendanceEngine;
use crate::service::geo::GeoPoint;
use crate::service::tap::{TapIn, TapOut};
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct TapInBody {
    #[schema(example = json!(-6.2))]
    pub lat: f64,
    #[schema(example = 106.8)]
    pub lng: f64,
    /// Reference to the uploaded selfie, if the client took one
    #[schema(example = "uploads/selfie/2026-01-05/42.jpg")]
    pub photo_ref: Option<String>,
    /// Client-generated id; resubmitting the same id returns the recorded session
    #[schema(example = "b1c7e4a0-tap-in")]
    pub event_id: Option<String>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct TapOutBody {
    #[schema(example = json!(-6.2))]
    pub lat: Option<f64>,
    #[schema(example = 106.8)]
    pub lng: Option<f64>,
    #[schema(example = "b1c7e4a0-tap-out")]
    pub event_id: Option<String>,
}

impl TapOutBody {
    fn location(&self) -> actix_web::Result<Option<GeoPoint>> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Ok(Some(GeoPoint::new(lat, lng))),
            (None, None) => Ok(None),
            _ => Err(actix_web::error::ErrorBadRequest(
                "lat and lng must be sent together",
            )),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    #[schema(example = 42)]
    pub assignment_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub status: SessionStatus,
    #[schema(example = "2026-01-05T07:05:00", format = "date-time", value_type = String)]
    pub tap_in_at: Option<NaiveDateTime>,
    pub tap_in_location: Option<GeoPoint>,
    pub tap_in_photo: Option<String>,
    #[schema(example = "2026-01-05T16:00:00", format = "date-time", value_type = String)]
    pub tap_out_at: Option<NaiveDateTime>,
    pub tap_out_location: Option<GeoPoint>,
    /// Worked hours, two decimals; absent until the session is closed
    #[schema(example = 8.92)]
    pub duration_hours: Option<f64>,
    pub closed_by_reconciliation: bool,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub correction_request_id: Option<Uuid>,
}

impl From<AttendanceSession> for SessionResponse {
    fn from(s: AttendanceSession) -> Self {
        let duration_hours = s.duration_hours();
        Self {
            id: s.id,
            assignment_id: s.assignment_id,
            date: s.date,
            status: s.status,
            tap_in_at: s.tap_in_at,
            tap_in_location: s.tap_in_location,
            tap_in_photo: s.tap_in_photo,
            tap_out_at: s.tap_out_at,
            tap_out_location: s.tap_out_location,
            duration_hours,
            closed_by_reconciliation: s.closed_by_reconciliation,
            correction_request_id: s.correction_request_id,
        }
    }
}

/// Tap-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/{assignment_id}/tap-in",
    params(("assignment_id" = u64, Path, description = "Placement assignment id")),
    request_body(content = TapInBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Tapped in", body = SessionResponse),
        (status = 400, description = "Coordinates out of range or assignment inactive", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Assignment belongs to another student", body = ErrorBody),
        (status = 404, description = "Assignment not found", body = ErrorBody),
        (status = 409, description = "Already tapped in today", body = ErrorBody),
        (status = 422, description = "Outside the geofence or the tap-in window", body = ErrorBody),
        (status = 504, description = "Storage did not answer in time", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn tap_in(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: web::Json<TapInBody>,
) -> actix_web::Result<impl Responder> {
    let body = payload.into_inner();
    let session = engine
        .tap_in(
            path.into_inner(),
            &auth.principal,
            TapIn {
                location: GeoPoint::new(body.lat, body.lng),
                photo_ref: body.photo_ref,
                event_id: body.event_id,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(SessionResponse::from(session)))
}

/// Tap-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/{assignment_id}/tap-out",
    params(("assignment_id" = u64, Path, description = "Placement assignment id")),
    request_body(content = TapOutBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Tapped out", body = SessionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Assignment belongs to another student", body = ErrorBody),
        (status = 409, description = "No open session for today", body = ErrorBody),
        (status = 504, description = "Storage did not answer in time", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn tap_out(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: Option<web::Json<TapOutBody>>,
) -> actix_web::Result<impl Responder> {
    let body = payload.map(|p| p.into_inner()).unwrap_or_default();
    let location = body.location()?;
    let session = engine
        .tap_out(
            path.into_inner(),
            &auth.principal,
            TapOut {
                location,
                event_id: body.event_id,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(SessionResponse::from(session)))
}

/// Attendance for one assignment-day
#[utoipa::path(
    get,
    path = "/api/attendance/{assignment_id}/{date}",
    params(
        ("assignment_id" = u64, Path, description = "Placement assignment id"),
        ("date" = String, Path, description = "Civil date, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Session found", body = SessionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to view this attendance", body = ErrorBody),
        (status = 404, description = "No session recorded for that day", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_session(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(u64, NaiveDate)>,
) -> actix_web::Result<impl Responder> {
    let (assignment_id, date) = path.into_inner();
    let session = engine
        .get_session(assignment_id, date, &auth.principal)
        .await?;

    Ok(HttpResponse::Ok().json(SessionResponse::from(session)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_a_coordinate_pair_is_rejected() {
        let body = TapOutBody {
            lat: Some(-6.2),
            lng: None,
            event_id: None,
        };
        assert!(body.location().is_err());
        assert_eq!(TapOutBody::default().location().unwrap(), None);
    }
}
