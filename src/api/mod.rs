use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::CoreError;

pub mod attendance;
pub mod leave_permit;
pub mod manual_correction;
pub mod reconciliation;

/// Body of every rejected request.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "GeofenceViolation")]
    pub kind: String,
    #[schema(example = "Outside the site geofence: 152 m away, allowed radius is 100 m")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 152)]
    pub distance_meters: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 100)]
    pub radius_meters: Option<u32>,
}

impl From<&CoreError> for ErrorBody {
    fn from(e: &CoreError) -> Self {
        let (distance_meters, radius_meters) = match e {
            CoreError::GeofenceViolation {
                distance_meters,
                radius_meters,
            } => (Some(*distance_meters), Some(*radius_meters)),
            _ => (None, None),
        };
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            distance_meters,
            radius_meters,
        }
    }
}

impl ResponseError for CoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::GeofenceViolation { .. } | CoreError::OutsideWindow { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CoreError::AlreadyTapped { .. }
            | CoreError::NotTappedIn { .. }
            | CoreError::AlreadyDecided { .. }
            | CoreError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            CoreError::Forbidden { .. } => StatusCode::FORBIDDEN,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::ValidationFailure { .. } => StatusCode::BAD_REQUEST,
            CoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let CoreError::Storage(message) = self {
            tracing::error!(error = %message, "Storage failure");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "kind": "Storage",
                "message": "Internal Server Error"
            }));
        }
        HttpResponse::build(self.status_code()).json(ErrorBody::from(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn geofence_rejection_reports_distance() {
        let err = CoreError::GeofenceViolation {
            distance_meters: 152,
            radius_meters: 100,
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "GeofenceViolation");
        assert_eq!(json["distance_meters"], 152);
        assert_eq!(json["radius_meters"], 100);
    }

    #[test]
    fn retryable_faults_map_to_conflict_and_timeout() {
        assert_eq!(
            CoreError::ConcurrentModification { key: "k".into() }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::Timeout { operation: "tap_in" }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
