//! Error types surfaced by the attendance engine.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Outside the site geofence: {distance_meters} m away, allowed radius is {radius_meters} m")]
    GeofenceViolation {
        distance_meters: u32,
        radius_meters: u32,
    },

    #[error("Tap at {now} is outside the {grace_minutes} minute window around {expected}")]
    OutsideWindow {
        now: NaiveTime,
        expected: NaiveTime,
        grace_minutes: u32,
    },

    #[error("Already tapped in for {date}")]
    AlreadyTapped { date: NaiveDate },

    #[error("No open attendance session for {date}")]
    NotTappedIn { date: NaiveDate },

    #[error("{entity} {id} was already decided ({status})")]
    AlreadyDecided {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrent modification of {key}, retry the request")]
    ConcurrentModification { key: String },

    #[error("Timed out during {operation}, retry the request")]
    Timeout { operation: &'static str },

    #[error("Validation failed: {message}")]
    ValidationFailure { message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::ValidationFailure {
            message: message.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable label clients and audit readers can match on.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::GeofenceViolation { .. } => "GeofenceViolation",
            CoreError::OutsideWindow { .. } => "OutsideWindow",
            CoreError::AlreadyTapped { .. } => "AlreadyTapped",
            CoreError::NotTappedIn { .. } => "NotTappedIn",
            CoreError::AlreadyDecided { .. } => "AlreadyDecided",
            CoreError::Forbidden { .. } => "Forbidden",
            CoreError::NotFound { .. } => "NotFound",
            CoreError::ConcurrentModification { .. } => "ConcurrentModification",
            CoreError::Timeout { .. } => "Timeout",
            CoreError::ValidationFailure { .. } => "ValidationFailure",
            CoreError::Storage(_) => "Storage",
        }
    }

    /// Infrastructure faults the caller may retry; domain rule violations are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Timeout { .. } | CoreError::ConcurrentModification { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_faults_are_retryable() {
        assert!(CoreError::Timeout { operation: "tap_in" }.is_retryable());
        assert!(
            CoreError::ConcurrentModification {
                key: "session".into()
            }
            .is_retryable()
        );
        assert!(
            !CoreError::GeofenceViolation {
                distance_meters: 150,
                radius_meters: 100
            }
            .is_retryable()
        );
        assert!(!CoreError::forbidden("nope").is_retryable());
    }

    #[test]
    fn geofence_message_carries_distance() {
        let err = CoreError::GeofenceViolation {
            distance_meters: 151,
            radius_meters: 100,
        };
        assert_eq!(err.kind(), "GeofenceViolation");
        assert!(err.to_string().contains("151 m"));
    }
}
