use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::service::geo::GeoPoint;

/// Lifecycle of one assignment-day. "Not started" has no record at all.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
pub enum SessionStatus {
    InProgress,
    Completed,
    AutoClosed,
    Corrected,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub id: Uuid,
    pub assignment_id: u64,
    pub date: NaiveDate,
    pub status: SessionStatus,
    pub tap_in_at: Option<NaiveDateTime>,
    pub tap_in_location: Option<GeoPoint>,
    pub tap_in_photo: Option<String>,
    pub tap_in_event_id: Option<String>,
    pub tap_out_at: Option<NaiveDateTime>,
    pub tap_out_location: Option<GeoPoint>,
    pub tap_out_event_id: Option<String>,
    /// Set when the daily sweep, not the student, closed the session.
    pub closed_by_reconciliation: bool,
    pub correction_request_id: Option<Uuid>,
    pub version: u32,
}

/// Hours between two instants, minute precision, rounded to two decimals.
pub fn worked_hours(tap_in: NaiveDateTime, tap_out: NaiveDateTime) -> f64 {
    let minutes = (tap_out - tap_in).num_minutes();
    (minutes as f64 / 60.0 * 100.0).round() / 100.0
}

impl AttendanceSession {
    fn blank(assignment_id: u64, date: NaiveDate, status: SessionStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            date,
            status,
            tap_in_at: None,
            tap_in_location: None,
            tap_in_photo: None,
            tap_in_event_id: None,
            tap_out_at: None,
            tap_out_location: None,
            tap_out_event_id: None,
            closed_by_reconciliation: false,
            correction_request_id: None,
            version: 0,
        }
    }

    /// NotStarted -> InProgress.
    pub fn open(
        assignment_id: u64,
        at: NaiveDateTime,
        location: GeoPoint,
        photo_ref: Option<String>,
        event_id: Option<String>,
    ) -> Self {
        let mut session = Self::blank(assignment_id, at.date(), SessionStatus::InProgress);
        session.tap_in_at = Some(at);
        session.tap_in_location = Some(location);
        session.tap_in_photo = photo_ref;
        session.tap_in_event_id = event_id;
        session
    }

    /// NotStarted -> Absent, only ever produced by the daily sweep.
    pub fn absent(assignment_id: u64, date: NaiveDate) -> Self {
        let mut session = Self::blank(assignment_id, date, SessionStatus::Absent);
        session.closed_by_reconciliation = true;
        session
    }

    /// NotStarted -> Corrected, when an approved correction targets a day with no record.
    pub fn corrected(
        assignment_id: u64,
        date: NaiveDate,
        tap_in: NaiveDateTime,
        tap_out: NaiveDateTime,
        request_id: Uuid,
    ) -> CoreResult<Self> {
        let mut session = Self::blank(assignment_id, date, SessionStatus::Corrected);
        session.correct(tap_in, tap_out, request_id)?;
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    /// InProgress -> Completed.
    pub fn close(
        &mut self,
        at: NaiveDateTime,
        location: Option<GeoPoint>,
        event_id: Option<String>,
    ) -> CoreResult<()> {
        let tap_in = match (self.status, self.tap_in_at) {
            (SessionStatus::InProgress, Some(tap_in)) => tap_in,
            _ => return Err(CoreError::NotTappedIn { date: self.date }),
        };
        if at < tap_in {
            return Err(CoreError::validation("tap-out precedes tap-in"));
        }
        self.status = SessionStatus::Completed;
        self.tap_out_at = Some(at);
        self.tap_out_location = location;
        self.tap_out_event_id = event_id;
        Ok(())
    }

    /// InProgress -> AutoClosed. Returns false, leaving the record untouched, for any
    /// other state so repeated sweeps are no-ops.
    pub fn auto_close(&mut self, cutoff: NaiveDateTime) -> bool {
        if !self.is_open() {
            return false;
        }
        let tap_out = match self.tap_in_at {
            Some(tap_in) if tap_in > cutoff => tap_in,
            _ => cutoff,
        };
        self.status = SessionStatus::AutoClosed;
        self.tap_out_at = Some(tap_out);
        self.closed_by_reconciliation = true;
        true
    }

    /// Any state -> Corrected, overwriting both timestamps with the claimed ones.
    pub fn correct(
        &mut self,
        tap_in: NaiveDateTime,
        tap_out: NaiveDateTime,
        request_id: Uuid,
    ) -> CoreResult<()> {
        if tap_out < tap_in {
            return Err(CoreError::validation("claimed tap-out precedes claimed tap-in"));
        }
        self.status = SessionStatus::Corrected;
        self.tap_in_at = Some(tap_in);
        self.tap_out_at = Some(tap_out);
        self.closed_by_reconciliation = false;
        self.correction_request_id = Some(request_id);
        Ok(())
    }

    /// Derived on every read from the two timestamps.
    pub fn duration_hours(&self) -> Option<f64> {
        match (self.tap_in_at, self.tap_out_at) {
            (Some(tap_in), Some(tap_out)) => Some(worked_hours(tap_in, tap_out)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn site() -> GeoPoint {
        GeoPoint::new(0.0, 0.0)
    }

    #[test]
    fn full_day_is_eight_and_a_half_hours() {
        let mut s = AttendanceSession::open(1, at(8, 0), site(), None, None);
        s.close(at(16, 30), None, None).unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.duration_hours(), Some(8.5));
    }

    #[test]
    fn duration_rounds_to_two_decimals() {
        assert_eq!(worked_hours(at(7, 5), at(16, 0)), 8.92);
        assert_eq!(worked_hours(at(8, 0), at(8, 0)), 0.0);
    }

    #[test]
    fn cannot_complete_without_being_in_progress() {
        let mut absent = AttendanceSession::absent(1, at(0, 0).date());
        let err = absent.close(at(16, 0), None, None).unwrap_err();
        assert_eq!(err.kind(), "NotTappedIn");
        assert_eq!(absent.status, SessionStatus::Absent);

        let mut done = AttendanceSession::open(1, at(8, 0), site(), None, None);
        done.close(at(12, 0), None, None).unwrap();
        assert!(done.close(at(13, 0), None, None).is_err());
        assert_eq!(done.tap_out_at, Some(at(12, 0)));
    }

    #[test]
    fn tap_out_before_tap_in_is_rejected() {
        let mut s = AttendanceSession::open(1, at(9, 0), site(), None, None);
        let err = s.close(at(8, 59), None, None).unwrap_err();
        assert_eq!(err.kind(), "ValidationFailure");
        assert!(s.is_open());
    }

    #[test]
    fn auto_close_only_touches_open_sessions() {
        let mut s = AttendanceSession::open(1, at(8, 0), site(), None, None);
        assert!(s.auto_close(at(23, 59)));
        assert_eq!(s.status, SessionStatus::AutoClosed);
        assert!(s.closed_by_reconciliation);
        assert_eq!(s.duration_hours(), Some(15.98));

        let before = s.clone();
        assert!(!s.auto_close(at(23, 59)));
        assert_eq!(s, before);
    }

    #[test]
    fn correction_overwrites_times() {
        let request = Uuid::new_v4();
        let mut s = AttendanceSession::open(1, at(10, 0), site(), None, None);
        s.auto_close(at(23, 59));
        s.correct(at(8, 0), at(15, 0), request).unwrap();
        assert_eq!(s.status, SessionStatus::Corrected);
        assert_eq!(s.duration_hours(), Some(7.0));
        assert!(!s.closed_by_reconciliation);
        assert_eq!(s.correction_request_id, Some(request));
    }
}
