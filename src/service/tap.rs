use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use super::AttendanceEngine;
use super::geo::{self, GeoPoint};
use crate::error::{CoreError, CoreResult};
use crate::model::assignment::Assignment;
use crate::model::attendance::AttendanceSession;
use crate::model::role::{Principal, Role};
use crate::store::{Write, WriteBatch};

#[derive(Debug, Clone)]
pub struct TapIn {
    pub location: GeoPoint,
    pub photo_ref: Option<String>,
    /// Client-generated id used to recognise a resubmitted tap.
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TapOut {
    pub location: Option<GeoPoint>,
    pub event_id: Option<String>,
}

const SESSION_READERS: [Role; 4] = [Role::Teacher, Role::WaliKelas, Role::Supervisor, Role::Admin];

impl AttendanceEngine {
    pub(crate) async fn load_assignment(&self, assignment_id: u64) -> CoreResult<Assignment> {
        self.bounded("load_assignment", self.store().assignment(assignment_id))
            .await?
            .ok_or_else(|| CoreError::not_found("assignment", assignment_id))
    }

    /// Loads the assignment and checks the caller is the student placed on it.
    pub(crate) async fn owned_assignment(
        &self,
        assignment_id: u64,
        principal: &Principal,
    ) -> CoreResult<Assignment> {
        let assignment = self.load_assignment(assignment_id).await?;
        if assignment.student_id != principal.user_id {
            return Err(CoreError::forbidden(
                "assignment belongs to another student",
            ));
        }
        Ok(assignment)
    }

    async fn commit_session(
        &self,
        operation: &'static str,
        mut session: AttendanceSession,
        insert: bool,
    ) -> CoreResult<AttendanceSession> {
        let mut batch = WriteBatch::new();
        batch.push(if insert {
            Write::insert(&mut session)
        } else {
            Write::update(&mut session)
        });
        self.bounded(operation, self.store().commit(batch)).await?;
        Ok(session)
    }

    /// NotStarted -> InProgress for today's civil date.
    #[instrument(skip(self, principal, input), fields(user_id = principal.user_id))]
    pub async fn tap_in(
        &self,
        assignment_id: u64,
        principal: &Principal,
        input: TapIn,
    ) -> CoreResult<AttendanceSession> {
        if !input.location.is_valid() {
            return Err(CoreError::validation("coordinates out of range"));
        }

        let assignment = self.owned_assignment(assignment_id, principal).await?;
        let now = self.clock().now();
        let today = now.date();
        if !assignment.is_active_on(today) {
            return Err(CoreError::validation(format!(
                "assignment is not active on {today}"
            )));
        }

        let existing = self
            .bounded("load_session", self.store().session(assignment_id, today))
            .await?;
        if let Some(session) = existing {
            if input.event_id.is_some() && session.tap_in_event_id == input.event_id {
                debug!(assignment_id, "Replayed tap-in event");
                return Ok(session);
            }
            return Err(CoreError::AlreadyTapped { date: today });
        }

        let radius = assignment.radius_or(self.policy().default_radius_meters);
        let check = geo::within_radius(input.location, assignment.site, radius);
        if !check.ok {
            info!(
                assignment_id,
                distance = check.distance_meters,
                radius,
                "Tap-in outside geofence"
            );
            return Err(CoreError::GeofenceViolation {
                distance_meters: check.distance_meters,
                radius_meters: radius,
            });
        }

        let grace = self.policy().grace_minutes;
        if !geo::within_grace_period(now.time(), assignment.work_start, grace) {
            info!(assignment_id, now = %now.time(), "Tap-in outside window");
            return Err(CoreError::OutsideWindow {
                now: now.time(),
                expected: assignment.work_start,
                grace_minutes: grace,
            });
        }

        let session = AttendanceSession::open(
            assignment_id,
            now,
            input.location,
            input.photo_ref,
            input.event_id,
        );
        let session = self.commit_session("tap_in", session, true).await?;

        info!(
            assignment_id,
            distance = check.distance_meters,
            "Tapped in"
        );
        Ok(session)
    }

    /// InProgress -> Completed. Location is recorded when given, never re-checked.
    #[instrument(skip(self, principal, input), fields(user_id = principal.user_id))]
    pub async fn tap_out(
        &self,
        assignment_id: u64,
        principal: &Principal,
        input: TapOut,
    ) -> CoreResult<AttendanceSession> {
        if let Some(location) = input.location {
            if !location.is_valid() {
                return Err(CoreError::validation("coordinates out of range"));
            }
        }

        self.owned_assignment(assignment_id, principal).await?;
        let now = self.clock().now();
        let today = now.date();

        let mut session = self
            .bounded("load_session", self.store().session(assignment_id, today))
            .await?
            .ok_or(CoreError::NotTappedIn { date: today })?;

        if !session.is_open()
            && input.event_id.is_some()
            && session.tap_out_event_id == input.event_id
        {
            debug!(assignment_id, "Replayed tap-out event");
            return Ok(session);
        }

        session.close(now, input.location, input.event_id)?;
        let session = self.commit_session("tap_out", session, false).await?;

        info!(
            assignment_id,
            hours = session.duration_hours().unwrap_or_default(),
            "Tapped out"
        );
        Ok(session)
    }

    /// Session for one assignment-day, visible to its student and to staff.
    pub async fn get_session(
        &self,
        assignment_id: u64,
        date: NaiveDate,
        principal: &Principal,
    ) -> CoreResult<AttendanceSession> {
        let assignment = self.load_assignment(assignment_id).await?;
        if assignment.student_id != principal.user_id && !principal.has_any(&SESSION_READERS) {
            return Err(CoreError::forbidden("not allowed to view this attendance"));
        }
        self.bounded("load_session", self.store().session(assignment_id, date))
            .await?
            .ok_or_else(|| CoreError::not_found("attendance session", format!("{assignment_id}/{date}")))
    }
}
