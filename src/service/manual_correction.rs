use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use super::AttendanceEngine;
use super::approval::ApprovalKind;
use crate::error::{CoreError, CoreResult};
use crate::model::approval::{ApprovalDecision, Decision};
use crate::model::attendance::AttendanceSession;
use crate::model::manual_request::{CorrectionStatus, ManualAttendanceRequest};
use crate::model::role::{Principal, Role};
use crate::store::{Write, WriteBatch};

const APPROVER_ROLES: [Role; 3] = [Role::Supervisor, Role::Teacher, Role::Admin];

#[derive(Debug, Clone)]
pub struct NewManualCorrection {
    pub assignment_id: u64,
    pub date: NaiveDate,
    pub claimed_tap_in: NaiveDateTime,
    pub claimed_tap_out: NaiveDateTime,
    pub justification: String,
    pub evidence: Vec<String>,
    pub witness_name: Option<String>,
}

/// Approval rules for attendance corrections: a supervisor signs off, and approval
/// rewrites the linked session.
pub struct ManualCorrection;

#[async_trait]
impl ApprovalKind for ManualCorrection {
    type Request = ManualAttendanceRequest;
    type Status = CorrectionStatus;

    const ENTITY: &'static str = "manual attendance request";
    const APPROVED: CorrectionStatus = CorrectionStatus::Approved;
    const REJECTED: CorrectionStatus = CorrectionStatus::Rejected;

    async fn load(&self, engine: &AttendanceEngine, id: Uuid) -> CoreResult<Self::Request> {
        engine
            .bounded("load_manual_request", engine.store().manual_request(id))
            .await?
            .ok_or_else(|| CoreError::not_found(Self::ENTITY, id))
    }

    fn status(request: &Self::Request) -> CorrectionStatus {
        request.status
    }

    fn may_decide(&self, approver: &Principal, request: &Self::Request) -> bool {
        approver.has_any(&APPROVER_ROLES) && approver.user_id != request.requester_id
    }

    fn record(
        &self,
        request: &mut Self::Request,
        status: CorrectionStatus,
        decision: ApprovalDecision,
    ) {
        request.status = status;
        request.decisions.push(decision);
    }

    async fn apply(
        &self,
        engine: &AttendanceEngine,
        request: &Self::Request,
        batch: &mut WriteBatch,
    ) -> CoreResult<()> {
        let existing = engine
            .bounded(
                "load_session",
                engine.store().session(request.assignment_id, request.date),
            )
            .await?;

        match existing {
            Some(mut session) => {
                session.correct(request.claimed_tap_in, request.claimed_tap_out, request.id)?;
                batch.push(Write::update(&mut session));
            }
            None => {
                let mut session = AttendanceSession::corrected(
                    request.assignment_id,
                    request.date,
                    request.claimed_tap_in,
                    request.claimed_tap_out,
                    request.id,
                )?;
                batch.push(Write::insert(&mut session));
            }
        }
        Ok(())
    }
}

impl AttendanceEngine {
    #[instrument(skip(self, principal, input), fields(user_id = principal.user_id, assignment_id = input.assignment_id))]
    pub async fn request_manual_correction(
        &self,
        principal: &Principal,
        input: NewManualCorrection,
    ) -> CoreResult<ManualAttendanceRequest> {
        let assignment = self
            .owned_assignment(input.assignment_id, principal)
            .await?;
        let now = self.clock().now();

        if !assignment.is_active_on(input.date) {
            return Err(CoreError::validation(
                "date falls outside the assignment period",
            ));
        }
        if input.date > now.date() {
            return Err(CoreError::validation("cannot correct a future date"));
        }
        if input.claimed_tap_in.date() != input.date || input.claimed_tap_out.date() != input.date
        {
            return Err(CoreError::validation(
                "claimed times must fall on the corrected date",
            ));
        }
        if input.claimed_tap_out < input.claimed_tap_in {
            return Err(CoreError::validation(
                "claimed tap-out precedes claimed tap-in",
            ));
        }

        let justification = input.justification.trim().to_string();
        let min = self.policy().min_justification_chars;
        if justification.chars().count() < min {
            return Err(CoreError::validation(format!(
                "justification must be at least {min} characters"
            )));
        }

        let evidence: Vec<String> = input
            .evidence
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        let pending = self
            .bounded(
                "load_pending_request",
                self.store()
                    .pending_manual_request(input.assignment_id, input.date),
            )
            .await?;
        if pending.is_some() {
            return Err(CoreError::validation(
                "a correction for this day is already pending",
            ));
        }

        let mut request = ManualAttendanceRequest {
            id: Uuid::new_v4(),
            assignment_id: input.assignment_id,
            date: input.date,
            requester_id: principal.user_id,
            claimed_tap_in: input.claimed_tap_in,
            claimed_tap_out: input.claimed_tap_out,
            justification,
            evidence,
            witness_name: input
                .witness_name
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty()),
            status: CorrectionStatus::Pending,
            decisions: Vec::new(),
            created_at: now,
            version: 0,
        };

        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut request));
        self.bounded("create_manual_request", self.store().commit(batch))
            .await?;

        info!(request_id = %request.id, date = %request.date, "Manual correction requested");
        Ok(request)
    }

    pub async fn decide_manual_correction(
        &self,
        id: Uuid,
        approver: &Principal,
        decision: Decision,
        notes: Option<String>,
    ) -> CoreResult<ManualAttendanceRequest> {
        self.decide(&ManualCorrection, id, approver, decision, notes)
            .await
    }

    pub async fn get_manual_correction(
        &self,
        id: Uuid,
        principal: &Principal,
    ) -> CoreResult<ManualAttendanceRequest> {
        let request = ManualCorrection.load(self, id).await?;
        if request.requester_id != principal.user_id && !principal.has_any(&APPROVER_ROLES) {
            return Err(CoreError::forbidden("not allowed to view this request"));
        }
        Ok(request)
    }
}
