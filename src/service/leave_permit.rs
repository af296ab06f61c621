use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::AttendanceEngine;
use super::approval::ApprovalKind;
use crate::error::{CoreError, CoreResult};
use crate::model::approval::{ApprovalDecision, Decision};
use crate::model::leave_permit::{
    LeavePermit, LeaveStatus, LeaveType, PermitMember, RequesterType,
};
use crate::model::role::{Principal, Role};
use crate::store::{Write, WriteBatch};

#[derive(Debug, Clone)]
pub struct NewLeavePermit {
    pub requester_type: RequesterType,
    pub leave_type: LeaveType,
    pub reason: String,
    pub start_at: NaiveDateTime,
    pub estimated_return_at: Option<NaiveDateTime>,
    pub member_ids: Vec<u64>,
}

fn eligible_approver(approver: &Principal, permit: &LeavePermit) -> bool {
    if approver.user_id == permit.requester_id {
        return false;
    }
    match permit.requester_type {
        RequesterType::Student => approver.has_any(&[Role::WaliKelas, Role::Admin]),
        RequesterType::Teacher => approver.has_role(Role::Admin),
    }
}

/// Approval rules for leave permits. The decision fans out to every member entry.
#[derive(Debug, Clone, Default)]
pub struct LeaveDecision {
    /// Return schedule confirmed by the approver.
    pub confirmed_return_at: Option<NaiveDateTime>,
}

impl LeaveDecision {
    async fn fan_out(
        &self,
        engine: &AttendanceEngine,
        permit: &LeavePermit,
        status: LeaveStatus,
        batch: &mut WriteBatch,
    ) -> CoreResult<()> {
        let members = engine
            .bounded("load_permit_members", engine.store().permit_members(permit.id))
            .await?;

        for user_id in permit.affected_user_ids() {
            let mut member = members
                .iter()
                .find(|m| m.user_id == user_id)
                .cloned()
                .ok_or_else(|| {
                    CoreError::not_found("permit member", format!("{}/{user_id}", permit.id))
                })?;
            member.status = status;
            batch.push(Write::update(&mut member));
        }
        Ok(())
    }
}

#[async_trait]
impl ApprovalKind for LeaveDecision {
    type Request = LeavePermit;
    type Status = LeaveStatus;

    const ENTITY: &'static str = "leave permit";
    const APPROVED: LeaveStatus = LeaveStatus::Close;
    const REJECTED: LeaveStatus = LeaveStatus::Ditolak;

    async fn load(&self, engine: &AttendanceEngine, id: Uuid) -> CoreResult<LeavePermit> {
        engine
            .bounded("load_leave_permit", engine.store().leave_permit(id))
            .await?
            .ok_or_else(|| CoreError::not_found(Self::ENTITY, id))
    }

    fn status(request: &LeavePermit) -> LeaveStatus {
        request.status
    }

    fn may_decide(&self, approver: &Principal, request: &LeavePermit) -> bool {
        eligible_approver(approver, request)
    }

    fn check_decision(&self, decision: &ApprovalDecision) -> CoreResult<()> {
        if decision.decision == Decision::Rejected && decision.notes.is_none() {
            return Err(CoreError::validation("a rejection needs a reason"));
        }
        Ok(())
    }

    fn record(&self, request: &mut LeavePermit, status: LeaveStatus, decision: ApprovalDecision) {
        match decision.decision {
            Decision::Rejected => request.rejection_reason = decision.notes.clone(),
            Decision::Approved => {
                if self.confirmed_return_at.is_some() {
                    request.confirmed_return_at = self.confirmed_return_at;
                }
            }
        }
        request.status = status;
        request.decisions.push(decision);
    }

    async fn apply(
        &self,
        engine: &AttendanceEngine,
        request: &LeavePermit,
        batch: &mut WriteBatch,
    ) -> CoreResult<()> {
        self.fan_out(engine, request, LeaveStatus::Close, batch)
            .await
    }

    async fn on_rejected(
        &self,
        engine: &AttendanceEngine,
        request: &LeavePermit,
        batch: &mut WriteBatch,
    ) -> CoreResult<()> {
        self.fan_out(engine, request, LeaveStatus::Ditolak, batch)
            .await
    }
}

impl AttendanceEngine {
    #[instrument(skip(self, principal, input), fields(user_id = principal.user_id))]
    pub async fn create_leave_permit(
        &self,
        principal: &Principal,
        input: NewLeavePermit,
    ) -> CoreResult<LeavePermit> {
        match input.requester_type {
            RequesterType::Student if !principal.has_role(Role::Student) => {
                return Err(CoreError::forbidden("only students file student permits"));
            }
            RequesterType::Teacher if !principal.has_any(&[Role::Teacher, Role::WaliKelas]) => {
                return Err(CoreError::forbidden("only teachers file teacher permits"));
            }
            _ => {}
        }

        let reason = input.reason.trim().to_string();
        if reason.is_empty() {
            return Err(CoreError::validation("reason is required"));
        }
        if let Some(back) = input.estimated_return_at {
            if back <= input.start_at {
                return Err(CoreError::validation(
                    "estimated return must be after the start",
                ));
            }
        }

        let mut member_ids: Vec<u64> = Vec::new();
        for id in input.member_ids {
            if id != principal.user_id && !member_ids.contains(&id) {
                member_ids.push(id);
            }
        }
        if input.requester_type == RequesterType::Teacher && !member_ids.is_empty() {
            return Err(CoreError::validation("teacher permits are always individual"));
        }

        let mut permit = LeavePermit {
            id: Uuid::new_v4(),
            requester_id: principal.user_id,
            requester_type: input.requester_type,
            leave_type: input.leave_type,
            reason,
            start_at: input.start_at,
            estimated_return_at: input.estimated_return_at,
            member_ids,
            status: LeaveStatus::Open,
            decisions: Vec::new(),
            rejection_reason: None,
            confirmed_return_at: None,
            returned_at: None,
            completion_notes: None,
            created_at: self.clock().now(),
            version: 0,
        };

        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut permit));
        for user_id in permit.affected_user_ids() {
            let mut member = PermitMember {
                permit_id: permit.id,
                user_id,
                status: LeaveStatus::Open,
                version: 0,
            };
            batch.push(Write::insert(&mut member));
        }
        self.bounded("create_leave_permit", self.store().commit(batch))
            .await?;

        info!(
            permit_id = %permit.id,
            group = permit.is_group(),
            members = permit.member_ids.len(),
            "Leave permit filed"
        );
        Ok(permit)
    }

    /// Open -> Proses. Repeating it on a permit already under review changes nothing.
    #[instrument(skip(self, approver), fields(approver = approver.user_id))]
    pub async fn start_leave_review(
        &self,
        id: Uuid,
        approver: &Principal,
    ) -> CoreResult<LeavePermit> {
        let kind = LeaveDecision::default();
        let mut permit = kind.load(self, id).await?;

        if permit.status.is_terminal() {
            return Err(CoreError::AlreadyDecided {
                entity: LeaveDecision::ENTITY,
                id: id.to_string(),
                status: permit.status.to_string(),
            });
        }
        if !eligible_approver(approver, &permit) {
            return Err(CoreError::forbidden(
                "not an eligible approver for this leave permit",
            ));
        }
        if permit.status == LeaveStatus::Proses {
            return Ok(permit);
        }

        permit.status = LeaveStatus::Proses;
        let mut batch = WriteBatch::new();
        kind.fan_out(self, &permit, LeaveStatus::Proses, &mut batch)
            .await?;
        batch.push(Write::update(&mut permit));
        self.bounded("review_leave_permit", self.store().commit(batch))
            .await?;

        info!(permit_id = %id, "Leave permit under review");
        Ok(permit)
    }

    pub async fn decide_leave_permit(
        &self,
        id: Uuid,
        approver: &Principal,
        decision: Decision,
        notes: Option<String>,
        confirmed_return_at: Option<NaiveDateTime>,
    ) -> CoreResult<LeavePermit> {
        let kind = LeaveDecision {
            confirmed_return_at,
        };
        self.decide(&kind, id, approver, decision, notes).await
    }

    /// Completion notes once the person is back. Only for approved permits, once.
    #[instrument(skip(self, principal, notes), fields(user_id = principal.user_id))]
    pub async fn record_leave_return(
        &self,
        id: Uuid,
        principal: &Principal,
        returned_at: Option<NaiveDateTime>,
        notes: Option<String>,
    ) -> CoreResult<LeavePermit> {
        let mut permit = LeaveDecision::default().load(self, id).await?;

        if permit.requester_id != principal.user_id && !eligible_approver(principal, &permit) {
            return Err(CoreError::forbidden("not allowed to close out this permit"));
        }
        if permit.status != LeaveStatus::Close {
            return Err(CoreError::validation(
                "only approved permits record a return",
            ));
        }
        if permit.returned_at.is_some() {
            return Err(CoreError::validation("return already recorded"));
        }

        let returned_at = returned_at.unwrap_or_else(|| self.clock().now());
        if returned_at < permit.start_at {
            return Err(CoreError::validation("return precedes the leave start"));
        }

        permit.returned_at = Some(returned_at);
        permit.completion_notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let mut batch = WriteBatch::new();
        batch.push(Write::update(&mut permit));
        self.bounded("record_leave_return", self.store().commit(batch))
            .await?;

        info!(permit_id = %id, "Leave return recorded");
        Ok(permit)
    }

    pub async fn get_leave_permit(
        &self,
        id: Uuid,
        principal: &Principal,
    ) -> CoreResult<(LeavePermit, Vec<PermitMember>)> {
        let permit = LeaveDecision::default().load(self, id).await?;
        let involved = permit.requester_id == principal.user_id
            || permit.member_ids.contains(&principal.user_id);
        if !involved && !principal.has_any(&[Role::Teacher, Role::WaliKelas, Role::Admin]) {
            return Err(CoreError::forbidden("not allowed to view this permit"));
        }
        let members = self
            .bounded("load_permit_members", self.store().permit_members(id))
            .await?;
        Ok((permit, members))
    }
}
