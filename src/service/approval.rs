//! Generic single-approver decision process.
//!
//! A request kind plugs in its role predicate, its terminal states and the domain
//! writes an approval implies. The engine checks preconditions, stages the request's
//! terminal write together with those domain writes, and commits them as one batch.

use std::fmt::Display;

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use super::AttendanceEngine;
use crate::error::{CoreError, CoreResult};
use crate::model::approval::{ApprovalDecision, Decision};
use crate::model::role::Principal;
use crate::store::{Versioned, Write, WriteBatch};

#[async_trait]
pub trait ApprovalKind: Send + Sync {
    type Request: Versioned + Send + Sync;
    type Status: Copy + PartialEq + Display + Send;

    /// Entity name used in errors and logs.
    const ENTITY: &'static str;
    const APPROVED: Self::Status;
    const REJECTED: Self::Status;

    async fn load(&self, engine: &AttendanceEngine, id: Uuid) -> CoreResult<Self::Request>;

    fn status(request: &Self::Request) -> Self::Status;

    /// True while the request can still receive a decision.
    fn is_pending(request: &Self::Request) -> bool {
        let status = Self::status(request);
        status != Self::APPROVED && status != Self::REJECTED
    }

    fn may_decide(&self, approver: &Principal, request: &Self::Request) -> bool;

    /// Kind-specific checks on the decision itself, such as a mandatory reason.
    fn check_decision(&self, _decision: &ApprovalDecision) -> CoreResult<()> {
        Ok(())
    }

    /// Moves the request into its terminal state and records the decision on it.
    fn record(&self, request: &mut Self::Request, status: Self::Status, decision: ApprovalDecision);

    /// Domain writes an approval implies. Only called on approval.
    async fn apply(
        &self,
        engine: &AttendanceEngine,
        request: &Self::Request,
        batch: &mut WriteBatch,
    ) -> CoreResult<()>;

    /// Domain writes a rejection implies. Nothing by default.
    async fn on_rejected(
        &self,
        _engine: &AttendanceEngine,
        _request: &Self::Request,
        _batch: &mut WriteBatch,
    ) -> CoreResult<()> {
        Ok(())
    }
}

impl AttendanceEngine {
    /// Records `decision` on request `id` of kind `K`, atomically with its side effects.
    #[instrument(skip(self, kind, approver, notes), fields(entity = K::ENTITY, approver = approver.user_id))]
    pub async fn decide<K: ApprovalKind>(
        &self,
        kind: &K,
        id: Uuid,
        approver: &Principal,
        decision: Decision,
        notes: Option<String>,
    ) -> CoreResult<K::Request> {
        let request = kind.load(self, id).await?;

        if !K::is_pending(&request) {
            return Err(CoreError::AlreadyDecided {
                entity: K::ENTITY,
                id: id.to_string(),
                status: K::status(&request).to_string(),
            });
        }
        if !kind.may_decide(approver, &request) {
            return Err(CoreError::forbidden(format!(
                "not an eligible approver for this {}",
                K::ENTITY
            )));
        }

        let record = ApprovalDecision {
            approver_id: approver.user_id,
            decision,
            notes: notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            decided_at: self.clock().now(),
        };
        kind.check_decision(&record)?;

        let mut updated = request.clone();
        let status = match decision {
            Decision::Approved => K::APPROVED,
            Decision::Rejected => K::REJECTED,
        };
        kind.record(&mut updated, status, record);

        let mut batch = WriteBatch::new();
        match decision {
            Decision::Approved => kind.apply(self, &updated, &mut batch).await?,
            Decision::Rejected => kind.on_rejected(self, &updated, &mut batch).await?,
        }
        batch.push(Write::update(&mut updated));

        let writes = batch.len();
        self.bounded("commit_decision", self.store().commit(batch))
            .await
            .inspect_err(|e| {
                tracing::warn!(%id, error = %e, "Decision not committed, request left pending");
            })?;

        info!(%id, %status, writes, "Decision recorded");
        Ok(updated)
    }
}
