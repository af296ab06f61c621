use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::approval::ApprovalDecision;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
pub enum CorrectionStatus {
    Pending,
    Approved,
    Rejected,
}

/// A student's claim that overrides one assignment-day once a supervisor approves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualAttendanceRequest {
    pub id: Uuid,
    pub assignment_id: u64,
    pub date: NaiveDate,
    pub requester_id: u64,
    pub claimed_tap_in: NaiveDateTime,
    pub claimed_tap_out: NaiveDateTime,
    pub justification: String,
    pub evidence: Vec<String>,
    pub witness_name: Option<String>,
    pub status: CorrectionStatus,
    pub decisions: Vec<ApprovalDecision>,
    pub created_at: NaiveDateTime,
    pub version: u32,
}

impl ManualAttendanceRequest {
    pub fn is_pending(&self) -> bool {
        self.status == CorrectionStatus::Pending
    }
}
