use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::approval::ApprovalDecision;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
pub enum RequesterType {
    Student,
    Teacher,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Sick,
    Family,
    Personal,
    Official,
    Other,
}

/// Open -> Proses -> Close (approved) | Ditolak (rejected).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
pub enum LeaveStatus {
    Open,
    Proses,
    Close,
    Ditolak,
}

impl LeaveStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LeaveStatus::Close | LeaveStatus::Ditolak)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeavePermit {
    pub id: Uuid,
    pub requester_id: u64,
    pub requester_type: RequesterType,
    pub leave_type: LeaveType,
    pub reason: String,
    pub start_at: NaiveDateTime,
    pub estimated_return_at: Option<NaiveDateTime>,
    /// Named members of a group permit; empty for individual permits.
    pub member_ids: Vec<u64>,
    pub status: LeaveStatus,
    pub decisions: Vec<ApprovalDecision>,
    pub rejection_reason: Option<String>,
    pub confirmed_return_at: Option<NaiveDateTime>,
    pub returned_at: Option<NaiveDateTime>,
    pub completion_notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub version: u32,
}

impl LeavePermit {
    pub fn is_group(&self) -> bool {
        !self.member_ids.is_empty()
    }

    /// Everyone the decision lands on: the requester plus each distinct named member.
    pub fn affected_user_ids(&self) -> Vec<u64> {
        let mut ids = vec![self.requester_id];
        for id in &self.member_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

/// Per-person leave entry a permit fans out to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitMember {
    pub permit_id: Uuid,
    pub user_id: u64,
    pub status: LeaveStatus,
    pub version: u32,
}
