use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// One approver's verdict on a workflow instance.
///
/// Requests keep these in an ordered list. Chains are single-approver today, so the
/// first decision is also the terminal one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approver_id: u64,
    pub decision: Decision,
    pub notes: Option<String>,
    pub decided_at: NaiveDateTime,
}
