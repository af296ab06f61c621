//! Storage collaborator used by the engine.
//!
//! Reads are plain lookups. Every mutation goes through [`Store::commit`], which
//! applies a [`WriteBatch`] all-or-nothing and checks record versions so concurrent
//! writers on the same key cannot both win.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::assignment::Assignment;
use crate::model::attendance::AttendanceSession;
use crate::model::leave_permit::{LeavePermit, PermitMember};
use crate::model::manual_request::ManualAttendanceRequest;

pub mod memory;
pub mod mysql;

pub use memory::{MemoryStore, StaticHolidays};
pub use mysql::{MySqlHolidays, MySqlStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict on {0}")]
    Conflict(RecordKey),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(key) => CoreError::ConcurrentModification {
                key: key.to_string(),
            },
            StoreError::Backend(message) => CoreError::Storage(message),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Session { assignment_id: u64, date: NaiveDate },
    ManualRequest(Uuid),
    LeavePermit(Uuid),
    PermitMember { permit_id: Uuid, user_id: u64 },
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Session {
                assignment_id,
                date,
            } => write!(f, "session({assignment_id}, {date})"),
            RecordKey::ManualRequest(id) => write!(f, "manual_request({id})"),
            RecordKey::LeavePermit(id) => write!(f, "leave_permit({id})"),
            RecordKey::PermitMember { permit_id, user_id } => {
                write!(f, "permit_member({permit_id}, {user_id})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Session(AttendanceSession),
    ManualRequest(ManualAttendanceRequest),
    LeavePermit(LeavePermit),
    PermitMember(PermitMember),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Session(s) => RecordKey::Session {
                assignment_id: s.assignment_id,
                date: s.date,
            },
            Record::ManualRequest(r) => RecordKey::ManualRequest(r.id),
            Record::LeavePermit(p) => RecordKey::LeavePermit(p.id),
            Record::PermitMember(m) => RecordKey::PermitMember {
                permit_id: m.permit_id,
                user_id: m.user_id,
            },
        }
    }
}

/// A record that carries an optimistic-concurrency version.
pub trait Versioned: Clone + Into<Record> {
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

macro_rules! versioned {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Record {
                fn from(record: $ty) -> Self {
                    Record::$variant(record)
                }
            }

            impl Versioned for $ty {
                fn version(&self) -> u32 {
                    self.version
                }

                fn set_version(&mut self, version: u32) {
                    self.version = version;
                }
            }
        )*
    };
}

versioned! {
    AttendanceSession => Session,
    ManualAttendanceRequest => ManualRequest,
    LeavePermit => LeavePermit,
    PermitMember => PermitMember,
}

/// A single versioned write.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub record: Record,
    /// `None` inserts and requires the key to be absent.
    pub expected_version: Option<u32>,
}

impl Write {
    /// Stamps `record` with version 1 and stages its insertion.
    pub fn insert<T: Versioned>(record: &mut T) -> Self {
        record.set_version(1);
        Self {
            record: record.clone().into(),
            expected_version: None,
        }
    }

    /// Bumps `record` to its next version and stages an update guarded by the current one.
    pub fn update<T: Versioned>(record: &mut T) -> Self {
        let current = record.version();
        record.set_version(current + 1);
        Self {
            record: record.clone().into(),
            expected_version: Some(current),
        }
    }

    pub fn key(&self) -> RecordKey {
        self.record.key()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn assignment(&self, id: u64) -> StoreResult<Option<Assignment>>;

    /// Assignments whose date range covers `date`.
    async fn active_assignments(&self, date: NaiveDate) -> StoreResult<Vec<Assignment>>;

    async fn session(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceSession>>;

    async fn manual_request(&self, id: Uuid) -> StoreResult<Option<ManualAttendanceRequest>>;

    async fn pending_manual_request(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<ManualAttendanceRequest>>;

    async fn leave_permit(&self, id: Uuid) -> StoreResult<Option<LeavePermit>>;

    async fn permit_members(&self, permit_id: Uuid) -> StoreResult<Vec<PermitMember>>;

    /// Applies every write or none of them.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}

/// External "is this a registered holiday" lookup.
#[async_trait]
pub trait HolidayCalendar: Send + Sync {
    async fn is_holiday(&self, date: NaiveDate) -> StoreResult<bool>;
}
