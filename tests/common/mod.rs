#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use placement_attendance::clock::ManualClock;
use placement_attendance::model::assignment::{Assignment, default_work_days};
use placement_attendance::model::attendance::AttendanceSession;
use placement_attendance::model::leave_permit::{LeavePermit, PermitMember};
use placement_attendance::model::manual_request::ManualAttendanceRequest;
use placement_attendance::model::role::{Principal, Role};
use placement_attendance::service::geo::GeoPoint;
use placement_attendance::service::{AttendanceEngine, Policy};
use placement_attendance::store::{MemoryStore, StaticHolidays, Store, StoreResult, WriteBatch};
use uuid::Uuid;

pub const STUDENT: u64 = 10;
pub const SITE: GeoPoint = GeoPoint::new(0.0, 0.0);

/// Monday.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

pub fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, 0).unwrap()
}

pub fn assignment(id: u64, student_id: u64) -> Assignment {
    Assignment {
        id,
        student_id,
        site_name: "PT Maju Jaya".into(),
        site: SITE,
        radius_meters: Some(100),
        work_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        work_end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        start_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 5, 29).unwrap(),
        work_days: default_work_days(),
    }
}

pub fn student(user_id: u64) -> Principal {
    Principal::new(user_id, [Role::Student])
}

pub fn staff(user_id: u64, role: Role) -> Principal {
    Principal::new(user_id, [role])
}

pub struct Harness {
    pub engine: Arc<AttendanceEngine>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_holidays([])
    }

    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_assignment(assignment(1, STUDENT)).unwrap();
        let clock = Arc::new(ManualClock::new(at(monday(), 7, 5)));
        let engine = Arc::new(AttendanceEngine::new(
            store.clone(),
            Arc::new(StaticHolidays::new(holidays)),
            clock.clone(),
            Policy::default(),
        ));
        Self {
            engine,
            store,
            clock,
        }
    }
}

/// Wraps the memory store and stalls selected reads, to exercise timeouts and overlap.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
    pub slow_sessions: bool,
    pub slow_listing: bool,
    pub slow_pending: bool,
    /// Number of sweeps that listed active assignments.
    pub listings: AtomicUsize,
}

impl SlowStore {
    async fn stall(&self, enabled: bool) {
        if enabled {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl Store for SlowStore {
    async fn assignment(&self, id: u64) -> StoreResult<Option<Assignment>> {
        self.inner.assignment(id).await
    }

    async fn active_assignments(&self, date: NaiveDate) -> StoreResult<Vec<Assignment>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.stall(self.slow_listing).await;
        self.inner.active_assignments(date).await
    }

    async fn session(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceSession>> {
        self.stall(self.slow_sessions).await;
        self.inner.session(assignment_id, date).await
    }

    async fn manual_request(&self, id: Uuid) -> StoreResult<Option<ManualAttendanceRequest>> {
        self.inner.manual_request(id).await
    }

    async fn pending_manual_request(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<ManualAttendanceRequest>> {
        self.stall(self.slow_pending).await;
        self.inner.pending_manual_request(assignment_id, date).await
    }

    async fn leave_permit(&self, id: Uuid) -> StoreResult<Option<LeavePermit>> {
        self.inner.leave_permit(id).await
    }

    async fn permit_members(&self, permit_id: Uuid) -> StoreResult<Vec<PermitMember>> {
        self.inner.permit_members(permit_id).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.inner.commit(batch).await
    }
}
