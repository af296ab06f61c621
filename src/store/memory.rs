use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::{HolidayCalendar, Record, RecordKey, Store, StoreError, StoreResult, WriteBatch};
use crate::model::assignment::Assignment;
use crate::model::attendance::AttendanceSession;
use crate::model::leave_permit::{LeavePermit, PermitMember};
use crate::model::manual_request::ManualAttendanceRequest;

#[derive(Default)]
struct Tables {
    assignments: BTreeMap<u64, Assignment>,
    sessions: HashMap<(u64, NaiveDate), AttendanceSession>,
    manual_requests: HashMap<Uuid, ManualAttendanceRequest>,
    permits: HashMap<Uuid, LeavePermit>,
    members: BTreeMap<(Uuid, u64), PermitMember>,
    faults: HashSet<RecordKey>,
}

impl Tables {
    fn version_of(&self, key: &RecordKey) -> Option<u32> {
        match key {
            RecordKey::Session {
                assignment_id,
                date,
            } => self.sessions.get(&(*assignment_id, *date)).map(|s| s.version),
            RecordKey::ManualRequest(id) => self.manual_requests.get(id).map(|r| r.version),
            RecordKey::LeavePermit(id) => self.permits.get(id).map(|p| p.version),
            RecordKey::PermitMember { permit_id, user_id } => self
                .members
                .get(&(*permit_id, *user_id))
                .map(|m| m.version),
        }
    }

    /// Another request already holds the pending slot for `request`'s assignment-day.
    fn pending_day_taken(&self, request: &ManualAttendanceRequest) -> bool {
        request.is_pending()
            && self.manual_requests.values().any(|other| {
                other.id != request.id
                    && other.assignment_id == request.assignment_id
                    && other.date == request.date
                    && other.is_pending()
            })
    }

    fn put(&mut self, record: Record) {
        match record {
            Record::Session(s) => {
                self.sessions.insert((s.assignment_id, s.date), s);
            }
            Record::ManualRequest(r) => {
                self.manual_requests.insert(r.id, r);
            }
            Record::LeavePermit(p) => {
                self.permits.insert(p.id, p);
            }
            Record::PermitMember(m) => {
                self.members.insert((m.permit_id, m.user_id), m);
            }
        }
    }
}

/// Process-local store. Backs the test suite and storage-less local runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    pub fn insert_assignment(&self, assignment: Assignment) -> StoreResult<()> {
        self.tables()?
            .assignments
            .insert(assignment.id, assignment);
        Ok(())
    }

    /// Makes the next write touching `key` fail with a backend error, aborting its batch.
    pub fn inject_write_fault(&self, key: RecordKey) -> StoreResult<()> {
        self.tables()?.faults.insert(key);
        Ok(())
    }

    pub fn session_count(&self) -> StoreResult<usize> {
        Ok(self.tables()?.sessions.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn assignment(&self, id: u64) -> StoreResult<Option<Assignment>> {
        Ok(self.tables()?.assignments.get(&id).cloned())
    }

    async fn active_assignments(&self, date: NaiveDate) -> StoreResult<Vec<Assignment>> {
        Ok(self
            .tables()?
            .assignments
            .values()
            .filter(|a| a.is_active_on(date))
            .cloned()
            .collect())
    }

    async fn session(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceSession>> {
        Ok(self.tables()?.sessions.get(&(assignment_id, date)).cloned())
    }

    async fn manual_request(&self, id: Uuid) -> StoreResult<Option<ManualAttendanceRequest>> {
        Ok(self.tables()?.manual_requests.get(&id).cloned())
    }

    async fn pending_manual_request(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<ManualAttendanceRequest>> {
        Ok(self
            .tables()?
            .manual_requests
            .values()
            .find(|r| r.assignment_id == assignment_id && r.date == date && r.is_pending())
            .cloned())
    }

    async fn leave_permit(&self, id: Uuid) -> StoreResult<Option<LeavePermit>> {
        Ok(self.tables()?.permits.get(&id).cloned())
    }

    async fn permit_members(&self, permit_id: Uuid) -> StoreResult<Vec<PermitMember>> {
        Ok(self
            .tables()?
            .members
            .range((permit_id, u64::MIN)..=(permit_id, u64::MAX))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables()?;

        // Validate the whole batch before touching anything.
        for write in &batch.writes {
            let key = write.key();
            if tables.faults.remove(&key) {
                return Err(StoreError::Backend(format!("write to {key} failed")));
            }
            match (write.expected_version, tables.version_of(&key)) {
                (None, None) => {}
                (Some(expected), Some(current)) if expected == current => {}
                _ => return Err(StoreError::Conflict(key)),
            }
            if let Record::ManualRequest(request) = &write.record {
                if tables.pending_day_taken(request) {
                    return Err(StoreError::Conflict(key));
                }
            }
        }

        for write in batch.writes {
            tables.put(write.record);
        }
        Ok(())
    }
}

/// Fixed holiday list.
#[derive(Debug, Default, Clone)]
pub struct StaticHolidays {
    dates: BTreeSet<NaiveDate>,
}

impl StaticHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }
}

#[async_trait]
impl HolidayCalendar for StaticHolidays {
    async fn is_holiday(&self, date: NaiveDate) -> StoreResult<bool> {
        Ok(self.dates.contains(&date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::manual_request::CorrectionStatus;
    use crate::service::geo::GeoPoint;
    use crate::store::Write;

    fn session(assignment_id: u64) -> AttendanceSession {
        let at = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        AttendanceSession::open(assignment_id, at, GeoPoint::new(0.0, 0.0), None, None)
    }

    #[tokio::test]
    async fn second_insert_on_same_key_conflicts() {
        let store = MemoryStore::new();
        let mut first = WriteBatch::new();
        first.push(Write::insert(&mut session(1)));
        store.commit(first).await.unwrap();

        let mut second = WriteBatch::new();
        second.push(Write::insert(&mut session(1)));
        let err = store.commit(second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let store = MemoryStore::new();
        store
            .inject_write_fault(RecordKey::Session {
                assignment_id: 2,
                date: session(2).date,
            })
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut session(1)));
        batch.push(Write::insert(&mut session(2)));
        assert!(store.commit(batch).await.is_err());
        assert_eq!(store.session_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut session(1)));
        store.commit(batch).await.unwrap();

        let mut stored = store
            .session(1, session(1).date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 1);

        let mut stale_copy = stored.clone();
        let mut ok = WriteBatch::new();
        ok.push(Write::update(&mut stored));
        store.commit(ok).await.unwrap();
        assert_eq!(stored.version, 2);

        let mut stale = WriteBatch::new();
        stale.push(Write::update(&mut stale_copy));
        assert!(matches!(
            store.commit(stale).await,
            Err(StoreError::Conflict(_))
        ));
    }

    fn pending_request(assignment_id: u64) -> ManualAttendanceRequest {
        let day = session(assignment_id).date;
        ManualAttendanceRequest {
            id: Uuid::new_v4(),
            assignment_id,
            date: day,
            requester_id: 10,
            claimed_tap_in: day.and_hms_opt(8, 0, 0).unwrap(),
            claimed_tap_out: day.and_hms_opt(16, 0, 0).unwrap(),
            justification: "Forgot to tap out, supervisor saw me leave".into(),
            evidence: Vec::new(),
            witness_name: None,
            status: CorrectionStatus::Pending,
            decisions: Vec::new(),
            created_at: day.and_hms_opt(18, 0, 0).unwrap(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn one_pending_request_per_assignment_day() {
        let store = MemoryStore::new();
        let mut first = pending_request(1);
        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut first));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut pending_request(1)));
        assert!(matches!(
            store.commit(batch).await,
            Err(StoreError::Conflict(RecordKey::ManualRequest(_)))
        ));

        // Other days are free, and so is this one once the first is decided.
        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut pending_request(2)));
        store.commit(batch).await.unwrap();

        first.status = CorrectionStatus::Rejected;
        let mut batch = WriteBatch::new();
        batch.push(Write::update(&mut first));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(Write::insert(&mut pending_request(1)));
        store.commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = MemoryStore::new();
        store.commit(WriteBatch::new()).await.unwrap();
        assert_eq!(store.session_count().unwrap(), 0);
    }
}
