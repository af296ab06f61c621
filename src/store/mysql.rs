use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use sqlx::{FromRow, MySqlConnection, MySqlPool};
use uuid::Uuid;

use super::{HolidayCalendar, Record, Store, StoreError, StoreResult, Write, WriteBatch};
use crate::model::approval::{ApprovalDecision, Decision};
use crate::model::assignment::Assignment;
use crate::model::attendance::{AttendanceSession, SessionStatus};
use crate::model::leave_permit::{LeavePermit, LeaveStatus, PermitMember};
use crate::model::manual_request::ManualAttendanceRequest;
use crate::service::geo::GeoPoint;

const MANUAL_KIND: &str = "manual_correction";
const LEAVE_KIND: &str = "leave_permit";

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn is_duplicate(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        return db_err.code().as_deref() == Some("23000");
    }
    false
}

fn parse<T: FromStr>(what: &str, raw: &str) -> StoreResult<T> {
    T::from_str(raw).map_err(|_| StoreError::Backend(format!("invalid {what} '{raw}'")))
}

fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Backend(format!("invalid uuid '{raw}': {e}")))
}

fn point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    }
}

/* =========================
Row shapes
========================= */

#[derive(FromRow)]
struct AssignmentRow {
    id: u64,
    student_id: u64,
    site_name: String,
    site_lat: f64,
    site_lng: f64,
    radius_meters: Option<u32>,
    work_start: NaiveTime,
    work_end: NaiveTime,
    start_date: NaiveDate,
    end_date: NaiveDate,
    work_days: String,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> StoreResult<Self> {
        let work_days = row
            .work_days
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| parse::<Weekday>("weekday", d))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Assignment {
            id: row.id,
            student_id: row.student_id,
            site_name: row.site_name,
            site: GeoPoint::new(row.site_lat, row.site_lng),
            radius_meters: row.radius_meters,
            work_start: row.work_start,
            work_end: row.work_end,
            start_date: row.start_date,
            end_date: row.end_date,
            work_days,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    assignment_id: u64,
    date: NaiveDate,
    status: String,
    tap_in_at: Option<NaiveDateTime>,
    tap_in_lat: Option<f64>,
    tap_in_lng: Option<f64>,
    tap_in_photo: Option<String>,
    tap_in_event_id: Option<String>,
    tap_out_at: Option<NaiveDateTime>,
    tap_out_lat: Option<f64>,
    tap_out_lng: Option<f64>,
    tap_out_event_id: Option<String>,
    closed_by_reconciliation: bool,
    correction_request_id: Option<String>,
    version: u32,
}

impl TryFrom<SessionRow> for AttendanceSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> StoreResult<Self> {
        Ok(AttendanceSession {
            id: parse_uuid(&row.id)?,
            assignment_id: row.assignment_id,
            date: row.date,
            status: parse::<SessionStatus>("session status", &row.status)?,
            tap_in_at: row.tap_in_at,
            tap_in_location: point(row.tap_in_lat, row.tap_in_lng),
            tap_in_photo: row.tap_in_photo,
            tap_in_event_id: row.tap_in_event_id,
            tap_out_at: row.tap_out_at,
            tap_out_location: point(row.tap_out_lat, row.tap_out_lng),
            tap_out_event_id: row.tap_out_event_id,
            closed_by_reconciliation: row.closed_by_reconciliation,
            correction_request_id: row
                .correction_request_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?,
            version: row.version,
        })
    }
}

#[derive(FromRow)]
struct ManualRequestRow {
    id: String,
    assignment_id: u64,
    date: NaiveDate,
    requester_id: u64,
    claimed_tap_in: NaiveDateTime,
    claimed_tap_out: NaiveDateTime,
    justification: String,
    evidence: String,
    witness_name: Option<String>,
    status: String,
    created_at: NaiveDateTime,
    version: u32,
}

#[derive(FromRow)]
struct LeavePermitRow {
    id: String,
    requester_id: u64,
    requester_type: String,
    leave_type: String,
    reason: String,
    start_at: NaiveDateTime,
    estimated_return_at: Option<NaiveDateTime>,
    member_ids: String,
    status: String,
    rejection_reason: Option<String>,
    confirmed_return_at: Option<NaiveDateTime>,
    returned_at: Option<NaiveDateTime>,
    completion_notes: Option<String>,
    created_at: NaiveDateTime,
    version: u32,
}

#[derive(FromRow)]
struct MemberRow {
    permit_id: String,
    user_id: u64,
    status: String,
    version: u32,
}

#[derive(FromRow)]
struct DecisionRow {
    approver_id: u64,
    decision: String,
    notes: Option<String>,
    decided_at: NaiveDateTime,
}

const SESSION_COLUMNS: &str = r#"
    id, assignment_id, date, status,
    tap_in_at, tap_in_lat, tap_in_lng, tap_in_photo, tap_in_event_id,
    tap_out_at, tap_out_lat, tap_out_lng, tap_out_event_id,
    closed_by_reconciliation, correction_request_id, version
"#;

const ASSIGNMENT_COLUMNS: &str = r#"
    id, student_id, site_name, site_lat, site_lng, radius_meters,
    work_start, work_end, start_date, end_date, work_days
"#;

impl MySqlStore {
    async fn decisions(&self, kind: &str, id: &str) -> StoreResult<Vec<ApprovalDecision>> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            r#"
            SELECT approver_id, decision, notes, decided_at
            FROM approval_decisions
            WHERE request_kind = ? AND request_id = ?
            ORDER BY seq
            "#,
        )
        .bind(kind)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ApprovalDecision {
                    approver_id: row.approver_id,
                    decision: parse::<Decision>("decision", &row.decision)?,
                    notes: row.notes,
                    decided_at: row.decided_at,
                })
            })
            .collect()
    }

    async fn hydrate_manual(&self, row: ManualRequestRow) -> StoreResult<ManualAttendanceRequest> {
        let decisions = self.decisions(MANUAL_KIND, &row.id).await?;
        let evidence: Vec<String> = serde_json::from_str(&row.evidence)
            .map_err(|e| StoreError::Backend(format!("invalid evidence list: {e}")))?;
        Ok(ManualAttendanceRequest {
            id: parse_uuid(&row.id)?,
            assignment_id: row.assignment_id,
            date: row.date,
            requester_id: row.requester_id,
            claimed_tap_in: row.claimed_tap_in,
            claimed_tap_out: row.claimed_tap_out,
            justification: row.justification,
            evidence,
            witness_name: row.witness_name,
            status: parse("correction status", &row.status)?,
            decisions,
            created_at: row.created_at,
            version: row.version,
        })
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn assignment(&self, id: u64) -> StoreResult<Option<Assignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?");
        sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Assignment::try_from)
            .transpose()
    }

    async fn active_assignments(&self, date: NaiveDate) -> StoreResult<Vec<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE start_date <= ? AND end_date >= ? ORDER BY id"
        );
        sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(date)
            .bind(date)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Assignment::try_from)
            .collect()
    }

    async fn session(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_sessions WHERE assignment_id = ? AND date = ?"
        );
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(assignment_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceSession::try_from)
            .transpose()
    }

    async fn manual_request(&self, id: Uuid) -> StoreResult<Option<ManualAttendanceRequest>> {
        let row = sqlx::query_as::<_, ManualRequestRow>(
            r#"
            SELECT id, assignment_id, date, requester_id, claimed_tap_in, claimed_tap_out,
                   justification, evidence, witness_name, status, created_at, version
            FROM manual_attendance_requests
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_manual(row).await?)),
            None => Ok(None),
        }
    }

    async fn pending_manual_request(
        &self,
        assignment_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<ManualAttendanceRequest>> {
        let row = sqlx::query_as::<_, ManualRequestRow>(
            r#"
            SELECT id, assignment_id, date, requester_id, claimed_tap_in, claimed_tap_out,
                   justification, evidence, witness_name, status, created_at, version
            FROM manual_attendance_requests
            WHERE assignment_id = ? AND date = ? AND status = 'Pending'
            LIMIT 1
            "#,
        )
        .bind(assignment_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_manual(row).await?)),
            None => Ok(None),
        }
    }

    async fn leave_permit(&self, id: Uuid) -> StoreResult<Option<LeavePermit>> {
        let row = sqlx::query_as::<_, LeavePermitRow>(
            r#"
            SELECT id, requester_id, requester_type, leave_type, reason, start_at,
                   estimated_return_at, member_ids, status, rejection_reason,
                   confirmed_return_at, returned_at, completion_notes, created_at, version
            FROM leave_permits
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decisions = self.decisions(LEAVE_KIND, &row.id).await?;
        let member_ids: Vec<u64> = serde_json::from_str(&row.member_ids)
            .map_err(|e| StoreError::Backend(format!("invalid member list: {e}")))?;

        Ok(Some(LeavePermit {
            id: parse_uuid(&row.id)?,
            requester_id: row.requester_id,
            requester_type: parse("requester type", &row.requester_type)?,
            leave_type: parse("leave type", &row.leave_type)?,
            reason: row.reason,
            start_at: row.start_at,
            estimated_return_at: row.estimated_return_at,
            member_ids,
            status: parse::<LeaveStatus>("leave status", &row.status)?,
            decisions,
            rejection_reason: row.rejection_reason,
            confirmed_return_at: row.confirmed_return_at,
            returned_at: row.returned_at,
            completion_notes: row.completion_notes,
            created_at: row.created_at,
            version: row.version,
        }))
    }

    async fn permit_members(&self, permit_id: Uuid) -> StoreResult<Vec<PermitMember>> {
        sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT permit_id, user_id, status, version
            FROM leave_permit_members
            WHERE permit_id = ?
            ORDER BY user_id
            "#,
        )
        .bind(permit_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            Ok(PermitMember {
                permit_id: parse_uuid(&row.permit_id)?,
                user_id: row.user_id,
                status: parse("leave status", &row.status)?,
                version: row.version,
            })
        })
        .collect()
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for write in batch.writes {
            apply(&mut *tx, write).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Runs one write inside the open transaction; dropping the transaction on error rolls
/// the batch back.
async fn apply(conn: &mut MySqlConnection, write: Write) -> StoreResult<()> {
    let key = write.key();
    let result = match (&write.record, write.expected_version) {
        (Record::Session(s), None) => insert_session(conn, s).await,
        (Record::Session(s), Some(v)) => update_session(conn, s, v).await,
        (Record::ManualRequest(r), None) => insert_manual(conn, r).await,
        (Record::ManualRequest(r), Some(v)) => update_manual(conn, r, v).await,
        (Record::LeavePermit(p), None) => insert_permit(conn, p).await,
        (Record::LeavePermit(p), Some(v)) => update_permit(conn, p, v).await,
        (Record::PermitMember(m), None) => insert_member(conn, m).await,
        (Record::PermitMember(m), Some(v)) => update_member(conn, m, v).await,
    };

    match result {
        Ok(0) => Err(StoreError::Conflict(key)),
        Ok(_) => Ok(()),
        Err(e) if is_duplicate(&e) => Err(StoreError::Conflict(key)),
        Err(e) => {
            tracing::error!(error = %e, %key, "Write failed");
            Err(e.into())
        }
    }?;

    match &write.record {
        Record::ManualRequest(r) => {
            store_decisions(conn, MANUAL_KIND, r.id, &r.decisions).await
        }
        Record::LeavePermit(p) => store_decisions(conn, LEAVE_KIND, p.id, &p.decisions).await,
        _ => Ok(()),
    }
}

async fn store_decisions(
    conn: &mut MySqlConnection,
    kind: &str,
    request_id: Uuid,
    decisions: &[ApprovalDecision],
) -> StoreResult<()> {
    for (seq, d) in decisions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT IGNORE INTO approval_decisions
                (request_kind, request_id, seq, approver_id, decision, notes, decided_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind)
        .bind(request_id.to_string())
        .bind(seq as u32)
        .bind(d.approver_id)
        .bind(d.decision.as_ref())
        .bind(d.notes.as_deref())
        .bind(d.decided_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_session(conn: &mut MySqlConnection, s: &AttendanceSession) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_sessions
            (id, assignment_id, date, status,
             tap_in_at, tap_in_lat, tap_in_lng, tap_in_photo, tap_in_event_id,
             tap_out_at, tap_out_lat, tap_out_lng, tap_out_event_id,
             closed_by_reconciliation, correction_request_id, version)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(s.id.to_string())
    .bind(s.assignment_id)
    .bind(s.date)
    .bind(s.status.as_ref())
    .bind(s.tap_in_at)
    .bind(s.tap_in_location.map(|p| p.lat))
    .bind(s.tap_in_location.map(|p| p.lng))
    .bind(s.tap_in_photo.as_deref())
    .bind(s.tap_in_event_id.as_deref())
    .bind(s.tap_out_at)
    .bind(s.tap_out_location.map(|p| p.lat))
    .bind(s.tap_out_location.map(|p| p.lng))
    .bind(s.tap_out_event_id.as_deref())
    .bind(s.closed_by_reconciliation)
    .bind(s.correction_request_id.map(|id| id.to_string()))
    .bind(s.version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn update_session(
    conn: &mut MySqlConnection,
    s: &AttendanceSession,
    expected: u32,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE attendance_sessions
        SET status = ?,
            tap_in_at = ?, tap_in_lat = ?, tap_in_lng = ?, tap_in_photo = ?, tap_in_event_id = ?,
            tap_out_at = ?, tap_out_lat = ?, tap_out_lng = ?, tap_out_event_id = ?,
            closed_by_reconciliation = ?, correction_request_id = ?, version = ?
        WHERE assignment_id = ?
        AND date = ?
        AND version = ?
        "#,
    )
    .bind(s.status.as_ref())
    .bind(s.tap_in_at)
    .bind(s.tap_in_location.map(|p| p.lat))
    .bind(s.tap_in_location.map(|p| p.lng))
    .bind(s.tap_in_photo.as_deref())
    .bind(s.tap_in_event_id.as_deref())
    .bind(s.tap_out_at)
    .bind(s.tap_out_location.map(|p| p.lat))
    .bind(s.tap_out_location.map(|p| p.lng))
    .bind(s.tap_out_event_id.as_deref())
    .bind(s.closed_by_reconciliation)
    .bind(s.correction_request_id.map(|id| id.to_string()))
    .bind(s.version)
    .bind(s.assignment_id)
    .bind(s.date)
    .bind(expected)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

fn evidence_json(r: &ManualAttendanceRequest) -> String {
    serde_json::to_string(&r.evidence).unwrap_or_else(|_| "[]".to_string())
}

async fn insert_manual(
    conn: &mut MySqlConnection,
    r: &ManualAttendanceRequest,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO manual_attendance_requests
            (id, assignment_id, date, requester_id, claimed_tap_in, claimed_tap_out,
             justification, evidence, witness_name, status, created_at, version)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(r.id.to_string())
    .bind(r.assignment_id)
    .bind(r.date)
    .bind(r.requester_id)
    .bind(r.claimed_tap_in)
    .bind(r.claimed_tap_out)
    .bind(&r.justification)
    .bind(evidence_json(r))
    .bind(r.witness_name.as_deref())
    .bind(r.status.as_ref())
    .bind(r.created_at)
    .bind(r.version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn update_manual(
    conn: &mut MySqlConnection,
    r: &ManualAttendanceRequest,
    expected: u32,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE manual_attendance_requests
        SET status = ?, version = ?
        WHERE id = ?
        AND version = ?
        "#,
    )
    .bind(r.status.as_ref())
    .bind(r.version)
    .bind(r.id.to_string())
    .bind(expected)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

fn members_json(p: &LeavePermit) -> String {
    serde_json::to_string(&p.member_ids).unwrap_or_else(|_| "[]".to_string())
}

async fn insert_permit(conn: &mut MySqlConnection, p: &LeavePermit) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO leave_permits
            (id, requester_id, requester_type, leave_type, reason, start_at,
             estimated_return_at, member_ids, status, rejection_reason,
             confirmed_return_at, returned_at, completion_notes, created_at, version)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(p.id.to_string())
    .bind(p.requester_id)
    .bind(p.requester_type.as_ref())
    .bind(p.leave_type.as_ref())
    .bind(&p.reason)
    .bind(p.start_at)
    .bind(p.estimated_return_at)
    .bind(members_json(p))
    .bind(p.status.as_ref())
    .bind(p.rejection_reason.as_deref())
    .bind(p.confirmed_return_at)
    .bind(p.returned_at)
    .bind(p.completion_notes.as_deref())
    .bind(p.created_at)
    .bind(p.version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn update_permit(
    conn: &mut MySqlConnection,
    p: &LeavePermit,
    expected: u32,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE leave_permits
        SET status = ?, rejection_reason = ?, confirmed_return_at = ?,
            returned_at = ?, completion_notes = ?, version = ?
        WHERE id = ?
        AND version = ?
        "#,
    )
    .bind(p.status.as_ref())
    .bind(p.rejection_reason.as_deref())
    .bind(p.confirmed_return_at)
    .bind(p.returned_at)
    .bind(p.completion_notes.as_deref())
    .bind(p.version)
    .bind(p.id.to_string())
    .bind(expected)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_member(conn: &mut MySqlConnection, m: &PermitMember) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO leave_permit_members (permit_id, user_id, status, version)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(m.permit_id.to_string())
    .bind(m.user_id)
    .bind(m.status.as_ref())
    .bind(m.version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn update_member(
    conn: &mut MySqlConnection,
    m: &PermitMember,
    expected: u32,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE leave_permit_members
        SET status = ?, version = ?
        WHERE permit_id = ?
        AND user_id = ?
        AND version = ?
        "#,
    )
    .bind(m.status.as_ref())
    .bind(m.version)
    .bind(m.permit_id.to_string())
    .bind(m.user_id)
    .bind(expected)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Holiday lookup against the `holidays` table.
pub struct MySqlHolidays {
    pool: MySqlPool,
}

impl MySqlHolidays {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HolidayCalendar for MySqlHolidays {
    async fn is_holiday(&self, date: NaiveDate) -> StoreResult<bool> {
        let hits = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM holidays WHERE date = ?")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(hits > 0)
    }
}
