//! End-of-day sweep: closes sessions left open and marks missed working days absent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use super::AttendanceEngine;
use crate::error::{CoreError, CoreResult};
use crate::model::assignment::Assignment;
use crate::model::attendance::AttendanceSession;
use crate::store::{Write, WriteBatch};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconciliationFailure {
    pub assignment_id: u64,
    #[schema(example = "ConcurrentModification")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconciliationReport {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    /// Assignments examined, whatever the outcome.
    pub processed: usize,
    pub auto_closed: Vec<u64>,
    pub marked_absent: Vec<u64>,
    pub skipped: usize,
    pub failures: Vec<ReconciliationFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    AutoClosed,
    MarkedAbsent,
    Untouched,
}

impl AttendanceEngine {
    /// Sweeps every assignment active on `date`. Safe to run again for the same date.
    ///
    /// Refused until the civil clock has reached `date`'s cutoff, so a sweep can never
    /// close a window that is still open.
    #[instrument(skip(self))]
    pub async fn run_reconciliation(&self, date: NaiveDate) -> CoreResult<ReconciliationReport> {
        let cutoff = date.and_time(self.policy().reconciliation_cutoff);
        if self.clock().now() < cutoff {
            return Err(CoreError::validation(format!(
                "reconciliation for {date} is not allowed before {cutoff}"
            )));
        }

        let assignments = self
            .bounded(
                "load_active_assignments",
                self.store().active_assignments(date),
            )
            .await?;

        let mut report = ReconciliationReport {
            date,
            processed: 0,
            auto_closed: Vec::new(),
            marked_absent: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
        };

        for assignment in &assignments {
            report.processed += 1;
            match self.reconcile_one(assignment, date, cutoff).await {
                Ok(Outcome::AutoClosed) => {
                    debug!(assignment_id = assignment.id, "Auto-closed open session");
                    report.auto_closed.push(assignment.id);
                }
                Ok(Outcome::MarkedAbsent) => {
                    debug!(assignment_id = assignment.id, "Marked absent");
                    report.marked_absent.push(assignment.id);
                }
                Ok(Outcome::Untouched) => report.skipped += 1,
                Err(e) => {
                    warn!(assignment_id = assignment.id, error = %e, "Reconciliation failed for assignment");
                    report.failures.push(ReconciliationFailure {
                        assignment_id: assignment.id,
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            %date,
            processed = report.processed,
            auto_closed = report.auto_closed.len(),
            marked_absent = report.marked_absent.len(),
            failures = report.failures.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        assignment: &Assignment,
        date: NaiveDate,
        cutoff: NaiveDateTime,
    ) -> CoreResult<Outcome> {
        let existing = self
            .bounded("load_session", self.store().session(assignment.id, date))
            .await?;

        let mut batch = WriteBatch::new();
        match existing {
            Some(mut session) => {
                if !session.auto_close(cutoff) {
                    return Ok(Outcome::Untouched);
                }
                batch.push(Write::update(&mut session));
                self.bounded("auto_close_session", self.store().commit(batch))
                    .await?;
                Ok(Outcome::AutoClosed)
            }
            None => {
                if !assignment.works_on(date) || self.is_holiday(date).await? {
                    return Ok(Outcome::Untouched);
                }
                let mut session = AttendanceSession::absent(assignment.id, date);
                batch.push(Write::insert(&mut session));
                self.bounded("mark_absent", self.store().commit(batch))
                    .await?;
                Ok(Outcome::MarkedAbsent)
            }
        }
    }
}

/// Owns the only guard against overlapping sweeps. A trigger that arrives while a run
/// is active is dropped, not queued.
pub struct ReconciliationRunner {
    engine: Arc<AttendanceEngine>,
    running: AtomicBool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReconciliationRunner {
    pub fn new(engine: Arc<AttendanceEngine>) -> Self {
        Self {
            engine,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Current civil date according to the engine clock.
    pub fn today(&self) -> NaiveDate {
        self.engine.clock().now().date()
    }

    /// Runs the sweep for `date`, or returns `None` when a previous run is still active.
    pub async fn trigger(&self, date: NaiveDate) -> Option<CoreResult<ReconciliationReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(%date, "Reconciliation still running, trigger skipped");
            return None;
        }
        let _guard = RunGuard(&self.running);
        Some(self.engine.run_reconciliation(date).await)
    }

    /// Sleeps until each day's cutoff in civil time and sweeps that day.
    pub async fn run_daily(self: Arc<Self>) {
        let cutoff = self.engine.policy().reconciliation_cutoff;
        let mut last_due: Option<NaiveDateTime> = None;

        loop {
            let Some(due) = next_due(self.engine.clock().now(), cutoff, last_due) else {
                error!("Calendar exhausted, reconciliation ticker stopped");
                return;
            };
            info!(%due, "Next reconciliation scheduled");

            // The timer and the civil clock may disagree; only fire once the clock agrees.
            loop {
                let now = self.engine.clock().now();
                if now >= due {
                    break;
                }
                tokio::time::sleep((due - now).to_std().unwrap_or_default()).await;
            }
            last_due = Some(due);

            let runner = Arc::clone(&self);
            tokio::spawn(async move {
                match runner.trigger(due.date()).await {
                    Some(Ok(_)) | None => {}
                    Some(Err(e)) => {
                        error!(date = %due.date(), error = %e, "Scheduled reconciliation failed")
                    }
                }
            });
        }
    }
}

/// First cutoff strictly after `now` that has not already fired.
fn next_due(
    now: NaiveDateTime,
    cutoff: NaiveTime,
    last_due: Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    let mut due = now.date().and_time(cutoff);
    while due <= now || last_due.is_some_and(|last| due <= last) {
        due = due.date().succ_opt()?.and_time(cutoff);
    }
    Some(due)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn cutoff() -> NaiveTime {
        NaiveTime::from_hms_opt(23, 59, 0).unwrap()
    }

    #[test]
    fn next_due_is_todays_cutoff_until_it_passes() {
        assert_eq!(next_due(at(2, 7, 5, 0), cutoff(), None), Some(at(2, 23, 59, 0)));
        assert_eq!(next_due(at(2, 23, 59, 0), cutoff(), None), Some(at(3, 23, 59, 0)));
    }

    #[test]
    fn a_clock_stepping_back_does_not_refire_the_same_cutoff() {
        let fired = at(2, 23, 59, 0);
        assert_eq!(
            next_due(at(2, 23, 58, 30), cutoff(), Some(fired)),
            Some(at(3, 23, 59, 0))
        );
    }
}
