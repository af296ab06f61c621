//! The attendance engine: tap handling, approvals and the daily sweep, all writing
//! through the same versioned session records.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::store::{HolidayCalendar, Store, StoreResult};

pub mod approval;
pub mod geo;
pub mod leave_permit;
pub mod manual_correction;
pub mod reconciliation;
pub mod tap;

/// Tunables the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct Policy {
    pub default_radius_meters: u32,
    pub grace_minutes: u32,
    pub reconciliation_cutoff: NaiveTime,
    pub store_timeout: Duration,
    pub min_justification_chars: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            default_radius_meters: 100,
            grace_minutes: 120,
            reconciliation_cutoff: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            store_timeout: Duration::from_secs(5),
            min_justification_chars: 20,
        }
    }
}

/// Entry point for every core operation. Cheap to clone; share it behind `Arc` or
/// actix `Data`.
#[derive(Clone)]
pub struct AttendanceEngine {
    store: Arc<dyn Store>,
    holidays: Arc<dyn HolidayCalendar>,
    clock: Arc<dyn Clock>,
    policy: Policy,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn Store>,
        holidays: Arc<dyn HolidayCalendar>,
        clock: Arc<dyn Clock>,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            holidays,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Runs a storage call under the configured timeout.
    pub(crate) async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> CoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.policy.store_timeout, fut).await {
            Ok(result) => result.map_err(CoreError::from),
            Err(_) => {
                tracing::warn!(operation, "Storage call timed out");
                Err(CoreError::Timeout { operation })
            }
        }
    }

    pub(crate) async fn is_holiday(&self, date: chrono::NaiveDate) -> CoreResult<bool> {
        self.bounded("holiday_lookup", self.holidays.is_holiday(date))
            .await
    }
}
