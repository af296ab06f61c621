//! Civil time source. The whole system runs on one fixed UTC offset.

use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

pub trait Clock: Send + Sync {
    /// Current wall-clock time in the civil timezone.
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now: DateTime<FixedOffset> = Utc::now().with_timezone(&self.offset);
        now.naive_local()
    }
}

/// Settable clock for tests and replays.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
