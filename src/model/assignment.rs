use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::service::geo::GeoPoint;

/// A student's placement at a site for a date range. Read-only for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: u64,
    pub student_id: u64,
    pub site_name: String,
    pub site: GeoPoint,
    /// Falls back to the configured default radius when unset.
    pub radius_meters: Option<u32>,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_work_days")]
    pub work_days: Vec<Weekday>,
}

pub fn default_work_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

impl Assignment {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn works_on(&self, date: NaiveDate) -> bool {
        self.work_days.contains(&date.weekday())
    }

    pub fn radius_or(&self, default_radius: u32) -> u32 {
        self.radius_meters.unwrap_or(default_radius)
    }
}
