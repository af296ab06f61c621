//! Great-circle distance and time-window checks used by tap validation.
//!
//! Everything here is pure. Coordinates are range-checked before they get here.

use chrono::{NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = json!(-6.2))]
    pub lat: f64,
    #[schema(example = 106.816666)]
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RadiusCheck {
    pub ok: bool,
    pub distance_meters: u32,
}

/// Haversine distance rounded to the nearest whole meter.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> u32 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    (EARTH_RADIUS_METERS * c).round() as u32
}

pub fn within_radius(current: GeoPoint, target: GeoPoint, radius_meters: u32) -> RadiusCheck {
    let distance = distance_meters(current, target);
    RadiusCheck {
        ok: distance <= radius_meters,
        distance_meters: distance,
    }
}

/// Symmetric window: early and late taps are judged the same way.
pub fn within_grace_period(now: NaiveTime, target: NaiveTime, grace_minutes: u32) -> bool {
    (now - target).abs() <= TimeDelta::minutes(grace_minutes.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = distance_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        assert!((111_190..=111_200).contains(&d), "got {d}");
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let site = GeoPoint::new(0.0, 0.0);
        let here = GeoPoint::new(0.0, 0.0005);
        let check = within_radius(here, site, 100);
        assert!(check.ok);
        assert_eq!(check.distance_meters, 56);

        assert!(within_radius(here, site, 56).ok);
        assert!(!within_radius(here, site, 55).ok);
    }

    #[test]
    fn grace_period_applies_both_sides() {
        assert!(within_grace_period(t(6, 0), t(8, 0), 120));
        assert!(within_grace_period(t(10, 0), t(8, 0), 120));
        assert!(!within_grace_period(t(5, 59), t(8, 0), 120));
        assert!(!within_grace_period(t(10, 1), t(8, 0), 120));
        assert!(within_grace_period(t(8, 0), t(8, 0), 0));
    }

    #[test]
    fn grace_period_counts_seconds() {
        let late = |s| NaiveTime::from_hms_opt(10, 0, s).unwrap();
        assert!(!within_grace_period(late(1), t(8, 0), 120));
        assert!(!within_grace_period(late(59), t(8, 0), 120));
        let early = NaiveTime::from_hms_opt(5, 59, 59).unwrap();
        assert!(!within_grace_period(early, t(8, 0), 120));
        assert!(!within_grace_period(t(8, 0) + TimeDelta::seconds(1), t(8, 0), 0));
    }

    #[test]
    fn validates_coordinate_ranges() {
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.1).is_valid());
    }

    fn point() -> impl Strategy<Value = GeoPoint> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| GeoPoint::new(lat, lng))
    }

    proptest! {
        /// Property: a point is zero meters from itself.
        #[test]
        fn prop_self_distance_is_zero(a in point()) {
            prop_assert_eq!(distance_meters(a, a), 0);
        }

        /// Property: distance does not depend on argument order.
        #[test]
        fn prop_distance_is_symmetric(a in point(), b in point()) {
            prop_assert_eq!(distance_meters(a, b), distance_meters(b, a));
        }

        /// Property: the radius verdict agrees with the reported distance.
        #[test]
        fn prop_radius_verdict_matches_distance(a in point(), b in point(), radius in 0u32..30_000_000) {
            let check = within_radius(a, b, radius);
            prop_assert_eq!(check.ok, check.distance_meters <= radius);
        }
    }
}
