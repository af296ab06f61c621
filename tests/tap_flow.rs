mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use placement_attendance::error::CoreError;
use placement_attendance::model::attendance::SessionStatus;
use placement_attendance::model::role::Role;
use placement_attendance::service::geo::GeoPoint;
use placement_attendance::service::tap::{TapIn, TapOut};
use placement_attendance::service::{AttendanceEngine, Policy};
use placement_attendance::store::{MemoryStore, StaticHolidays};

fn tap_in_at(lat: f64, lng: f64) -> TapIn {
    TapIn {
        location: GeoPoint::new(lat, lng),
        photo_ref: Some("uploads/selfie/10.jpg".into()),
        event_id: None,
    }
}

#[tokio::test]
async fn full_day_inside_the_geofence() {
    let h = Harness::new();
    let me = student(STUDENT);

    // ~56 m east of the site, 55 minutes before the start.
    let session = h.engine.tap_in(1, &me, tap_in_at(0.0, 0.0005)).await.unwrap();
    assert_eq!(session.status, SessionStatus::InProgress);
    assert_eq!(session.tap_in_at, Some(at(monday(), 7, 5)));

    h.clock.set(at(monday(), 16, 0));
    let session = h.engine.tap_out(1, &me, TapOut::default()).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.duration_hours(), Some(8.92));

    let stored = h.engine.get_session(1, monday(), &me).await.unwrap();
    assert_eq!(stored, session);
}

#[tokio::test]
async fn tap_in_outside_radius_reports_distance() {
    let h = Harness::new();
    let err = h
        .engine
        .tap_in(1, &student(STUDENT), tap_in_at(0.0, 0.002))
        .await
        .unwrap_err();

    match err {
        CoreError::GeofenceViolation {
            distance_meters,
            radius_meters,
        } => {
            assert_eq!(radius_meters, 100);
            assert!((220..=225).contains(&distance_meters), "{distance_meters}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.store.session_count().unwrap(), 0);
}

#[tokio::test]
async fn tap_in_outside_the_grace_window() {
    let h = Harness::new();
    let me = student(STUDENT);

    h.clock.set(at(monday(), 10, 30));
    let err = h.engine.tap_in(1, &me, tap_in_at(0.0, 0.0)).await.unwrap_err();
    assert!(matches!(err, CoreError::OutsideWindow { grace_minutes: 120, .. }));

    h.clock.set(at(monday(), 5, 30));
    let err = h.engine.tap_in(1, &me, tap_in_at(0.0, 0.0)).await.unwrap_err();
    assert!(matches!(err, CoreError::OutsideWindow { .. }));

    // Exactly on the edge is still allowed.
    h.clock.set(at(monday(), 10, 0));
    assert!(h.engine.tap_in(1, &me, tap_in_at(0.0, 0.0)).await.is_ok());
}

#[tokio::test]
async fn tap_in_one_second_past_the_grace_window() {
    let h = Harness::new();
    let me = student(STUDENT);

    for second in [1, 59] {
        h.clock.set(monday().and_hms_opt(10, 0, second).unwrap());
        let err = h.engine.tap_in(1, &me, tap_in_at(0.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, CoreError::OutsideWindow { .. }), "{second}s late");
    }
    assert_eq!(h.store.session_count().unwrap(), 0);
}

#[tokio::test]
async fn sequencing_errors() {
    let h = Harness::new();
    let me = student(STUDENT);

    let err = h.engine.tap_out(1, &me, TapOut::default()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotTappedIn { .. }));

    h.engine.tap_in(1, &me, tap_in_at(0.0, 0.0)).await.unwrap();
    let err = h.engine.tap_in(1, &me, tap_in_at(0.0, 0.0)).await.unwrap_err();
    assert!(matches!(err, CoreError::AlreadyTapped { .. }));

    h.clock.set(at(monday(), 16, 0));
    h.engine.tap_out(1, &me, TapOut::default()).await.unwrap();
    let err = h.engine.tap_out(1, &me, TapOut::default()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotTappedIn { .. }));
}

#[tokio::test]
async fn resubmitted_events_return_the_recorded_session() {
    let h = Harness::new();
    let me = student(STUDENT);
    let tap = TapIn {
        event_id: Some("evt-in-1".into()),
        ..tap_in_at(0.0, 0.0)
    };

    let first = h.engine.tap_in(1, &me, tap.clone()).await.unwrap();
    let again = h.engine.tap_in(1, &me, tap).await.unwrap();
    assert_eq!(first, again);

    h.clock.set(at(monday(), 16, 0));
    let out = TapOut {
        location: None,
        event_id: Some("evt-out-1".into()),
    };
    let closed = h.engine.tap_out(1, &me, out.clone()).await.unwrap();
    h.clock.set(at(monday(), 16, 5));
    let replayed = h.engine.tap_out(1, &me, out).await.unwrap();
    assert_eq!(closed, replayed);
    assert_eq!(replayed.tap_out_at, Some(at(monday(), 16, 0)));
}

#[tokio::test]
async fn only_the_placed_student_taps() {
    let h = Harness::new();
    let err = h
        .engine
        .tap_in(1, &student(99), tap_in_at(0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden { .. }));

    let err = h
        .engine
        .tap_in(404, &student(STUDENT), tap_in_at(0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn bad_coordinates_are_validation_failures() {
    let h = Harness::new();
    let err = h
        .engine
        .tap_in(1, &student(STUDENT), tap_in_at(91.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailure { .. }));
}

#[tokio::test]
async fn session_visibility() {
    let h = Harness::new();
    h.engine
        .tap_in(1, &student(STUDENT), tap_in_at(0.0, 0.0))
        .await
        .unwrap();

    assert!(
        h.engine
            .get_session(1, monday(), &staff(7, Role::Supervisor))
            .await
            .is_ok()
    );
    let err = h
        .engine
        .get_session(1, monday(), &student(11))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tap_ins_yield_one_session() {
    let h = Harness::new();
    let me = student(STUDENT);

    let attempts = (0..8).map(|i| {
        let engine = Arc::clone(&h.engine);
        let me = me.clone();
        tokio::spawn(async move {
            engine
                .tap_in(
                    1,
                    &me,
                    TapIn {
                        event_id: Some(format!("evt-{i}")),
                        ..tap_in_at(0.0, 0.0)
                    },
                )
                .await
        })
    });

    let mut ok = 0;
    for handle in attempts.collect::<Vec<_>>() {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(CoreError::AlreadyTapped { .. } | CoreError::ConcurrentModification { .. }) => {}
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(h.store.session_count().unwrap(), 1);
}

#[tokio::test]
async fn slow_storage_surfaces_as_timeout() {
    let inner = MemoryStore::new();
    inner.insert_assignment(assignment(1, STUDENT)).unwrap();
    let store = Arc::new(SlowStore {
        inner,
        delay: Duration::from_millis(500),
        slow_sessions: true,
        slow_listing: false,
        slow_pending: false,
        listings: Default::default(),
    });
    let engine = AttendanceEngine::new(
        store,
        Arc::new(StaticHolidays::default()),
        Arc::new(placement_attendance::clock::ManualClock::new(at(monday(), 8, 0))),
        Policy {
            store_timeout: Duration::from_millis(20),
            ..Policy::default()
        },
    );

    let err = engine
        .tap_in(1, &student(STUDENT), tap_in_at(0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Timeout { .. }));
    assert!(err.is_retryable());
}
