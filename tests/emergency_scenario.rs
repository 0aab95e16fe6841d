// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! End-to-end fall handling across the feed, lifecycle, store and views

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use safefall::auth::Session;
use safefall::config::{LifecycleConfig, LocationConfig, SensorConfig};
use safefall::core::{EventBus, LifecycleKind};
use safefall::dashboard;
use safefall::db::{Database, ResolveOutcome};
use safefall::lifecycle::{next_fall, FallLifecycle, FallOutcome, FallState};
use safefall::location::{best_available, GeolocationProvider, SimulatedLocationSource};
use safefall::models::{Coordinates, FallStatus, FallTransition, NotificationType, Role};
use safefall::realtime::{ChangeFeed, ChangeFilter, ChangeSignal, Table};
use safefall::sensors::{MotionReading, MotionSimulator, SensorFeed};

struct Harness {
    changes: Arc<ChangeFeed>,
    db: Database,
    bus: Arc<EventBus>,
    lifecycle: FallLifecycle,
    patient: Session,
    hospital: Session,
}

fn harness() -> Harness {
    let changes = Arc::new(ChangeFeed::default());
    let db = Database::open_in_memory(changes.clone()).unwrap();
    let bus = Arc::new(EventBus::default());
    let lifecycle = FallLifecycle::new(db.clone(), bus.clone(), &LifecycleConfig::default());

    let patient = db
        .insert_user("patient@example.com", "Asha", "unused-hash", Role::Patient)
        .unwrap();
    let hospital = db
        .insert_user("er@example.com", "City Hospital", "unused-hash", Role::Hospital)
        .unwrap();

    Harness {
        changes,
        db,
        bus,
        lifecycle,
        patient: Session::for_user(&patient),
        hospital: Session::for_user(&hospital),
    }
}

fn delhi() -> Coordinates {
    Coordinates::new(28.6139, 77.2090).unwrap()
}

fn impact() -> MotionReading {
    let mut reading = MotionReading::resting("phone");
    reading.simulated_fall = true;
    reading
}

#[tokio::test(start_paused = true)]
async fn unanswered_fall_reaches_hospital_and_is_resolved() {
    let h = harness();
    let mut hospital_changes = h
        .changes
        .subscribe(Table::FallEvents, ChangeFilter::ActiveEmergencies);
    let mut emergencies = dashboard::hospital_emergencies_view(&h.db, &h.hospital).unwrap();
    emergencies.wait_until(|rows| rows.is_empty()).await.unwrap();

    let sensors = SensorConfig::default();
    let sensor = MotionSimulator::seeded("phone", &sensors, 7);
    let feed = SensorFeed::start(Box::new(sensor), &sensors, h.bus.clone())
        .await
        .unwrap();
    let mut readings = h.bus.subscribe_readings();
    let mut lifecycle_events = h.bus.subscribe_lifecycle();

    assert!(feed.simulate_fall());
    let reading = next_fall(&mut readings).await.unwrap();
    assert!(reading.g_force() > 1.0);

    // Trigger: one pending row
    let handle = h.lifecycle.trigger(&h.patient, &reading, delhi()).await.unwrap();
    let event_id = handle.event_id();
    let pending = h.db.fall_event(&h.patient, event_id).unwrap();
    assert_eq!(pending.status(), FallStatus::Pending);
    assert_eq!(h.db.fall_events_for_user(&h.patient, h.patient.user_id).unwrap().len(), 1);
    assert!(h.db.active_emergencies(&h.hospital).unwrap().is_empty());

    // Nobody answers; the countdown escalates
    let outcome = handle.outcome().await;
    let escalated = match outcome {
        FallOutcome::Emergency { event, .. } => event,
        other => panic!("expected an emergency, got {:?}", other),
    };
    assert!(escalated.is_active_emergency());

    match hospital_changes.changed().await.unwrap() {
        ChangeSignal::Change(change) => {
            assert_eq!(change.record_id, event_id);
            assert!(change.is_emergency);
        }
        ChangeSignal::Resync => panic!("unexpected resync"),
    }

    let rows = emergencies.wait_until(|rows| rows.len() == 1).await.unwrap();
    assert_eq!(rows[0].event_id, event_id);
    assert_eq!(rows[0].patient_name, "Asha");

    // Hospital resolves
    let resolved = h.lifecycle.resolve_emergency(&h.hospital, event_id).unwrap();
    assert!(matches!(resolved, ResolveOutcome::Resolved(_)));
    emergencies.wait_until(|rows| rows.is_empty()).await.unwrap();

    let stored = h.db.fall_event(&h.patient, event_id).unwrap();
    assert_eq!(stored.status(), FallStatus::Resolved);
    assert_eq!(stored.resolved_by, Some(h.hospital.user_id));
    assert!(stored.check_invariants().is_ok());

    let inbox = h.db.notifications_for_user(&h.patient).unwrap();
    let resolved_note = inbox
        .iter()
        .find(|n| n.kind == NotificationType::Resolved)
        .expect("resolved notification");
    assert_eq!(resolved_note.title, "Emergency Resolved");
    assert_eq!(resolved_note.related_event_id, Some(event_id));
    assert!(inbox.iter().any(|n| n.kind == NotificationType::Emergency));

    let mut saw_timeout = false;
    let mut saw_resolved = false;
    while let Ok(event) = lifecycle_events.try_recv() {
        match event.kind {
            LifecycleKind::Escalated { .. } => saw_timeout = true,
            LifecycleKind::Resolved { by } => saw_resolved = by == h.hospital.user_id,
            _ => {}
        }
    }
    assert!(saw_timeout && saw_resolved);

    emergencies.close().await;
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_racing_expiry_stores_one_terminal_state() {
    let countdown = LifecycleConfig::default().countdown() + Duration::from_millis(500);

    for offset_ms in [-100i64, 0, 100] {
        let h = harness();
        let handle = h.lifecycle.trigger(&h.patient, &impact(), delhi()).await.unwrap();
        let event_id = handle.event_id();
        let original_version = handle.event().version;

        let wait = if offset_ms < 0 {
            countdown - Duration::from_millis(offset_ms.unsigned_abs())
        } else {
            countdown + Duration::from_millis(offset_ms as u64)
        };
        tokio::time::sleep(wait).await;
        let _ = handle.cancel();

        let outcome = handle.outcome().await;
        let stored = h.db.fall_event(&h.patient, event_id).unwrap();
        assert!(stored.check_invariants().is_ok());
        assert!(stored.resolved != stored.is_emergency, "offset {}ms", offset_ms);

        let expected: FallState = stored.status().into();
        assert_eq!(outcome.state(), Some(expected), "offset {}ms", offset_ms);
        if offset_ms < 0 {
            assert_eq!(expected, FallState::FalseAlarm);
        }
        if offset_ms > 0 {
            assert_eq!(expected, FallState::Emergency);
        }

        // A second writer holding the pre-decision version loses
        let late = h
            .db
            .transition_fall_event(&h.patient, event_id, original_version, FallTransition::Escalate)
            .unwrap();
        assert!(late.is_none());
        assert_eq!(h.db.fall_event(&h.patient, event_id).unwrap(), stored);
    }
}

#[tokio::test(start_paused = true)]
async fn denied_location_still_records_the_fall() {
    let h = harness();
    let source = Arc::new(SimulatedLocationSource::denied(
        Coordinates::new(19.0760, 72.8777).unwrap(),
    ));
    let geo = GeolocationProvider::new(source);

    assert!(geo.request_permission().await.is_err());
    assert!(geo.permission_denied());
    assert_eq!(geo.latitude(), None);
    assert_eq!(geo.longitude(), None);

    let config = LocationConfig::default();
    let fix = best_available(&geo, &config, &mut StdRng::seed_from_u64(3));
    assert!(!fix.is_live());
    let coords = fix.coordinates();
    assert!((coords.latitude - 28.6139).abs() <= 0.05);
    assert!((coords.longitude - 77.2090).abs() <= 0.05);

    let handle = h.lifecycle.trigger(&h.patient, &impact(), coords).await.unwrap();
    let stored = h.db.fall_event(&h.patient, handle.event_id()).unwrap();
    assert_eq!(stored.coordinates(), Some(coords));
    assert_eq!(stored.status(), FallStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn im_ok_keeps_the_fall_private() {
    let h = harness();
    let mut history = dashboard::fall_history_view(&h.db, &h.patient);
    history.wait_until(|rows| rows.is_empty()).await.unwrap();

    let handle = h.lifecycle.trigger(&h.patient, &impact(), delhi()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.cancel().unwrap();
    assert!(matches!(handle.outcome().await, FallOutcome::FalseAlarm { .. }));

    let rows = history
        .wait_until(|rows| rows.len() == 1 && rows[0].resolved)
        .await
        .unwrap();
    let stats = dashboard::FallStats::from_events(&rows);
    assert_eq!(stats.false_alarms, 1);
    assert_eq!(stats.emergencies, 0);

    assert!(h.db.active_emergencies(&h.hospital).unwrap().is_empty());
    assert!(h.db.fall_event(&h.hospital, rows[0].id).is_err());
    assert!(h
        .lifecycle
        .resolve_emergency(&h.hospital, rows[0].id)
        .is_err());
}
