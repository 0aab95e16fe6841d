// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Live views backing each screen

use tracing::debug;

use super::hospital::{active_emergencies, ActiveEmergency};
use super::map::{map_markers, MapMarker};
use crate::auth::Session;
use crate::db::Database;
use crate::error::Result;
use crate::models::{FallEvent, Notification, Role};
use crate::realtime::{ChangeFilter, LiveView, Table};

/// The caller's notifications, newest first
pub fn notifications_view(db: &Database, session: &Session) -> LiveView<Vec<Notification>> {
    let subscription = db
        .changes()
        .subscribe(Table::Notifications, ChangeFilter::OwnedBy(session.user_id));

    let (db, session) = (db.clone(), session.clone());
    LiveView::spawn("notifications", vec![subscription], move || {
        db.notifications_for_user(&session)
    })
}

/// The caller's own fall events, newest first
pub fn fall_history_view(db: &Database, session: &Session) -> LiveView<Vec<FallEvent>> {
    let subscription = db
        .changes()
        .subscribe(Table::FallEvents, ChangeFilter::OwnedBy(session.user_id));

    let (db, session) = (db.clone(), session.clone());
    LiveView::spawn("fall_history", vec![subscription], move || {
        db.fall_events_for_user(&session, session.user_id)
    })
}

/// Enriched active emergencies for the response center
///
/// Health profiles are watched too, so edits show up while an emergency is
/// open.
pub fn hospital_emergencies_view(
    db: &Database,
    session: &Session,
) -> Result<LiveView<Vec<ActiveEmergency>>> {
    session.require_role(Role::Hospital)?;

    let changes = db.changes();
    let subscriptions = vec![
        changes.subscribe(Table::FallEvents, ChangeFilter::ActiveEmergencies),
        changes.subscribe(Table::HealthProfiles, ChangeFilter::All),
    ];
    debug!(hospital = %session.user_id, "Opening emergency response view");

    let (db, session) = (db.clone(), session.clone());
    Ok(LiveView::spawn("hospital_emergencies", subscriptions, move || {
        active_emergencies(&db, &session)
    }))
}

/// Emergency markers for the map
pub fn live_map_view(db: &Database, session: &Session) -> LiveView<Vec<MapMarker>> {
    let filter = match session.role {
        Role::Hospital => ChangeFilter::ActiveEmergencies,
        Role::Patient => ChangeFilter::OwnedBy(session.user_id),
    };
    let subscription = db.changes().subscribe(Table::FallEvents, filter);

    let (db, session) = (db.clone(), session.clone());
    LiveView::spawn("live_map", vec![subscription], move || {
        map_markers(&db, &session)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{sign_in, store};
    use crate::error::SafeFallError;
    use crate::models::{Coordinates, FallTransition, NewFallEvent, NewNotification};

    fn home() -> Coordinates {
        Coordinates::new(28.6, 77.2).unwrap()
    }

    #[tokio::test]
    async fn test_hospital_view_follows_escalation_and_resolve() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);

        let mut view = hospital_emergencies_view(&db, &hospital).unwrap();
        view.wait_until(|rows| rows.is_empty()).await.unwrap();

        let event = db.insert_fall_event(&patient, NewFallEvent::at(home())).unwrap();
        db.transition_fall_event(&patient, event.id, event.version, FallTransition::Escalate)
            .unwrap();
        let rows = view.wait_until(|rows| rows.len() == 1).await.unwrap();
        assert_eq!(rows[0].event_id, event.id);

        db.resolve_fall_event(&hospital, event.id).unwrap();
        view.wait_until(|rows| rows.is_empty()).await.unwrap();
    }

    #[tokio::test]
    async fn test_notifications_view_sees_resolve_message() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);

        let mut view = notifications_view(&db, &patient);
        view.wait_until(|rows| rows.is_empty()).await.unwrap();

        let event = db.insert_fall_event(&patient, NewFallEvent::at(home())).unwrap();
        db.insert_notification(&patient, NewNotification::emergency_raised(patient.user_id, event.id))
            .unwrap();
        let rows = view.wait_until(|rows| rows.len() == 1).await.unwrap();
        assert_eq!(rows[0].title, "Emergency Alert Sent");
    }

    #[tokio::test]
    async fn test_history_view_ignores_other_patients() {
        let db = store();
        let a = sign_in(&db, "a@example.com", Role::Patient);
        let b = sign_in(&db, "b@example.com", Role::Patient);

        let mut view = fall_history_view(&db, &a);
        view.wait_until(|rows| rows.is_empty()).await.unwrap();
        let before = view.generation();

        db.insert_fall_event(&b, NewFallEvent::at(home())).unwrap();
        db.insert_fall_event(&a, NewFallEvent::at(home())).unwrap();
        let rows = view.wait_until(|rows| rows.len() == 1).await.unwrap();
        assert_eq!(rows[0].user_id, a.user_id);
        assert_eq!(view.generation(), before + 1);
    }

    #[tokio::test]
    async fn test_patient_cannot_open_hospital_view() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        assert!(matches!(
            hospital_emergencies_view(&db, &patient),
            Err(SafeFallError::Forbidden(_))
        ));
        assert_eq!(db.changes().active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_map_view_closes_cleanly() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let view = live_map_view(&db, &patient);
        assert_eq!(db.changes().active_subscriptions(), 1);
        view.close().await;
        assert_eq!(db.changes().active_subscriptions(), 0);
    }
}
