// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Keeps an active emergency's position current

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::db::Database;
use crate::models::Coordinates;

/// Writes fresh coordinates to the patient's emergency until it is resolved
pub struct LocationRefresher {
    event_id: Uuid,
    task: Option<JoinHandle<()>>,
}

impl LocationRefresher {
    /// Writes on every coordinate change and again every `period`
    pub fn spawn(
        db: Database,
        session: Session,
        event_id: Uuid,
        coordinates: watch::Receiver<Option<Coordinates>>,
        period: Duration,
    ) -> Self {
        let task = tokio::spawn(refresh_loop(db, session, event_id, coordinates, period));
        Self {
            event_id,
            task: Some(task),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Wait for the refresher to stop on its own
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LocationRefresher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn refresh_loop(
    db: Database,
    session: Session,
    event_id: Uuid,
    mut coordinates: watch::Receiver<Option<Coordinates>>,
    period: Duration,
) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = coordinates.changed() => {
                if changed.is_err() {
                    debug!(event_id = %event_id, "Location provider gone");
                    break;
                }
            }
        }

        let Some(current) = *coordinates.borrow_and_update() else {
            continue;
        };

        match db.update_fall_location(&session, event_id, current) {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(event_id = %event_id, "Emergency no longer active, location refresh stopped");
                break;
            }
            Err(e) => warn!(event_id = %event_id, "Location refresh failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{sign_in, store};
    use crate::models::{FallTransition, NewFallEvent, Role};

    fn at(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_follows_position_until_resolved() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);

        let event = db
            .insert_fall_event(&patient, NewFallEvent::at(at(28.6, 77.2)))
            .unwrap();
        db.transition_fall_event(&patient, event.id, event.version, FallTransition::Escalate)
            .unwrap()
            .unwrap();

        let (tx, rx) = watch::channel(Some(at(28.7, 77.3)));
        let refresher =
            LocationRefresher::spawn(db.clone(), patient.clone(), event.id, rx, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let stored = db.fall_event(&patient, event.id).unwrap();
        assert_eq!(stored.coordinates(), Some(at(28.7, 77.3)));

        tx.send_replace(Some(at(28.8, 77.4)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stored = db.fall_event(&patient, event.id).unwrap();
        assert_eq!(stored.coordinates(), Some(at(28.8, 77.4)));

        db.resolve_fall_event(&hospital, event.id).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!refresher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_event_is_never_moved() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let event = db
            .insert_fall_event(&patient, NewFallEvent::at(at(28.6, 77.2)))
            .unwrap();

        let (_tx, rx) = watch::channel(Some(at(10.0, 10.0)));
        let refresher =
            LocationRefresher::spawn(db.clone(), patient.clone(), event.id, rx, Duration::from_secs(5));
        refresher.finished().await;

        let stored = db.fall_event(&patient, event.id).unwrap();
        assert_eq!(stored.coordinates(), Some(at(28.6, 77.2)));
    }
}
