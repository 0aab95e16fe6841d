// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Fall events and their sensor snapshots

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    now, optional_timestamp_column, optional_uuid_column, policy, timestamp, timestamp_column,
    uuid_column, Database,
};
use crate::auth::Session;
use crate::error::{Result, SafeFallError};
use crate::models::{
    Coordinates, FallEvent, FallTransition, NewFallEvent, Role, SensorSnapshot,
};
use crate::realtime::{ChangeEvent, ChangeKind, Table};
use crate::sensors::{Axis3, MotionReading};

const FALL_COLUMNS: &str = "id, user_id, timestamp, is_emergency, resolved, resolved_at, \
                            resolved_by, latitude, longitude, notes, version";

/// Result of a hospital resolving an emergency
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// This call closed the emergency
    Resolved(FallEvent),
    /// Someone already had; the row was left untouched
    AlreadyResolved(FallEvent),
}

impl ResolveOutcome {
    pub fn event(&self) -> &FallEvent {
        match self {
            ResolveOutcome::Resolved(e) | ResolveOutcome::AlreadyResolved(e) => e,
        }
    }
}

fn fall_from_row(row: &Row<'_>) -> rusqlite::Result<FallEvent> {
    Ok(FallEvent {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        timestamp: timestamp_column(row, 2)?,
        is_emergency: row.get(3)?,
        resolved: row.get(4)?,
        resolved_at: optional_timestamp_column(row, 5)?,
        resolved_by: optional_uuid_column(row, 6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        notes: row.get(9)?,
        version: row.get(10)?,
    })
}

fn select_fall(conn: &Connection, id: Uuid) -> Result<Option<FallEvent>> {
    let sql = format!("SELECT {} FROM fall_events WHERE id = ?1", FALL_COLUMNS);
    let event = conn
        .query_row(&sql, params![id.to_string()], fall_from_row)
        .optional()?;
    Ok(event)
}

fn fall_change(kind: ChangeKind, event: &FallEvent) -> ChangeEvent {
    ChangeEvent::new(Table::FallEvents, kind, event.id, event.user_id).emergency(event.is_emergency)
}

impl Database {
    /// Create a pending fall event owned by the caller
    pub fn insert_fall_event(&self, session: &Session, new: NewFallEvent) -> Result<FallEvent> {
        session.require_role(Role::Patient)?;

        let event = FallEvent {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            timestamp: now(),
            is_emergency: false,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            latitude: new.coordinates.map(|c| c.latitude),
            longitude: new.coordinates.map(|c| c.longitude),
            notes: new.notes,
            version: 0,
        };

        {
            let conn = self.conn.lock();
            let sql = format!(
                "INSERT INTO fall_events ({}) VALUES (?1, ?2, ?3, 0, 0, NULL, NULL, ?4, ?5, ?6, 0)",
                FALL_COLUMNS
            );
            conn.execute(
                &sql,
                params![
                    event.id.to_string(),
                    event.user_id.to_string(),
                    timestamp(&event.timestamp),
                    event.latitude,
                    event.longitude,
                    event.notes
                ],
            )?;
        }

        info!(event_id = %event.id, user_id = %event.user_id, "Fall event created");
        self.publish(fall_change(ChangeKind::Insert, &event));
        Ok(event)
    }

    /// Rows the caller may not read are reported as missing
    pub fn fall_event(&self, session: &Session, id: Uuid) -> Result<FallEvent> {
        let conn = self.conn.lock();
        select_fall(&conn, id)?
            .filter(|event| policy::can_read_fall_event(session, event))
            .ok_or_else(|| SafeFallError::not_found("fall event", id))
    }

    /// Newest first
    pub fn fall_events_for_user(&self, session: &Session, user_id: Uuid) -> Result<Vec<FallEvent>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM fall_events WHERE user_id = ?1 ORDER BY timestamp DESC",
            FALL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id.to_string()], fall_from_row)?;

        let mut events = Vec::new();
        for row in rows {
            let event = row?;
            if policy::can_read_fall_event(session, &event) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Unresolved emergencies visible to the caller, newest first
    pub fn active_emergencies(&self, session: &Session) -> Result<Vec<FallEvent>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM fall_events WHERE is_emergency = 1 AND resolved = 0 ORDER BY timestamp DESC",
            FALL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], fall_from_row)?;

        let mut events = Vec::new();
        for row in rows {
            let event = row?;
            if policy::can_read_fall_event(session, &event) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// The caller's own most recent unresolved emergency
    pub fn active_emergency_for_user(&self, session: &Session) -> Result<Option<FallEvent>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM fall_events WHERE user_id = ?1 AND is_emergency = 1 AND resolved = 0 \
             ORDER BY timestamp DESC LIMIT 1",
            FALL_COLUMNS
        );
        let event = conn
            .query_row(&sql, params![session.user_id.to_string()], fall_from_row)
            .optional()?;
        Ok(event)
    }

    /// Move a pending event to a terminal decision
    ///
    /// Applies only if the row is still pending and still at
    /// `expected_version`. `Ok(None)` means another writer got there first.
    pub fn transition_fall_event(
        &self,
        session: &Session,
        id: Uuid,
        expected_version: i64,
        transition: FallTransition,
    ) -> Result<Option<FallEvent>> {
        session.require_role(Role::Patient)?;

        let event = {
            let conn = self.conn.lock();
            let changed = match transition {
                FallTransition::Escalate => conn.execute(
                    "UPDATE fall_events SET is_emergency = 1, version = version + 1 \
                     WHERE id = ?1 AND user_id = ?2 AND version = ?3 \
                       AND is_emergency = 0 AND resolved = 0",
                    params![id.to_string(), session.user_id.to_string(), expected_version],
                )?,
                FallTransition::FalseAlarm => conn.execute(
                    "UPDATE fall_events SET resolved = 1, resolved_at = ?4, resolved_by = ?2, \
                     version = version + 1 \
                     WHERE id = ?1 AND user_id = ?2 AND version = ?3 \
                       AND is_emergency = 0 AND resolved = 0",
                    params![
                        id.to_string(),
                        session.user_id.to_string(),
                        expected_version,
                        timestamp(&now())
                    ],
                )?,
            };

            if changed == 0 {
                debug!(event_id = %id, "Conditional {:?} lost to another writer", transition);
                return Ok(None);
            }
            select_fall(&conn, id)?.ok_or_else(|| SafeFallError::not_found("fall event", id))?
        };

        info!(event_id = %id, "Fall event {:?} applied", transition);
        self.publish(fall_change(ChangeKind::Update, &event));
        Ok(Some(event))
    }

    /// Close an emergency on behalf of a hospital. Repeat calls are no-ops.
    ///
    /// A closed emergency is only reported back to hospitals that may still
    /// read it; everyone else gets `NotFound`.
    pub fn resolve_fall_event(&self, session: &Session, id: Uuid) -> Result<ResolveOutcome> {
        session.require_role(Role::Hospital)?;
        let missing = || SafeFallError::not_found("fall event", id);

        let event = {
            let conn = self.conn.lock();
            let current = select_fall(&conn, id)?.ok_or_else(missing)?;

            if !policy::can_resolve(session, &current) {
                if current.is_emergency && policy::can_read_fall_event(session, &current) {
                    debug!(event_id = %id, "Emergency already resolved");
                    return Ok(ResolveOutcome::AlreadyResolved(current));
                }
                return Err(missing());
            }

            let changed = conn.execute(
                "UPDATE fall_events SET resolved = 1, resolved_at = ?2, resolved_by = ?3, \
                 version = version + 1 \
                 WHERE id = ?1 AND version = ?4",
                params![
                    id.to_string(),
                    timestamp(&now()),
                    session.user_id.to_string(),
                    current.version
                ],
            )?;
            if changed == 0 {
                return Err(missing());
            }
            select_fall(&conn, id)?.ok_or_else(missing)?
        };

        info!(event_id = %id, resolved_by = %session.user_id, "Emergency resolved");
        self.publish(fall_change(ChangeKind::Update, &event));
        Ok(ResolveOutcome::Resolved(event))
    }

    /// Refresh the position of the caller's own active emergency
    ///
    /// `Ok(None)` once the event is no longer an active emergency.
    pub fn update_fall_location(
        &self,
        session: &Session,
        id: Uuid,
        coordinates: Coordinates,
    ) -> Result<Option<FallEvent>> {
        session.require_role(Role::Patient)?;
        let missing = || SafeFallError::not_found("fall event", id);

        let event = {
            let conn = self.conn.lock();
            let current = select_fall(&conn, id)?
                .filter(|event| policy::can_read_fall_event(session, event))
                .ok_or_else(missing)?;
            if !policy::can_update_location(session, &current) {
                return Ok(None);
            }

            let changed = conn.execute(
                "UPDATE fall_events SET latitude = ?2, longitude = ?3, version = version + 1 \
                 WHERE id = ?1 AND version = ?4",
                params![
                    id.to_string(),
                    coordinates.latitude,
                    coordinates.longitude,
                    current.version
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            select_fall(&conn, id)?.ok_or_else(missing)?
        };

        debug!(event_id = %id, "Emergency location updated to {}", coordinates);
        self.publish(fall_change(ChangeKind::Update, &event));
        Ok(Some(event))
    }

    /// Persist the reading that accompanied a fall
    pub fn insert_sensor_snapshot(
        &self,
        session: &Session,
        reading: &MotionReading,
    ) -> Result<SensorSnapshot> {
        let snapshot = SensorSnapshot {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            timestamp: reading.timestamp,
            accelerometer: reading.accelerometer,
            gyroscope: reading.gyroscope,
        };

        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO sensor_data (id, user_id, timestamp, accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    snapshot.id.to_string(),
                    snapshot.user_id.to_string(),
                    timestamp(&snapshot.timestamp),
                    snapshot.accelerometer.x,
                    snapshot.accelerometer.y,
                    snapshot.accelerometer.z,
                    snapshot.gyroscope.x,
                    snapshot.gyroscope.y,
                    snapshot.gyroscope.z
                ],
            )?;
        }

        self.publish(ChangeEvent::new(
            Table::SensorData,
            ChangeKind::Insert,
            snapshot.id,
            snapshot.user_id,
        ));
        Ok(snapshot)
    }

    pub fn latest_sensor_snapshot(&self, session: &Session) -> Result<Option<SensorSnapshot>> {
        let conn = self.conn.lock();
        let snapshot = conn
            .query_row(
                "SELECT id, user_id, timestamp, accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z \
                 FROM sensor_data WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT 1",
                params![session.user_id.to_string()],
                |row| {
                    Ok(SensorSnapshot {
                        id: uuid_column(row, 0)?,
                        user_id: uuid_column(row, 1)?,
                        timestamp: timestamp_column(row, 2)?,
                        accelerometer: Axis3::new(row.get(3)?, row.get(4)?, row.get(5)?),
                        gyroscope: Axis3::new(row.get(6)?, row.get(7)?, row.get(8)?),
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{sign_in, store};
    use crate::realtime::ChangeFilter;

    fn delhi() -> Coordinates {
        Coordinates::new(28.6139, 77.2090).unwrap()
    }

    #[test]
    fn test_trigger_creates_one_pending_row() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);

        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();
        assert!(!event.is_emergency);
        assert!(!event.resolved);
        assert_eq!(event.version, 0);

        let history = db.fall_events_for_user(&patient, patient.user_id).unwrap();
        assert_eq!(history, vec![event]);
    }

    #[test]
    fn test_hospitals_cannot_create_falls() {
        let db = store();
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);
        let err = db.insert_fall_event(&hospital, NewFallEvent::at(delhi())).unwrap_err();
        assert!(matches!(err, SafeFallError::Forbidden(_)));
    }

    #[test]
    fn test_compare_and_swap_admits_one_decision() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();

        let cancelled = db
            .transition_fall_event(&patient, event.id, 0, FallTransition::FalseAlarm)
            .unwrap()
            .unwrap();
        assert!(cancelled.resolved);
        assert_eq!(cancelled.resolved_by, Some(patient.user_id));
        assert!(cancelled.check_invariants().is_ok());

        // Stale version and non-pending row both lose
        assert!(db
            .transition_fall_event(&patient, event.id, 0, FallTransition::Escalate)
            .unwrap()
            .is_none());
        assert!(db
            .transition_fall_event(&patient, event.id, 1, FallTransition::Escalate)
            .unwrap()
            .is_none());
        assert!(!db.fall_event(&patient, event.id).unwrap().is_emergency);
    }

    #[test]
    fn test_hospital_visibility_follows_emergency_flag() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);
        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();

        assert!(db.fall_event(&hospital, event.id).is_err());
        assert!(db.active_emergencies(&hospital).unwrap().is_empty());

        db.transition_fall_event(&patient, event.id, 0, FallTransition::Escalate)
            .unwrap()
            .unwrap();
        let visible = db.active_emergencies(&hospital).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, event.id);
        assert!(db.profile_for(&hospital, patient.user_id).is_ok());
        assert_eq!(
            db.active_emergency_for_user(&patient).unwrap().map(|e| e.id),
            Some(event.id)
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);
        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();
        db.transition_fall_event(&patient, event.id, 0, FallTransition::Escalate)
            .unwrap();

        let first = db.resolve_fall_event(&hospital, event.id).unwrap();
        let ResolveOutcome::Resolved(resolved) = first else {
            panic!("expected a fresh resolution");
        };
        assert_eq!(resolved.resolved_by, Some(hospital.user_id));

        let again = db.resolve_fall_event(&hospital, event.id).unwrap();
        assert!(matches!(again, ResolveOutcome::AlreadyResolved(_)));
        let stored = db.fall_event(&patient, event.id).unwrap();
        assert_eq!(stored.resolved_at, resolved.resolved_at);
        assert_eq!(stored.resolved_by, resolved.resolved_by);
        assert_eq!(stored.version, resolved.version);
    }

    #[test]
    fn test_closed_emergency_hidden_from_other_hospitals() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);
        let other = sign_in(&db, "h2@example.com", Role::Hospital);
        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();
        db.transition_fall_event(&patient, event.id, 0, FallTransition::Escalate)
            .unwrap();
        db.resolve_fall_event(&hospital, event.id).unwrap();

        assert!(matches!(
            db.fall_event(&other, event.id),
            Err(SafeFallError::NotFound { .. })
        ));
        assert!(matches!(
            db.resolve_fall_event(&other, event.id),
            Err(SafeFallError::NotFound { .. })
        ));

        // The resolving hospital still gets the idempotent answer
        let again = db.resolve_fall_event(&hospital, event.id).unwrap();
        assert_eq!(again.event().resolved_by, Some(hospital.user_id));
    }

    #[test]
    fn test_location_updates_reject_other_users() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let stranger = sign_in(&db, "q@example.com", Role::Patient);
        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();
        db.transition_fall_event(&patient, event.id, 0, FallTransition::Escalate)
            .unwrap();

        let moved = Coordinates::new(28.7, 77.1).unwrap();
        assert!(matches!(
            db.update_fall_location(&stranger, event.id, moved),
            Err(SafeFallError::NotFound { .. })
        ));
        assert_eq!(db.fall_event(&patient, event.id).unwrap().coordinates(), Some(delhi()));
    }

    #[test]
    fn test_resolve_rejects_non_emergencies() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);
        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();

        assert!(matches!(
            db.resolve_fall_event(&hospital, event.id),
            Err(SafeFallError::NotFound { .. })
        ));
        assert!(matches!(
            db.resolve_fall_event(&patient, event.id),
            Err(SafeFallError::Forbidden(_))
        ));
    }

    #[test]
    fn test_location_updates_only_while_active() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);
        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();
        let moved = Coordinates::new(28.7, 77.1).unwrap();

        assert!(db.update_fall_location(&patient, event.id, moved).unwrap().is_none());

        db.transition_fall_event(&patient, event.id, 0, FallTransition::Escalate)
            .unwrap();
        let updated = db.update_fall_location(&patient, event.id, moved).unwrap().unwrap();
        assert_eq!(updated.coordinates(), Some(moved));

        db.resolve_fall_event(&hospital, event.id).unwrap();
        assert!(db.update_fall_location(&patient, event.id, delhi()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let mut mine = db
            .changes()
            .subscribe(Table::FallEvents, ChangeFilter::OwnedBy(patient.user_id));
        let mut emergencies = db
            .changes()
            .subscribe(Table::FallEvents, ChangeFilter::ActiveEmergencies);

        let event = db.insert_fall_event(&patient, NewFallEvent::at(delhi())).unwrap();
        db.transition_fall_event(&patient, event.id, 0, FallTransition::Escalate)
            .unwrap();

        let crate::realtime::ChangeSignal::Change(first) = mine.changed().await.unwrap() else {
            panic!("unexpected resync");
        };
        assert_eq!(first.kind, ChangeKind::Insert);

        // The pending insert is not an emergency; the escalation is
        let crate::realtime::ChangeSignal::Change(escalated) = emergencies.changed().await.unwrap()
        else {
            panic!("unexpected resync");
        };
        assert_eq!(escalated.kind, ChangeKind::Update);
        assert_eq!(escalated.record_id, event.id);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let reading = MotionReading::resting("phone");
        let stored = db.insert_sensor_snapshot(&patient, &reading).unwrap();
        let latest = db.latest_sensor_snapshot(&patient).unwrap().unwrap();
        assert_eq!(latest.id, stored.id);
        assert_eq!(latest.accelerometer, reading.accelerometer);
    }
}
