// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Row-level access policy
//!
//! Every record belongs to one user. A hospital account gets read access to
//! a patient's records only while that patient has an emergency that is
//! unresolved, or one the hospital itself resolved.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::auth::Session;
use crate::error::Result;
use crate::models::{FallEvent, Role};

pub fn can_read_fall_event(session: &Session, event: &FallEvent) -> bool {
    if event.user_id == session.user_id {
        return true;
    }
    session.role == Role::Hospital
        && event.is_emergency
        && (!event.resolved || event.resolved_by == Some(session.user_id))
}

pub fn can_resolve(session: &Session, event: &FallEvent) -> bool {
    session.role == Role::Hospital && event.is_active_emergency()
}

/// Owner only, and only while the event is an active emergency
pub fn can_update_location(session: &Session, event: &FallEvent) -> bool {
    session.role == Role::Patient
        && event.user_id == session.user_id
        && event.is_active_emergency()
}

pub fn hospital_can_access_patient(
    conn: &Connection,
    hospital_id: Uuid,
    patient_id: Uuid,
) -> Result<bool> {
    let visible: bool = conn.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM fall_events
            WHERE user_id = ?1 AND is_emergency = 1
              AND (resolved = 0 OR resolved_by = ?2)
        )",
        params![patient_id.to_string(), hospital_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(visible)
}

/// Profiles, contacts and notifications of `owner`
pub fn can_read_patient_records(conn: &Connection, session: &Session, owner: Uuid) -> Result<bool> {
    if session.user_id == owner {
        return Ok(true);
    }
    match session.role {
        Role::Hospital => hospital_can_access_patient(conn, session.user_id, owner),
        Role::Patient => Ok(false),
    }
}

pub fn can_read_health_profile(conn: &Connection, session: &Session, owner: Uuid) -> Result<bool> {
    can_read_patient_records(conn, session, owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(role: Role) -> Session {
        Session::new(Uuid::new_v4(), role, "Test", "test@example.com", chrono::Duration::hours(1))
    }

    fn event_for(owner: Uuid, is_emergency: bool, resolved_by: Option<Uuid>) -> FallEvent {
        FallEvent {
            id: Uuid::new_v4(),
            user_id: owner,
            timestamp: Utc::now(),
            is_emergency,
            resolved: resolved_by.is_some(),
            resolved_at: resolved_by.map(|_| Utc::now()),
            resolved_by,
            latitude: None,
            longitude: None,
            notes: None,
            version: 0,
        }
    }

    #[test]
    fn test_hospital_sees_only_emergencies() {
        let patient = session(Role::Patient);
        let hospital = session(Role::Hospital);
        let other_hospital = session(Role::Hospital);

        let pending = event_for(patient.user_id, false, None);
        let active = event_for(patient.user_id, true, None);
        let resolved = event_for(patient.user_id, true, Some(hospital.user_id));

        assert!(can_read_fall_event(&patient, &pending));
        assert!(!can_read_fall_event(&hospital, &pending));
        assert!(can_read_fall_event(&hospital, &active));
        assert!(can_read_fall_event(&hospital, &resolved));
        assert!(!can_read_fall_event(&other_hospital, &resolved));
    }

    #[test]
    fn test_patients_never_see_each_other() {
        let a = session(Role::Patient);
        let b = session(Role::Patient);
        assert!(!can_read_fall_event(&b, &event_for(a.user_id, true, None)));
    }

    #[test]
    fn test_resolve_and_location_gates() {
        let patient = session(Role::Patient);
        let hospital = session(Role::Hospital);
        let active = event_for(patient.user_id, true, None);
        let false_alarm = event_for(patient.user_id, false, Some(patient.user_id));

        assert!(can_resolve(&hospital, &active));
        assert!(!can_resolve(&patient, &active));
        assert!(!can_resolve(&hospital, &false_alarm));

        assert!(can_update_location(&patient, &active));
        assert!(!can_update_location(&hospital, &active));
        assert!(!can_update_location(&patient, &false_alarm));
    }
}
