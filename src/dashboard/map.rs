// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Live map markers and centering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Session;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Coordinates, Role};

pub const UNKNOWN_PATIENT: &str = "Unknown Patient";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub coordinates: Coordinates,
    pub timestamp: DateTime<Utc>,
    /// Only filled in for hospital viewers
    pub patient_name: Option<String>,
}

/// Emergency markers for the caller
///
/// Hospitals see every active emergency with a known position. Patients see
/// their own latest active emergency, if any.
pub fn map_markers(db: &Database, session: &Session) -> Result<Vec<MapMarker>> {
    match session.role {
        Role::Hospital => {
            let markers = db
                .active_emergencies(session)?
                .into_iter()
                .filter_map(|event| {
                    let coordinates = event.coordinates()?;
                    let patient_name = db
                        .profile_for(session, event.user_id)
                        .map(|p| p.name)
                        .unwrap_or_else(|_| UNKNOWN_PATIENT.to_string());
                    Some(MapMarker {
                        event_id: event.id,
                        user_id: event.user_id,
                        coordinates,
                        timestamp: event.timestamp,
                        patient_name: Some(patient_name),
                    })
                })
                .collect();
            Ok(markers)
        }
        Role::Patient => {
            let marker = db
                .active_emergency_for_user(session)?
                .and_then(|event| {
                    Some(MapMarker {
                        event_id: event.id,
                        user_id: event.user_id,
                        coordinates: event.coordinates()?,
                        timestamp: event.timestamp,
                        patient_name: None,
                    })
                });
            Ok(marker.into_iter().collect())
        }
    }
}

/// First marker, else the viewer's own position, else `default`
pub fn map_center(
    markers: &[MapMarker],
    own: Option<Coordinates>,
    default: Coordinates,
) -> Coordinates {
    markers
        .first()
        .map(|m| m.coordinates)
        .or(own)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{sign_in, store};
    use crate::models::{FallTransition, NewFallEvent};

    fn at(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[test]
    fn test_center_precedence() {
        let default = at(28.6139, 77.2090);
        let own = at(19.07, 72.87);
        let marker = MapMarker {
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            coordinates: at(12.97, 77.59),
            timestamp: Utc::now(),
            patient_name: None,
        };

        assert_eq!(map_center(&[], None, default), default);
        assert_eq!(map_center(&[], Some(own), default), own);
        assert_eq!(map_center(&[marker.clone()], Some(own), default), marker.coordinates);
    }

    #[test]
    fn test_markers_by_role() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);

        let event = db
            .insert_fall_event(&patient, NewFallEvent::at(at(28.6, 77.2)))
            .unwrap();
        assert!(map_markers(&db, &patient).unwrap().is_empty());

        db.transition_fall_event(&patient, event.id, event.version, FallTransition::Escalate)
            .unwrap();

        let own = map_markers(&db, &patient).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].patient_name, None);

        let seen = map_markers(&db, &hospital).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].patient_name.as_deref(), Some("p@example.com"));
    }
}
