// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Emergency response center state

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::auth::Session;
use crate::db::Database;
use crate::error::{Result, SafeFallError};
use crate::models::{Coordinates, FallEvent, HealthProfile, Role};

pub const ACKNOWLEDGED_NOTICE: &str = "Emergency acknowledged. Dispatching help...";

/// Medical details a responder needs first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub age: Option<u8>,
    pub blood_group: Option<String>,
    pub conditions: Option<String>,
    pub allergies: Option<String>,
}

impl From<HealthProfile> for HealthSummary {
    fn from(p: HealthProfile) -> Self {
        Self {
            age: p.age,
            blood_group: p.blood_group,
            conditions: p.conditions,
            allergies: p.allergies,
        }
    }
}

/// An unresolved emergency with the patient's identity attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEmergency {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub coordinates: Option<Coordinates>,
    pub patient_name: String,
    pub patient_email: String,
    pub health: Option<HealthSummary>,
}

/// Active emergencies visible to a hospital, newest first
///
/// Rows whose patient profile cannot be read are left out.
pub fn active_emergencies(db: &Database, session: &Session) -> Result<Vec<ActiveEmergency>> {
    session.require_role(Role::Hospital)?;

    let mut enriched = Vec::new();
    for event in db.active_emergencies(session)? {
        match enrich(db, session, &event) {
            Ok(emergency) => enriched.push(emergency),
            Err(SafeFallError::NotFound { .. }) | Err(SafeFallError::Forbidden(_)) => {
                debug!(event_id = %event.id, "Skipping emergency without a visible profile");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(enriched)
}

fn enrich(db: &Database, session: &Session, event: &FallEvent) -> Result<ActiveEmergency> {
    let profile = db.profile_for(session, event.user_id)?;
    let health = db
        .health_profile_for(session, event.user_id)?
        .map(HealthSummary::from);

    Ok(ActiveEmergency {
        event_id: event.id,
        user_id: event.user_id,
        timestamp: event.timestamp,
        coordinates: event.coordinates(),
        patient_name: profile.name,
        patient_email: profile.email,
        health,
    })
}

/// Coarse elapsed time: "2h 5m ago", "12m ago", "Just now"
pub fn time_since(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - timestamp).num_minutes().max(0);
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m ago", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m ago", minutes)
    } else {
        "Just now".to_string()
    }
}

/// Emergencies this responder has picked up; local to the session
#[derive(Debug, Clone, Default)]
pub struct Acknowledgements {
    ids: HashSet<Uuid>,
}

impl Acknowledgements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if it was already acknowledged
    pub fn acknowledge(&mut self, event_id: Uuid) -> bool {
        self.ids.insert(event_id)
    }

    pub fn is_acknowledged(&self, event_id: Uuid) -> bool {
        self.ids.contains(&event_id)
    }

    /// Forget anything no longer in the active list
    pub fn retain_active(&mut self, active: &[ActiveEmergency]) {
        let live: HashSet<Uuid> = active.iter().map(|e| e.event_id).collect();
        self.ids.retain(|id| live.contains(id));
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
