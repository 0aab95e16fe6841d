// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Fall event rows and their persisted status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Coordinates;
use crate::error::{Result, SafeFallError};
use crate::sensors::Axis3;

/// A persisted fall incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub is_emergency: bool,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
    /// Bumped on every write; conditional updates compare against it
    pub version: i64,
}

/// Where a fall event stands, derived from its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallStatus {
    /// Created, countdown not yet decided
    Pending,
    /// Escalated and waiting for a hospital
    Emergency,
    /// Cancelled by the patient inside the countdown
    FalseAlarm,
    /// Emergency closed by a hospital
    Resolved,
}

impl FallEvent {
    pub fn status(&self) -> FallStatus {
        match (self.is_emergency, self.resolved) {
            (false, false) => FallStatus::Pending,
            (true, false) => FallStatus::Emergency,
            (false, true) => FallStatus::FalseAlarm,
            (true, true) => FallStatus::Resolved,
        }
    }

    /// The only condition under which hospital viewers may see the row
    pub fn is_active_emergency(&self) -> bool {
        self.is_emergency && !self.resolved
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_columns(self.latitude, self.longitude)
    }

    /// `resolved_at` and `resolved_by` are set exactly when `resolved` is
    pub fn check_invariants(&self) -> Result<()> {
        let stamped = self.resolved_at.is_some() && self.resolved_by.is_some();
        let unstamped = self.resolved_at.is_none() && self.resolved_by.is_none();

        if (self.resolved && !stamped) || (!self.resolved && !unstamped) {
            return Err(SafeFallError::Persistence(format!(
                "fall event {} has inconsistent resolution fields",
                self.id
            )));
        }
        Ok(())
    }
}

/// Insert payload for a new fall event
#[derive(Debug, Clone, PartialEq)]
pub struct NewFallEvent {
    pub coordinates: Option<Coordinates>,
    pub notes: Option<String>,
}

impl NewFallEvent {
    pub fn at(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
            notes: None,
        }
    }
}

/// Terminal decisions that may be taken on a pending fall event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallTransition {
    Escalate,
    FalseAlarm,
}

/// Motion reading stored alongside a fall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub accelerometer: Axis3,
    pub gyroscope: Axis3,
}
