// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Typed records for every backend table
//!
//! Rows are validated when they are constructed, so anything holding one of
//! these types can rely on its invariants without re-checking.

mod fall_event;
mod notification;
mod records;

pub use fall_event::{FallEvent, FallStatus, FallTransition, NewFallEvent, SensorSnapshot};
pub use notification::{NewNotification, Notification, NotificationType};
pub use records::{
    ContactForm, EmergencyContact, HealthProfile, HealthProfileForm, Profile, BLOOD_GROUPS,
    GENDERS,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SafeFallError};

/// Account role, fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Hospital,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Hospital => "hospital",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SafeFallError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "patient" => Ok(Role::Patient),
            "hospital" => Ok(Role::Hospital),
            other => Err(SafeFallError::validation(
                "role",
                format!("unknown role '{}'", other),
            )),
        }
    }
}

/// WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(SafeFallError::validation(
                "latitude",
                format!("{} is outside -90..=90", latitude),
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(SafeFallError::validation(
                "longitude",
                format!("{} is outside -180..=180", longitude),
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Both halves of a nullable column pair, or nothing
    pub fn from_columns(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!("hospital".parse::<Role>().unwrap(), Role::Hospital);
        assert_eq!(Role::Patient.to_string(), "patient");
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn test_coordinates_range_checked() {
        assert!(Coordinates::new(28.6, 77.2).is_ok());
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::NAN).is_err());
        assert_eq!(Coordinates::new(28.61394, 77.20901).unwrap().to_string(), "28.6139, 77.2090");
    }

    #[test]
    fn test_partial_column_pair_is_none() {
        assert!(Coordinates::from_columns(Some(1.0), None).is_none());
        assert!(Coordinates::from_columns(Some(1.0), Some(2.0)).is_some());
    }
}
