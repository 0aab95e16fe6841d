// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Motion sensor traits and common types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Standard gravity used to express accelerations in g
pub const STANDARD_GRAVITY: f64 = 9.8;

/// The two virtual motion sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Accelerometer, // m/s²
    Gyroscope,     // °/s
}

impl SensorKind {
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "m/s²",
            SensorKind::Gyroscope => "°/s",
        }
    }
}

/// Sensor operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    Disconnected,
    Connected,
    Active,
    /// The platform refused motion access
    PermissionDenied,
    Error,
}

/// One three-axis value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axis3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }
}

/// A paired accelerometer/gyroscope sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionReading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub accelerometer: Axis3,
    pub gyroscope: Axis3,
    /// True for samples replayed from a simulated fall
    pub simulated_fall: bool,
}

impl MotionReading {
    /// Device at rest, screen up
    pub fn resting(sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            timestamp: Utc::now(),
            sequence: 0,
            accelerometer: Axis3::new(0.0, 0.0, STANDARD_GRAVITY),
            gyroscope: Axis3::default(),
            simulated_fall: false,
        }
    }

    /// Acceleration magnitude in g
    pub fn g_force(&self) -> f64 {
        self.accelerometer.magnitude() / STANDARD_GRAVITY
    }

    pub fn axis(&self, kind: SensorKind) -> Axis3 {
        match kind {
            SensorKind::Accelerometer => self.accelerometer,
            SensorKind::Gyroscope => self.gyroscope,
        }
    }
}

/// One step of a canned fall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallStep {
    pub label: &'static str,
    pub accelerometer: Axis3,
    pub gyroscope: Axis3,
}

/// Trait for motion sources, simulated or platform-backed
#[async_trait]
pub trait MotionSensor: Send + Sync {
    /// Get sensor unique identifier
    fn id(&self) -> &str;

    /// Get current status
    fn status(&self) -> SensorStatus;

    /// Acquire the platform motion API. Fails with `PermissionDenied` when refused.
    async fn connect(&mut self) -> Result<()>;

    /// Release the platform motion API
    async fn disconnect(&mut self) -> Result<()>;

    /// Produce the next resting sample
    async fn read(&mut self) -> Result<MotionReading>;

    /// Samples replayed when a fall is simulated
    fn fall_sequence(&self) -> Vec<FallStep>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resting_reading_is_one_g() {
        let reading = MotionReading::resting("phone");
        assert!((reading.g_force() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_axis_magnitude() {
        assert_eq!(Axis3::new(3.0, 4.0, 0.0).magnitude(), 5.0);
    }
}
