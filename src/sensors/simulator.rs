// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Motion simulator for demo/testing

use async_trait::async_trait;
use chrono::Utc;
use rand::prelude::*;
use rand_distr::Uniform;

use super::{Axis3, FallStep, MotionReading, MotionSensor, SensorStatus};
use crate::config::SensorConfig;
use crate::error::{Result, SafeFallError};

/// Impact, rebound, settle
pub const FALL_SEQUENCE: [FallStep; 3] = [
    FallStep {
        label: "impact",
        accelerometer: Axis3::new(2.0, -5.0, 3.0),
        gyroscope: Axis3::new(100.0, -50.0, 30.0),
    },
    FallStep {
        label: "rebound",
        accelerometer: Axis3::new(-8.0, 2.0, -4.0),
        gyroscope: Axis3::new(-80.0, 120.0, -60.0),
    },
    FallStep {
        label: "settle",
        accelerometer: Axis3::new(0.5, 0.2, 0.3),
        gyroscope: Axis3::new(2.0, -1.0, 0.5),
    },
];

/// Simulates a phone lying still, with a canned fall on request
pub struct MotionSimulator {
    id: String,
    status: SensorStatus,
    sequence: u64,
    rng: StdRng,
    deny_permission: bool,

    // Simulation state
    gravity: f64,
    accel_noise: f64,
    accel_z_noise: f64,
    gyro_noise: f64,
}

impl MotionSimulator {
    pub fn new(id: &str, config: &SensorConfig) -> Self {
        Self::with_rng(id, config, StdRng::from_entropy())
    }

    /// Deterministic stream for tests
    pub fn seeded(id: &str, config: &SensorConfig, seed: u64) -> Self {
        Self::with_rng(id, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(id: &str, config: &SensorConfig, rng: StdRng) -> Self {
        Self {
            id: id.to_string(),
            status: SensorStatus::Disconnected,
            sequence: 0,
            rng,
            deny_permission: false,
            gravity: config.gravity,
            accel_noise: config.accel_noise,
            accel_z_noise: config.accel_z_noise,
            gyro_noise: config.gyro_noise,
        }
    }

    /// Make `connect` behave like a refused motion-permission prompt
    pub fn deny_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    fn generate_baseline(&mut self) -> (Axis3, Axis3) {
        // Centered on zero, width one; scaled per axis
        let unit = Uniform::new(-0.5, 0.5);

        let accelerometer = Axis3 {
            x: self.rng.sample(unit) * self.accel_noise,
            y: self.rng.sample(unit) * self.accel_noise,
            z: self.gravity + self.rng.sample(unit) * self.accel_z_noise,
        };
        let gyroscope = Axis3 {
            x: self.rng.sample(unit) * self.gyro_noise,
            y: self.rng.sample(unit) * self.gyro_noise,
            z: self.rng.sample(unit) * self.gyro_noise,
        };

        (accelerometer, gyroscope)
    }
}

#[async_trait]
impl MotionSensor for MotionSimulator {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SensorStatus {
        self.status
    }

    async fn connect(&mut self) -> Result<()> {
        if self.deny_permission {
            self.status = SensorStatus::PermissionDenied;
            return Err(SafeFallError::PermissionDenied(
                "Motion sensor access was denied".to_string(),
            ));
        }
        self.status = SensorStatus::Active;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.status = SensorStatus::Disconnected;
        Ok(())
    }

    async fn read(&mut self) -> Result<MotionReading> {
        if self.status != SensorStatus::Active {
            return Err(SafeFallError::PermissionDenied(format!(
                "sensor {} is not active",
                self.id
            )));
        }

        let (accelerometer, gyroscope) = self.generate_baseline();
        self.sequence += 1;

        Ok(MotionReading {
            sensor_id: self.id.clone(),
            timestamp: Utc::now(),
            sequence: self.sequence,
            accelerometer,
            gyroscope,
            simulated_fall: false,
        })
    }

    fn fall_sequence(&self) -> Vec<FallStep> {
        FALL_SEQUENCE.to_vec()
    }
}
