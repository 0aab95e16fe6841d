// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::models::Coordinates;
use crate::streaming::StreamingConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Motion simulation
    pub sensors: SensorConfig,

    /// Countdown and escalation
    pub lifecycle: LifecycleConfig,

    /// Geolocation fallback and refresh
    pub location: LocationConfig,

    /// Sign-up rules and session lifetime
    pub auth: AuthConfig,

    /// Local store
    pub database: DatabaseConfig,

    /// WebSocket fan-out
    pub streaming: StreamingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "SafeFall".to_string(),
            sensors: SensorConfig::default(),
            lifecycle: LifecycleConfig::default(),
            location: LocationConfig::default(),
            auth: AuthConfig::default(),
            database: DatabaseConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("safefall"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Motion simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Baseline sample interval
    pub tick_interval_ms: u64,

    /// Delay between the steps of a replayed fall
    pub fall_step_interval_ms: u64,

    /// Samples kept per sensor for charting
    pub window_capacity: usize,

    /// Resting accelerometer z value (m/s²)
    pub gravity: f64,

    /// Peak-to-peak noise on accelerometer x/y
    pub accel_noise: f64,

    /// Peak-to-peak noise on accelerometer z
    pub accel_z_noise: f64,

    /// Peak-to-peak noise on each gyroscope axis
    pub gyro_noise: f64,
}

impl SensorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn fall_step_interval(&self) -> Duration {
        Duration::from_millis(self.fall_step_interval_ms.max(1))
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            fall_step_interval_ms: 300,
            window_capacity: 30,
            gravity: 9.8,
            accel_noise: 0.5,
            accel_z_noise: 0.3,
            gyro_noise: 5.0,
        }
    }
}

/// Fall lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Window in which the patient can avert escalation
    pub countdown_secs: u64,

    /// Interval of countdown progress events
    pub tick_interval_ms: u64,

    /// Delay between record creation and showing the countdown
    pub overlay_delay_ms: u64,

    /// Buffered user commands per fall event
    pub command_buffer: usize,
}

impl LifecycleConfig {
    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 30,
            tick_interval_ms: 1000,
            overlay_delay_ms: 500,
            command_buffer: 4,
        }
    }
}

/// Geolocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Used when no live fix is available
    pub default_latitude: f64,
    pub default_longitude: f64,

    /// Total width of the random offset applied to the default coordinate
    pub jitter_degrees: f64,

    /// Interval at which an active emergency's location is re-sent
    pub refresh_interval_secs: u64,
}

impl LocationConfig {
    pub fn default_coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.default_latitude,
            longitude: self.default_longitude,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_latitude: 28.6139,
            default_longitude: 77.2090,
            jitter_degrees: 0.1,
            refresh_interval_secs: 10,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub min_password_length: usize,

    pub session_timeout_secs: u64,

    /// Failed sign-ins before an account is locked
    pub lockout_threshold: u32,

    pub lockout_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_length: 6,
            session_timeout_secs: 12 * 3600,
            lockout_threshold: 5,
            lockout_minutes: 15,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Persist to disk; an in-memory store is used otherwise
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Capacity of the change-event channel
    pub change_buffer: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/safefall.db"),
            change_buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_dashboard_behaviour() {
        let config = Config::default();
        assert_eq!(config.sensors.window_capacity, 30);
        assert_eq!(config.sensors.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.lifecycle.countdown(), Duration::from_secs(30));
        assert_eq!(config.auth.min_password_length, 6);
    }

    #[test]
    fn test_load_or_create_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        created.lifecycle.countdown_secs = 5;
        created.save(&path).unwrap();

        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.lifecycle.countdown_secs, 5);
        assert_eq!(loaded.location.default_latitude, 28.6139);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[lifecycle]\ncountdown_secs = 10\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lifecycle.countdown_secs, 10);
        assert_eq!(config.lifecycle.overlay_delay_ms, 500);
        assert_eq!(config.sensors.fall_step_interval_ms, 300);
    }
}
