// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! SafeFall - Fall Detection and Emergency Escalation
//!
//! The backend half of a patient/hospital fall-detection system:
//! - Simulated accelerometer and gyroscope feed with a replayable fall
//! - Geolocation with permission handling and a jittered fallback
//! - A 30 second countdown per fall that escalates unless the patient cancels
//! - Row-level access control over a local SQLite store
//! - Change subscriptions that keep patient and hospital views fresh
//! - WebSocket fan-out of readings, lifecycle events and emergency changes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SafeFall Engine                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐  │
//! │  │ Sensor  │ → │ Lifecycle │ → │ Database  │ → │ Change   │  │
//! │  │ Feed    │   │ (actor)   │   │ + policy  │   │ Feed     │  │
//! │  └─────────┘   └───────────┘   └───────────┘   └──────────┘  │
//! │       ↓              ↓                              ↓        │
//! │  ┌────────────────────────────────────────┐   ┌──────────┐   │
//! │  │               Event Bus                │   │  Live    │   │
//! │  └────────────────────────────────────────┘   │  Views   │   │
//! │       ↓              ↓                        └──────────┘   │
//! │  ┌─────────┐   ┌───────────┐   ┌───────────┐                 │
//! │  │ Geo-    │   │ Streaming │   │   Auth    │                 │
//! │  │ location│   │ (ws)      │   │ Sessions  │                 │
//! │  └─────────┘   └───────────┘   └───────────┘                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod location;
pub mod models;
pub mod realtime;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use auth::{AuthService, Credentials, Session};
pub use config::Config;
pub use core::{Engine, EventBus, SystemState};
pub use db::Database;
pub use error::{Result, SafeFallError};
pub use lifecycle::{FallHandle, FallLifecycle, FallOutcome, FallState};
pub use location::GeolocationProvider;
pub use models::{Coordinates, FallEvent, Role};
pub use realtime::{ChangeFeed, LiveView};
pub use sensors::{MotionReading, MotionSimulator, SensorFeed};
pub use streaming::StreamingManager;

/// SafeFall version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SafeFall name
pub const NAME: &str = "SafeFall";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Minimum supported Rust version
    pub rust_version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
}
