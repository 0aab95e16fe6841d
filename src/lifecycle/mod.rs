// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Fall event lifecycle
//!
//! A trigger creates a pending row, stores the reading that caused it and
//! hands the decision to a countdown actor. The patient can cancel or
//! escalate inside the window; silence escalates. Hospitals close
//! emergencies through [`FallLifecycle::resolve_emergency`].

mod actor;
mod refresher;
mod state;

pub use actor::{CountdownStatus, FallHandle, FallOutcome, ESCALATED_NOTICE, FALSE_ALARM_NOTICE};
pub use refresher::LocationRefresher;
pub use state::{FallInput, FallState};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::config::LifecycleConfig;
use crate::core::{EventBus, LifecycleKind, NoticeLevel};
use crate::db::{Database, ResolveOutcome};
use crate::error::Result;
use crate::models::{Coordinates, NewFallEvent, NewNotification, Role};
use crate::sensors::MotionReading;
use actor::Countdown;

pub const CREATE_FAILED_NOTICE: &str = "Error creating fall event";
pub const RESOLVED_NOTICE: &str = "Emergency resolved successfully";
pub const RESOLVE_FAILED_NOTICE: &str = "Failed to resolve emergency";

/// Drives fall events from trigger to a terminal state
#[derive(Clone)]
pub struct FallLifecycle {
    db: Database,
    bus: Arc<EventBus>,
    config: LifecycleConfig,
}

impl FallLifecycle {
    pub fn new(db: Database, bus: Arc<EventBus>, config: &LifecycleConfig) -> Self {
        Self {
            db,
            bus,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Record a fall and start its countdown
    ///
    /// Must be called from within a tokio runtime.
    pub async fn trigger(
        &self,
        session: &Session,
        reading: &MotionReading,
        coordinates: Coordinates,
    ) -> Result<FallHandle> {
        session.require_role(Role::Patient)?;
        FallState::Idle.apply(FallInput::Trigger)?;

        let event = match self.db.insert_fall_event(session, NewFallEvent::at(coordinates)) {
            Ok(event) => event,
            Err(e) => {
                error!(user_id = %session.user_id, "Error creating fall event: {}", e);
                self.bus
                    .publish_notice(session.user_id, NoticeLevel::Error, CREATE_FAILED_NOTICE);
                return Err(e);
            }
        };

        if let Err(e) = self.db.insert_sensor_snapshot(session, reading) {
            warn!(event_id = %event.id, "Sensor snapshot not stored: {}", e);
        }

        info!(
            event_id = %event.id,
            user_id = %event.user_id,
            g_force = reading.g_force(),
            "Fall detected at {}",
            coordinates
        );
        self.bus.publish_lifecycle(
            event.id,
            event.user_id,
            LifecycleKind::Triggered {
                coordinates: event.coordinates(),
            },
        );

        let countdown = Countdown {
            db: self.db.clone(),
            bus: self.bus.clone(),
            session: session.clone(),
            event,
            overlay_delay: Duration::from_millis(self.config.overlay_delay_ms),
            window: self.config.countdown(),
            tick: self.config.tick_interval(),
        };
        Ok(FallHandle::spawn(countdown, self.config.command_buffer))
    }

    /// Close a patient's emergency. Closing it twice changes nothing.
    pub fn resolve_emergency(&self, session: &Session, event_id: Uuid) -> Result<ResolveOutcome> {
        session.require_role(Role::Hospital)?;

        let outcome = match self.db.resolve_fall_event(session, event_id) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(event_id = %event_id, "Failed to resolve emergency: {}", e);
                self.bus
                    .publish_notice(session.user_id, NoticeLevel::Error, RESOLVE_FAILED_NOTICE);
                return Err(e);
            }
        };

        if let ResolveOutcome::Resolved(event) = &outcome {
            self.bus.publish_lifecycle(
                event.id,
                event.user_id,
                LifecycleKind::Resolved {
                    by: session.user_id,
                },
            );

            let notification = NewNotification::emergency_resolved(event.user_id, event.id);
            if let Err(e) = self.db.insert_notification(session, notification) {
                warn!(event_id = %event.id, "Resolved notification not stored: {}", e);
                self.bus
                    .publish_notice(session.user_id, NoticeLevel::Error, e.user_message());
            }
            self.bus
                .publish_notice(session.user_id, NoticeLevel::Success, RESOLVED_NOTICE);
        }

        Ok(outcome)
    }

    /// Keep the emergency's position in step with `coordinates`
    pub fn follow_location(
        &self,
        session: &Session,
        event_id: Uuid,
        coordinates: watch::Receiver<Option<Coordinates>>,
        period: Duration,
    ) -> LocationRefresher {
        LocationRefresher::spawn(self.db.clone(), session.clone(), event_id, coordinates, period)
    }
}

/// Wait for the first reading of a replayed fall
///
/// Returns `None` once the reading stream closes.
pub async fn next_fall(readings: &mut broadcast::Receiver<MotionReading>) -> Option<MotionReading> {
    loop {
        match readings.recv().await {
            Ok(reading) if reading.simulated_fall => return Some(reading),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Fall watcher lagged by {} readings", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
