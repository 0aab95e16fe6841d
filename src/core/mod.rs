//! Core module - event bus and the engine that wires the services together

mod engine;
mod event_bus;

pub use engine::Engine;
pub use event_bus::{
    EscalationReason, EventBus, LifecycleEvent, LifecycleKind, NoticeLevel, UserNotice,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub feeds_active: usize,
    pub total_readings: u64,
    pub fall_events: u64,
    pub emergencies: u64,
    pub false_alarms: u64,
    pub resolved: u64,
    pub uptime_seconds: u64,
    pub last_fall: Option<DateTime<Utc>>,
}

impl SystemState {
    /// Fold one lifecycle event into the counters
    pub fn record(&mut self, event: &LifecycleEvent) {
        match event.kind {
            LifecycleKind::Triggered { .. } => {
                self.fall_events += 1;
                self.last_fall = Some(event.timestamp);
            }
            LifecycleKind::Escalated { .. } => self.emergencies += 1,
            LifecycleKind::FalseAlarm => self.false_alarms += 1,
            LifecycleKind::Resolved { .. } => self.resolved += 1,
            LifecycleKind::CountdownTick { .. } | LifecycleKind::Error { .. } => {}
        }
    }
}
