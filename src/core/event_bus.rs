// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Event bus for inter-component communication

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Coordinates;
use crate::sensors::MotionReading;

/// Why a countdown ended in an emergency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    Timeout,
    UserRequest,
}

/// Lifecycle event kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleKind {
    Triggered { coordinates: Option<Coordinates> },
    CountdownTick { remaining_secs: u64 },
    Escalated { reason: EscalationReason },
    FalseAlarm,
    Resolved { by: Uuid },
    Error { message: String },
}

impl LifecycleKind {
    /// Steps that belong to an emergency, as opposed to the patient's own countdown
    pub fn is_emergency_step(&self) -> bool {
        matches!(self, LifecycleKind::Escalated { .. } | LifecycleKind::Resolved { .. })
    }
}

/// One step in the life of a fall event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: u64,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: LifecycleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Transient message for one user, shown once and discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotice {
    pub user_id: Uuid,
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    reading_tx: broadcast::Sender<MotionReading>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    notice_tx: broadcast::Sender<UserNotice>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (reading_tx, _) = broadcast::channel(capacity);
        let (lifecycle_tx, _) = broadcast::channel(capacity);
        let (notice_tx, _) = broadcast::channel(capacity);

        Self {
            reading_tx,
            lifecycle_tx,
            notice_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_reading(&self, reading: MotionReading) {
        let _ = self.reading_tx.send(reading);
    }

    pub fn publish_lifecycle(&self, event_id: Uuid, user_id: Uuid, kind: LifecycleKind) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let _ = self.lifecycle_tx.send(LifecycleEvent {
            id,
            event_id,
            user_id,
            timestamp: Utc::now(),
            kind,
        });
    }

    pub fn publish_notice(&self, user_id: Uuid, level: NoticeLevel, message: impl Into<String>) {
        let _ = self.notice_tx.send(UserNotice {
            user_id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn subscribe_readings(&self) -> broadcast::Receiver<MotionReading> {
        self.reading_tx.subscribe()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<UserNotice> {
        self.notice_tx.subscribe()
    }

    pub fn lifecycle_events_published(&self) -> u64 {
        self.event_counter.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle_events_are_numbered() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_lifecycle();
        let event_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        bus.publish_lifecycle(event_id, user_id, LifecycleKind::FalseAlarm);
        bus.publish_lifecycle(event_id, user_id, LifecycleKind::CountdownTick { remaining_secs: 29 });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.id + 1, second.id);
        assert_eq!(second.kind, LifecycleKind::CountdownTick { remaining_secs: 29 });
    }

    #[test]
    fn test_lifecycle_event_json_shape() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe_lifecycle();
        bus.publish_lifecycle(
            Uuid::nil(),
            Uuid::nil(),
            LifecycleKind::Escalated {
                reason: EscalationReason::Timeout,
            },
        );
        let event = rx.try_recv().unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "escalated");
        assert_eq!(json["reason"], "timeout");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish_notice(Uuid::nil(), NoticeLevel::Error, "Error creating fall event");
        assert_eq!(bus.lifecycle_events_published(), 0);
    }
}
