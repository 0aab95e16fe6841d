// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Dashboard state derived from stored records
//!
//! Everything here is a pure function of rows already fetched, so it can be
//! recomputed from scratch on every live view refresh.

mod analytics;
mod hospital;
mod map;
mod views;

pub use analytics::{Analytics, WELCOME_MESSAGE};
pub use hospital::{
    active_emergencies, time_since, Acknowledgements, ActiveEmergency, HealthSummary,
    ACKNOWLEDGED_NOTICE,
};
pub use map::{map_center, map_markers, MapMarker, UNKNOWN_PATIENT};
pub use views::{fall_history_view, hospital_emergencies_view, live_map_view, notifications_view};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{FallEvent, Notification};

/// Headline counts for a patient's history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallStats {
    pub total: usize,
    pub emergencies: usize,
    pub false_alarms: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

impl FallStats {
    pub fn from_events(events: &[FallEvent]) -> Self {
        Self {
            total: events.len(),
            emergencies: events.iter().filter(|e| e.is_emergency).count(),
            false_alarms: events.iter().filter(|e| is_false_alarm(e)).count(),
            last_activity: events.iter().map(|e| e.timestamp).max(),
        }
    }
}

fn is_false_alarm(event: &FallEvent) -> bool {
    !event.is_emergency && event.resolved
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryFilter {
    #[default]
    All,
    Emergency,
    FalseAlarm,
}

impl HistoryFilter {
    pub fn matches(&self, event: &FallEvent) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Emergency => event.is_emergency,
            HistoryFilter::FalseAlarm => is_false_alarm(event),
        }
    }

    pub fn apply<'a>(&self, events: &'a [FallEvent]) -> Vec<&'a FallEvent> {
        events.iter().filter(|e| self.matches(e)).collect()
    }

    /// Text shown when the filter leaves nothing
    pub fn empty_message(&self) -> &'static str {
        match self {
            HistoryFilter::All => "No fall events recorded yet",
            HistoryFilter::Emergency => "No emergencies recorded",
            HistoryFilter::FalseAlarm => "No false alarms recorded",
        }
    }
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

pub fn unread(notifications: &[Notification]) -> Vec<&Notification> {
    notifications.iter().filter(|n| !n.read).collect()
}

/// Inbox header line
pub fn unread_summary(notifications: &[Notification]) -> String {
    match unread_count(notifications) {
        0 => "All caught up!".to_string(),
        1 => "1 unread notification".to_string(),
        n => format!("{} unread notifications", n),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use crate::models::FallEvent;

    pub fn event(at: DateTime<Utc>, is_emergency: bool, resolved: bool) -> FallEvent {
        let user_id = Uuid::new_v4();
        FallEvent {
            id: Uuid::new_v4(),
            user_id,
            timestamp: at,
            is_emergency,
            resolved,
            resolved_at: resolved.then_some(at),
            resolved_by: resolved.then_some(user_id),
            latitude: Some(28.6),
            longitude: Some(77.2),
            notes: None,
            version: 1,
        }
    }
}
