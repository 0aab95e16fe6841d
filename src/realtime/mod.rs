// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Real-time change notification
//!
//! The store publishes a [`ChangeEvent`] after every committed write. Views
//! hold [`Subscription`]s scoped by table and filter; a subscription only
//! signals that something changed, and the view re-fetches in full.

mod view;

pub use view::{LiveView, ViewState};

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SafeFallError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    FallEvents,
    Notifications,
    EmergencyContacts,
    HealthProfiles,
    SensorData,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::FallEvents => "fall_events",
            Table::Notifications => "notifications",
            Table::EmergencyContacts => "emergency_contacts",
            Table::HealthProfiles => "health_profiles",
            Table::SensorData => "sensor_data",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Change signal for one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub record_id: Uuid,
    pub owner_id: Uuid,
    /// `is_emergency` of a fall event row after the change; false elsewhere
    pub is_emergency: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, record_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            table,
            kind,
            record_id,
            owner_id,
            is_emergency: false,
            timestamp: Utc::now(),
        }
    }

    pub fn emergency(mut self, is_emergency: bool) -> Self {
        self.is_emergency = is_emergency;
        self
    }
}

/// Row filter applied on top of the table scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    All,
    OwnedBy(Uuid),
    /// Fall event rows flagged as emergencies, resolved or not
    ActiveEmergencies,
}

impl ChangeFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::OwnedBy(owner) => event.owner_id == *owner,
            ChangeFilter::ActiveEmergencies => {
                event.table == Table::FallEvents && event.is_emergency
            }
        }
    }
}

/// What a subscription delivers
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeSignal {
    Change(ChangeEvent),
    /// Signals were dropped; the consumer must re-fetch
    Resync,
}

/// Backend pub/sub for row changes
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    active: Arc<AtomicUsize>,
    published: AtomicU64,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            active: Arc::new(AtomicUsize::new(0)),
            published: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: ChangeEvent) {
        debug!(
            table = %event.table,
            record_id = %event.record_id,
            "change {:?}",
            event.kind
        );
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, table: Table, filter: ChangeFilter) -> Subscription {
        self.active.fetch_add(1, Ordering::AcqRel);
        Subscription {
            table,
            filter,
            rx: self.tx.subscribe(),
            active: self.active.clone(),
        }
    }

    /// Subscriptions not yet dropped
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle to one (table, filter) channel. Dropping it unsubscribes.
pub struct Subscription {
    table: Table,
    filter: ChangeFilter,
    rx: broadcast::Receiver<ChangeEvent>,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn table(&self) -> Table {
        self.table
    }

    pub fn filter(&self) -> ChangeFilter {
        self.filter
    }

    /// Wait for the next matching change
    pub async fn changed(&mut self) -> Result<ChangeSignal> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if event.table == self.table && self.filter.matches(&event) {
                        return Ok(ChangeSignal::Change(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Subscription on {} lagged by {} changes", self.table, missed);
                    return Ok(ChangeSignal::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SafeFallError::Subscription(format!(
                        "change feed for {} closed",
                        self.table
                    )));
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fall_change(owner: Uuid, is_emergency: bool) -> ChangeEvent {
        ChangeEvent::new(Table::FallEvents, ChangeKind::Update, Uuid::new_v4(), owner)
            .emergency(is_emergency)
    }

    #[test]
    fn test_filters() {
        let owner = Uuid::new_v4();
        let pending = fall_change(owner, false);
        let escalated = fall_change(owner, true);
        let note = ChangeEvent::new(Table::Notifications, ChangeKind::Insert, Uuid::new_v4(), owner);

        assert!(ChangeFilter::OwnedBy(owner).matches(&pending));
        assert!(!ChangeFilter::OwnedBy(Uuid::new_v4()).matches(&pending));
        assert!(!ChangeFilter::ActiveEmergencies.matches(&pending));
        assert!(ChangeFilter::ActiveEmergencies.matches(&escalated));
        assert!(!ChangeFilter::ActiveEmergencies.matches(&note));
        assert!(ChangeFilter::All.matches(&note));
    }

    #[tokio::test]
    async fn test_subscription_scoped_to_table_and_filter() {
        let feed = ChangeFeed::new(16);
        let owner = Uuid::new_v4();
        let mut sub = feed.subscribe(Table::Notifications, ChangeFilter::OwnedBy(owner));

        feed.publish(fall_change(owner, true));
        feed.publish(ChangeEvent::new(Table::Notifications, ChangeKind::Insert, Uuid::new_v4(), Uuid::new_v4()));
        let expected = ChangeEvent::new(Table::Notifications, ChangeKind::Insert, Uuid::new_v4(), owner);
        feed.publish(expected.clone());

        assert_eq!(sub.changed().await.unwrap(), ChangeSignal::Change(expected));
    }

    #[test]
    fn test_drop_releases_slot() {
        let feed = ChangeFeed::default();
        let a = feed.subscribe(Table::FallEvents, ChangeFilter::All);
        let b = feed.subscribe(Table::Notifications, ChangeFilter::All);
        assert_eq!(feed.active_subscriptions(), 2);
        drop(a);
        assert_eq!(feed.active_subscriptions(), 1);
        drop(b);
        assert_eq!(feed.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_lag_requests_resync() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe(Table::FallEvents, ChangeFilter::All);
        for _ in 0..5 {
            feed.publish(fall_change(Uuid::new_v4(), false));
        }
        assert_eq!(sub.changed().await.unwrap(), ChangeSignal::Resync);
    }

    #[tokio::test]
    async fn test_closed_feed_is_a_subscription_failure() {
        let feed = ChangeFeed::new(4);
        let mut sub = feed.subscribe(Table::FallEvents, ChangeFilter::All);
        drop(feed);
        assert!(matches!(sub.changed().await, Err(SafeFallError::Subscription(_))));
    }
}
