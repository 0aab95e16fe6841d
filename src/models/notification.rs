// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Notification rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SafeFallError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Emergency,
    Resolved,
    Info,
    /// Any type string this build does not know about
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Emergency => "emergency",
            NotificationType::Resolved => "resolved",
            NotificationType::Info => "info",
            NotificationType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for NotificationType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "emergency" => NotificationType::Emergency,
            "resolved" => NotificationType::Resolved,
            "info" => NotificationType::Info,
            _ => NotificationType::Other(s),
        }
    }
}

impl From<NotificationType> for String {
    fn from(t: NotificationType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub related_event_id: Option<Uuid>,
}

/// Insert payload for a notification addressed to `user_id`
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_event_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationType,
        title: &str,
        message: &str,
        related_event_id: Option<Uuid>,
    ) -> Result<Self> {
        let title = title.trim();
        let message = message.trim();
        if title.is_empty() {
            return Err(SafeFallError::validation("title", "Title is required"));
        }
        if message.is_empty() {
            return Err(SafeFallError::validation("message", "Message is required"));
        }
        Ok(Self {
            user_id,
            kind,
            title: title.to_string(),
            message: message.to_string(),
            related_event_id,
        })
    }

    /// Sent to the patient when their countdown escalates
    pub fn emergency_raised(patient: Uuid, event_id: Uuid) -> Self {
        Self {
            user_id: patient,
            kind: NotificationType::Emergency,
            title: "Emergency Alert Sent".to_string(),
            message: "Your fall has been escalated. Nearby hospitals have been alerted and help is on the way.".to_string(),
            related_event_id: Some(event_id),
        }
    }

    /// Sent to the patient when a hospital closes their emergency
    pub fn emergency_resolved(patient: Uuid, event_id: Uuid) -> Self {
        Self {
            user_id: patient,
            kind: NotificationType::Resolved,
            title: "Emergency Resolved".to_string(),
            message: "Your emergency has been resolved by the hospital. Stay safe!".to_string(),
            related_event_id: Some(event_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_types_are_preserved() {
        let t = NotificationType::from("reminder".to_string());
        assert_eq!(t, NotificationType::Other("reminder".to_string()));
        assert_eq!(t.as_str(), "reminder");
        assert_eq!(NotificationType::from("resolved".to_string()), NotificationType::Resolved);
    }

    #[test]
    fn test_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&NotificationType::Emergency).unwrap();
        assert_eq!(json, "\"emergency\"");
    }

    #[test]
    fn test_blank_title_rejected() {
        let err = NewNotification::new(Uuid::new_v4(), NotificationType::Info, "  ", "body", None);
        assert!(matches!(err, Err(SafeFallError::Validation { field: "title", .. })));
    }
}
