// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Signed-in identity passed to every operation that needs one

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::UserRecord;
use crate::error::{Result, SafeFallError};
use crate::models::{Profile, Role};

/// Session lifetime when none is configured
pub const DEFAULT_SESSION_TTL_SECS: i64 = 12 * 60 * 60;

/// User session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, role: Role, name: &str, email: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            role,
            name: name.to_string(),
            email: email.to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn for_user(user: &UserRecord) -> Self {
        Self::new(
            user.id,
            user.role,
            &user.name,
            &user.email,
            Duration::seconds(DEFAULT_SESSION_TTL_SECS),
        )
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn is_hospital(&self) -> bool {
        self.role == Role::Hospital
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role != role {
            return Err(SafeFallError::Forbidden(format!(
                "{} accounts cannot do this",
                self.role
            )));
        }
        Ok(())
    }

    pub fn profile(&self) -> Profile {
        Profile {
            user_id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}
