// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Database module for persistent storage
//!
//! Every query takes the caller's [`Session`] and applies the row-level
//! policy in [`policy`] before returning or mutating anything. Writes publish
//! a [`ChangeEvent`] once the connection lock has been released.

mod fall_events;
pub mod policy;
mod records;

pub use fall_events::ResolveOutcome;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::Session;
use crate::config::DatabaseConfig;
use crate::error::{Result, SafeFallError};
use crate::models::{Profile, Role};
use crate::realtime::{ChangeEvent, ChangeFeed};

/// Stored account row
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn profile(&self) -> Profile {
        Profile {
            user_id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Database manager
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    changes: Arc<ChangeFeed>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig, changes: Arc<ChangeFeed>) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SafeFallError::Persistence(format!("cannot create {:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self::with_connection(conn, changes)?;
        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// Private store for tests and the demo
    pub fn open_in_memory(changes: Arc<ChangeFeed>) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, changes)
    }

    fn with_connection(conn: Connection, changes: Arc<ChangeFeed>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        };
        db.create_tables()?;
        Ok(db)
    }

    pub fn changes(&self) -> &Arc<ChangeFeed> {
        &self.changes
    }

    /// Create database tables
    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('patient', 'hospital')),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fall_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                timestamp TEXT NOT NULL,
                is_emergency INTEGER NOT NULL DEFAULT 0,
                resolved INTEGER NOT NULL DEFAULT 0,
                resolved_at TEXT,
                resolved_by TEXT REFERENCES users(id),
                latitude REAL,
                longitude REAL,
                notes TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                CHECK ((resolved = 1) = (resolved_at IS NOT NULL AND resolved_by IS NOT NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_fall_events_user ON fall_events(user_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_fall_events_active ON fall_events(is_emergency, resolved);

            CREATE TABLE IF NOT EXISTS sensor_data (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                timestamp TEXT NOT NULL,
                accel_x REAL NOT NULL,
                accel_y REAL NOT NULL,
                accel_z REAL NOT NULL,
                gyro_x REAL NOT NULL,
                gyro_y REAL NOT NULL,
                gyro_z REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sensor_data_user ON sensor_data(user_id, timestamp);

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                related_event_id TEXT REFERENCES fall_events(id)
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);

            CREATE TABLE IF NOT EXISTS emergency_contacts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                relation TEXT NOT NULL,
                phone TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS health_profiles (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
                age INTEGER,
                gender TEXT,
                blood_group TEXT,
                conditions TEXT,
                allergies TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;

        Ok(())
    }

    /// Store a new account. Emails are unique.
    pub fn insert_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRecord> {
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now(),
        };

        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO users (id, email, name, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.email,
                user.name,
                user.password_hash,
                user.role.as_str(),
                timestamp(&user.created_at)
            ],
        );

        match inserted {
            Ok(_) => {
                debug!("Registered {} account {}", user.role, user.id);
                Ok(user)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(SafeFallError::validation(
                    "email",
                    "An account with this email already exists",
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, email, name, password_hash, role, created_at FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn role_for(&self, user_id: Uuid) -> Result<Option<Role>> {
        let conn = self.conn.lock();
        let role = conn
            .query_row(
                "SELECT role FROM users WHERE id = ?1",
                params![user_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        role.map(|r| r.parse()).transpose()
    }

    /// Name and email of `user_id`, if the caller may see them
    pub fn profile_for(&self, session: &Session, user_id: Uuid) -> Result<Profile> {
        let conn = self.conn.lock();
        if !policy::can_read_patient_records(&conn, session, user_id)? {
            return Err(SafeFallError::Forbidden(format!(
                "profile of {} is not visible to this account",
                user_id
            )));
        }

        conn.query_row(
            "SELECT id, name, email FROM users WHERE id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(Profile {
                    user_id: uuid_column(row, 0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| SafeFallError::not_found("profile", user_id))
    }

    fn publish(&self, change: ChangeEvent) {
        self.changes.publish(change);
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let role: String = row.get(4)?;
    Ok(UserRecord {
        id: uuid_column(row, 0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        role: role
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        created_at: timestamp_column(row, 5)?,
    })
}

/// Current time at the precision the store keeps
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// RFC 3339 with fixed precision so text ordering matches time ordering
pub(crate) fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(idx, &raw)
}

pub(crate) fn optional_timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn store() -> Database {
        Database::open_in_memory(Arc::new(ChangeFeed::new(256))).unwrap()
    }

    pub fn sign_in(db: &Database, email: &str, role: Role) -> Session {
        let user = db.insert_user(email, email, "not-a-real-hash", role).unwrap();
        Session::for_user(&user)
    }

    /// Make every `op` ("INSERT" or "UPDATE") on `table` fail from now on
    pub fn reject_writes(db: &Database, table: &str, op: &str) {
        let sql = format!(
            "CREATE TRIGGER reject_{op}_{table} BEFORE {op} ON {table} \
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
            op = op.to_lowercase(),
            table = table
        );
        db.conn.lock().execute_batch(&sql).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_duplicate_email_is_a_validation_error() {
        let db = store();
        db.insert_user("a@example.com", "A", "h", Role::Patient).unwrap();
        let err = db.insert_user("a@example.com", "A2", "h", Role::Hospital).unwrap_err();
        assert!(matches!(err, SafeFallError::Validation { field: "email", .. }));
    }

    #[test]
    fn test_find_user_and_role() {
        let db = store();
        let user = db.insert_user("h@example.com", "City Hospital", "h", Role::Hospital).unwrap();
        let found = db.find_user_by_email("h@example.com").unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(db.role_for(user.id).unwrap(), Some(Role::Hospital));
        assert!(db.find_user_by_email("missing@example.com").unwrap().is_none());
    }

    #[test]
    fn test_profile_visibility() {
        let db = store();
        let patient = sign_in(&db, "p@example.com", Role::Patient);
        let other = sign_in(&db, "o@example.com", Role::Patient);
        let hospital = sign_in(&db, "h@example.com", Role::Hospital);

        assert_eq!(db.profile_for(&patient, patient.user_id).unwrap().email, "p@example.com");
        assert!(matches!(
            db.profile_for(&other, patient.user_id),
            Err(SafeFallError::Forbidden(_))
        ));
        // No active emergency yet
        assert!(db.profile_for(&hospital, patient.user_id).is_err());
    }

    #[test]
    fn test_timestamp_text_orders_like_time() {
        let a = Utc::now();
        let b = a + chrono::Duration::microseconds(1);
        assert!(timestamp(&a) < timestamp(&b));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("safefall.db"),
            ..DatabaseConfig::default()
        };
        let db = Database::open(&config, Arc::new(ChangeFeed::default())).unwrap();
        db.insert_user("x@example.com", "X", "h", Role::Patient).unwrap();
        assert!(config.path.exists());
    }
}
