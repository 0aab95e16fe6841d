// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Authentication and session management

mod session;

pub use session::{Session, DEFAULT_SESSION_TTL_SECS};

use std::collections::HashMap;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::AuthConfig;
use crate::db::{Database, UserRecord};
use crate::error::{Result, SafeFallError};
use crate::models::Role;

/// Email/password pair, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

/// Authentication manager
pub struct AuthService {
    db: Database,

    /// Active sessions
    sessions: RwLock<HashMap<Uuid, Session>>,

    /// Failed login attempts per email
    failed_attempts: Mutex<HashMap<String, (u32, DateTime<Utc>)>>,

    lockout_threshold: u32,
    lockout_duration: Duration,
    min_password_length: usize,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Database, config: &AuthConfig) -> Self {
        Self {
            db,
            sessions: RwLock::new(HashMap::new()),
            failed_attempts: Mutex::new(HashMap::new()),
            lockout_threshold: config.lockout_threshold,
            lockout_duration: Duration::minutes(config.lockout_minutes),
            min_password_length: config.min_password_length,
            session_ttl: Duration::seconds(config.session_timeout_secs as i64),
        }
    }

    /// Hash password using Argon2id
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| SafeFallError::Auth(format!("password hashing failed: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Verify password against hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| SafeFallError::Auth(format!("invalid hash format: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Register an account and sign it in
    pub fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
        role: Role,
    ) -> Result<Session> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SafeFallError::validation("name", "Name is required"));
        }
        if name.chars().count() > 100 {
            return Err(SafeFallError::validation(
                "name",
                "Name must be at most 100 characters",
            ));
        }

        let email = normalize_email(email)?;

        if password != confirm_password {
            return Err(SafeFallError::validation(
                "confirm_password",
                "Passwords do not match",
            ));
        }
        if password.chars().count() < self.min_password_length {
            return Err(SafeFallError::validation(
                "password",
                format!(
                    "Password must be at least {} characters",
                    self.min_password_length
                ),
            ));
        }

        let hash = self.hash_password(password)?;
        let user = self.db.insert_user(&email, name, &hash, role)?;
        info!("New {} account {}", role, user.id);

        Ok(self.create_session(&user))
    }

    pub fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let email = normalize_email(&credentials.email)?;

        if self.is_locked_out(&email) {
            warn!("Sign-in refused for locked account {}", email);
            return Err(SafeFallError::Auth(
                "Too many failed attempts. Try again later.".to_string(),
            ));
        }

        let user = match self.db.find_user_by_email(&email)? {
            Some(user) if self.verify_password(&credentials.password, &user.password_hash)? => user,
            _ => {
                self.record_failed_attempt(&email);
                return Err(SafeFallError::Auth("Invalid email or password".to_string()));
            }
        };

        self.clear_failed_attempts(&email);
        Ok(self.create_session(&user))
    }

    /// Tear the session down. Returns false if it was unknown.
    pub fn sign_out(&self, session: &Session) -> bool {
        let removed = self.sessions.write().remove(&session.id).is_some();
        if removed {
            info!("Signed out {}", session.user_id);
        }
        removed
    }

    /// Live session for `session_id`, if any
    pub fn validate(&self, session_id: Uuid) -> Option<Session> {
        self.sessions
            .read()
            .get(&session_id)
            .filter(|s| !s.is_expired())
            .cloned()
    }

    pub fn active_sessions(&self, user_id: Uuid) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired())
            .count()
    }

    /// Drop expired sessions
    pub fn cleanup_sessions(&self) {
        self.sessions.write().retain(|_, s| !s.is_expired());
    }

    /// Check if an email is locked out
    pub fn is_locked_out(&self, email: &str) -> bool {
        if let Some((attempts, last_attempt)) = self.failed_attempts.lock().get(email) {
            if *attempts >= self.lockout_threshold {
                return Utc::now() < *last_attempt + self.lockout_duration;
            }
        }
        false
    }

    fn record_failed_attempt(&self, email: &str) {
        let mut attempts = self.failed_attempts.lock();
        let entry = attempts.entry(email.to_string()).or_insert((0, Utc::now()));
        entry.0 += 1;
        entry.1 = Utc::now();
    }

    fn clear_failed_attempts(&self, email: &str) {
        self.failed_attempts.lock().remove(email);
    }

    fn create_session(&self, user: &UserRecord) -> Session {
        let session = Session::new(user.id, user.role, &user.name, &user.email, self.session_ttl);
        self.sessions.write().insert(session.id, session.clone());
        session
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if !valid {
        return Err(SafeFallError::validation("email", "Enter a valid email address"));
    }
    Ok(email)
}
