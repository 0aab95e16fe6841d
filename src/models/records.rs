// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Owned records: profiles, emergency contacts, health profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SafeFallError};

pub const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
pub const GENDERS: [&str; 4] = ["Male", "Female", "Other", "Prefer not to say"];

/// Public identity of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

/// Validated emergency contact input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub relation: String,
    pub phone: String,
}

impl ContactForm {
    pub fn new(name: &str, relation: &str, phone: &str) -> Result<Self> {
        let name = required("name", name, 100, "Name")?;
        let relation = required("relation", relation, 50, "Relation")?;
        let phone = required("phone", phone, 20, "Phone number")?;

        let valid_chars = phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        if !valid_chars || digits < 3 {
            return Err(SafeFallError::validation(
                "phone",
                "Enter a valid phone number",
            ));
        }

        Ok(Self {
            name,
            relation,
            phone,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub relation: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated health profile input. Blank text fields are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthProfileForm {
    pub age: Option<u8>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub conditions: Option<String>,
    pub allergies: Option<String>,
    pub notes: Option<String>,
}

impl HealthProfileForm {
    pub fn new(
        age: Option<i64>,
        gender: &str,
        blood_group: &str,
        conditions: &str,
        allergies: &str,
        notes: &str,
    ) -> Result<Self> {
        let age = match age {
            None => None,
            Some(a) if (1..=150).contains(&a) => Some(a as u8),
            Some(_) => {
                return Err(SafeFallError::validation(
                    "age",
                    "Age must be between 1 and 150",
                ))
            }
        };

        let gender = optional("gender", gender, 32)?;
        if let Some(g) = &gender {
            if !GENDERS.contains(&g.as_str()) {
                return Err(SafeFallError::validation("gender", "Select a listed gender"));
            }
        }

        let blood_group = optional("blood_group", blood_group, 3)?;
        if let Some(bg) = &blood_group {
            if !BLOOD_GROUPS.contains(&bg.as_str()) {
                return Err(SafeFallError::validation(
                    "blood_group",
                    "Select a listed blood group",
                ));
            }
        }

        Ok(Self {
            age,
            gender,
            blood_group,
            conditions: optional("conditions", conditions, 1000)?,
            allergies: optional("allergies", allergies, 1000)?,
            notes: optional("notes", notes, 2000)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub age: Option<u8>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub conditions: Option<String>,
    pub allergies: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn required(field: &'static str, value: &str, max: usize, label: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SafeFallError::validation(field, format!("{} is required", label)));
    }
    if value.chars().count() > max {
        return Err(SafeFallError::validation(
            field,
            format!("{} must be at most {} characters", label, max),
        ));
    }
    Ok(value.to_string())
}

fn optional(field: &'static str, value: &str, max: usize) -> Result<Option<String>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.chars().count() > max {
        return Err(SafeFallError::validation(
            field,
            format!("must be at most {} characters", max),
        ));
    }
    Ok(Some(value.to_string()))
}
