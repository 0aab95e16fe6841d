// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Notifications, emergency contacts and health profiles

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use super::{
    now, optional_uuid_column, policy, timestamp, timestamp_column, uuid_column, Database,
};
use crate::auth::Session;
use crate::error::{Result, SafeFallError};
use crate::models::{
    ContactForm, EmergencyContact, HealthProfile, HealthProfileForm, NewNotification,
    Notification, Role,
};
use crate::realtime::{ChangeEvent, ChangeKind, Table};

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(2)?;
    Ok(Notification {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        kind: kind.into(),
        title: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        related_event_id: optional_uuid_column(row, 7)?,
    })
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<EmergencyContact> {
    Ok(EmergencyContact {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        name: row.get(2)?,
        relation: row.get(3)?,
        phone: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
    })
}

fn health_from_row(row: &Row<'_>) -> rusqlite::Result<HealthProfile> {
    Ok(HealthProfile {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        blood_group: row.get(4)?,
        conditions: row.get(5)?,
        allergies: row.get(6)?,
        notes: row.get(7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

fn select_contact(conn: &Connection, session: &Session, id: Uuid) -> Result<EmergencyContact> {
    conn.query_row(
        "SELECT id, user_id, name, relation, phone, created_at, updated_at \
         FROM emergency_contacts WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), session.user_id.to_string()],
        contact_from_row,
    )
    .optional()?
    .ok_or_else(|| SafeFallError::not_found("emergency contact", id))
}

fn select_health(conn: &Connection, user_id: Uuid) -> Result<Option<HealthProfile>> {
    let profile = conn
        .query_row(
            "SELECT id, user_id, age, gender, blood_group, conditions, allergies, notes, created_at, updated_at \
             FROM health_profiles WHERE user_id = ?1",
            params![user_id.to_string()],
            health_from_row,
        )
        .optional()?;
    Ok(profile)
}

impl Database {
    /// Address a notification to a user the caller may act for
    pub fn insert_notification(
        &self,
        session: &Session,
        new: NewNotification,
    ) -> Result<Notification> {
        let notification = {
            let conn = self.conn.lock();
            if !policy::can_read_patient_records(&conn, session, new.user_id)? {
                return Err(SafeFallError::Forbidden(format!(
                    "cannot notify {}",
                    new.user_id
                )));
            }

            let notification = Notification {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                kind: new.kind,
                title: new.title,
                message: new.message,
                read: false,
                created_at: now(),
                related_event_id: new.related_event_id,
            };
            conn.execute(
                "INSERT INTO notifications (id, user_id, type, title, message, read, created_at, related_event_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                params![
                    notification.id.to_string(),
                    notification.user_id.to_string(),
                    notification.kind.as_str(),
                    notification.title,
                    notification.message,
                    timestamp(&notification.created_at),
                    notification.related_event_id.map(|id| id.to_string())
                ],
            )?;
            notification
        };

        debug!(user_id = %notification.user_id, "Notification '{}' queued", notification.title);
        self.publish(ChangeEvent::new(
            Table::Notifications,
            ChangeKind::Insert,
            notification.id,
            notification.user_id,
        ));
        Ok(notification)
    }

    /// The caller's notifications, newest first
    pub fn notifications_for_user(&self, session: &Session) -> Result<Vec<Notification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, type, title, message, read, created_at, related_event_id \
             FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![session.user_id.to_string()], notification_from_row)?;
        let notifications = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, session: &Session, id: Uuid) -> Result<()> {
        let changed = {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), session.user_id.to_string()],
            )?
        };
        if changed == 0 {
            return Err(SafeFallError::not_found("notification", id));
        }

        self.publish(ChangeEvent::new(
            Table::Notifications,
            ChangeKind::Update,
            id,
            session.user_id,
        ));
        Ok(())
    }

    /// Returns how many were unread
    pub fn mark_all_notifications_read(&self, session: &Session) -> Result<usize> {
        let ids = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id FROM notifications WHERE user_id = ?1 AND read = 0",
            )?;
            let ids = stmt
                .query_map(params![session.user_id.to_string()], |row| uuid_column(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                params![session.user_id.to_string()],
            )?;
            ids
        };

        for id in &ids {
            self.publish(ChangeEvent::new(
                Table::Notifications,
                ChangeKind::Update,
                *id,
                session.user_id,
            ));
        }
        Ok(ids.len())
    }

    pub fn insert_contact(&self, session: &Session, form: ContactForm) -> Result<EmergencyContact> {
        let created = now();
        let contact = EmergencyContact {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            name: form.name,
            relation: form.relation,
            phone: form.phone,
            created_at: created,
            updated_at: created,
        };

        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO emergency_contacts (id, user_id, name, relation, phone, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    contact.id.to_string(),
                    contact.user_id.to_string(),
                    contact.name,
                    contact.relation,
                    contact.phone,
                    timestamp(&created)
                ],
            )?;
        }

        self.publish(ChangeEvent::new(
            Table::EmergencyContacts,
            ChangeKind::Insert,
            contact.id,
            contact.user_id,
        ));
        Ok(contact)
    }

    pub fn update_contact(
        &self,
        session: &Session,
        id: Uuid,
        form: ContactForm,
    ) -> Result<EmergencyContact> {
        let contact = {
            let conn = self.conn.lock();
            let changed = conn.execute(
                "UPDATE emergency_contacts SET name = ?3, relation = ?4, phone = ?5, updated_at = ?6 \
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    id.to_string(),
                    session.user_id.to_string(),
                    form.name,
                    form.relation,
                    form.phone,
                    timestamp(&now())
                ],
            )?;
            if changed == 0 {
                return Err(SafeFallError::not_found("emergency contact", id));
            }
            select_contact(&conn, session, id)?
        };

        self.publish(ChangeEvent::new(
            Table::EmergencyContacts,
            ChangeKind::Update,
            id,
            session.user_id,
        ));
        Ok(contact)
    }

    pub fn delete_contact(&self, session: &Session, id: Uuid) -> Result<()> {
        let changed = {
            let conn = self.conn.lock();
            conn.execute(
                "DELETE FROM emergency_contacts WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), session.user_id.to_string()],
            )?
        };
        if changed == 0 {
            return Err(SafeFallError::not_found("emergency contact", id));
        }

        self.publish(ChangeEvent::new(
            Table::EmergencyContacts,
            ChangeKind::Delete,
            id,
            session.user_id,
        ));
        Ok(())
    }

    /// Contacts of `user_id`, oldest first
    pub fn contacts_for_user(
        &self,
        session: &Session,
        user_id: Uuid,
    ) -> Result<Vec<EmergencyContact>> {
        let conn = self.conn.lock();
        if !policy::can_read_patient_records(&conn, session, user_id)? {
            return Err(SafeFallError::Forbidden(format!(
                "contacts of {} are not visible to this account",
                user_id
            )));
        }

        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, relation, phone, created_at, updated_at \
             FROM emergency_contacts WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], contact_from_row)?;
        let contacts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contacts)
    }

    /// Create or replace the caller's health profile
    pub fn upsert_health_profile(
        &self,
        session: &Session,
        form: HealthProfileForm,
    ) -> Result<HealthProfile> {
        session.require_role(Role::Patient)?;

        let (profile, kind) = {
            let conn = self.conn.lock();
            let updated_at = now();
            let kind = match select_health(&conn, session.user_id)? {
                Some(existing) => {
                    conn.execute(
                        "UPDATE health_profiles SET age = ?2, gender = ?3, blood_group = ?4, \
                         conditions = ?5, allergies = ?6, notes = ?7, updated_at = ?8 WHERE id = ?1",
                        params![
                            existing.id.to_string(),
                            form.age,
                            form.gender,
                            form.blood_group,
                            form.conditions,
                            form.allergies,
                            form.notes,
                            timestamp(&updated_at)
                        ],
                    )?;
                    ChangeKind::Update
                }
                None => {
                    conn.execute(
                        "INSERT INTO health_profiles \
                         (id, user_id, age, gender, blood_group, conditions, allergies, notes, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                        params![
                            Uuid::new_v4().to_string(),
                            session.user_id.to_string(),
                            form.age,
                            form.gender,
                            form.blood_group,
                            form.conditions,
                            form.allergies,
                            form.notes,
                            timestamp(&updated_at)
                        ],
                    )?;
                    ChangeKind::Insert
                }
            };
            let profile = select_health(&conn, session.user_id)?
                .ok_or_else(|| SafeFallError::not_found("health profile", session.user_id))?;
            (profile, kind)
        };

        self.publish(ChangeEvent::new(
            Table::HealthProfiles,
            kind,
            profile.id,
            profile.user_id,
        ));
        Ok(profile)
    }

    pub fn health_profile_for(
        &self,
        session: &Session,
        user_id: Uuid,
    ) -> Result<Option<HealthProfile>> {
        let conn = self.conn.lock();
        if !policy::can_read_health_profile(&conn, session, user_id)? {
            return Err(SafeFallError::Forbidden(format!(
                "health profile of {} is not visible to this account",
                user_id
            )));
        }
        select_health(&conn, user_id)
    }
}
