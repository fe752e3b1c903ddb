//! Stored notifications with a live push over the event bus.
//!
//! The database row is the source of truth; the push to the recipient's feed
//! is best-effort. `notify_role` fans one message out to every active holder
//! of a role.

use crate::db::now_rfc3339;
use crate::events::{EventBus, NotificationPush};
use crate::rbac::Role;
use crate::repositories::appointments::require_row;
use crate::{HmisError, HmisResult, Store};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_profile_id: i64,
    pub sender_profile_id: Option<i64>,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub priority: String,
    pub is_read: bool,
    pub action_url: String,
    pub action_text: String,
    pub related_wound_case_id: Option<i64>,
    pub related_patient_id: Option<i64>,
    pub related_appointment_id: Option<i64>,
    pub created_at: String,
}

/// Everything about a notification except its recipient.
#[derive(Debug, Clone, Default)]
pub struct NotificationContent {
    pub sender_profile_id: Option<i64>,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub priority: String,
    pub action_url: String,
    pub action_text: String,
    pub related_wound_case_id: Option<i64>,
    pub related_patient_id: Option<i64>,
    pub related_appointment_id: Option<i64>,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            notification_type: "info".into(),
            priority: "medium".into(),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct NotificationService {
    store: Store,
    bus: EventBus,
}

impl NotificationService {
    pub fn new(store: Store, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Store a notification and push it to the recipient's live feed.
    pub fn send(
        &self,
        recipient_profile_id: i64,
        content: &NotificationContent,
    ) -> HmisResult<Notification> {
        if content.title.trim().is_empty() {
            return Err(HmisError::InvalidInput("notification title is required".into()));
        }
        let conn = self.store.conn();
        require_row(&conn, "user_profiles", "user profile", recipient_profile_id)?;
        conn.execute(
            "INSERT INTO notifications
                 (recipient_profile_id, sender_profile_id, title, message, notification_type,
                  priority, action_url, action_text, related_wound_case_id, related_patient_id,
                  related_appointment_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                recipient_profile_id,
                content.sender_profile_id,
                content.title,
                content.message,
                content.notification_type,
                content.priority,
                content.action_url,
                content.action_text,
                content.related_wound_case_id,
                content.related_patient_id,
                content.related_appointment_id,
                now_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        let created = self.get(id)?;
        self.bus.push_to_user(
            recipient_profile_id,
            &NotificationPush {
                id: created.id,
                title: created.title.clone(),
                message: created.message.clone(),
                notification_type: created.notification_type.clone(),
                priority: created.priority.clone(),
                created_at: created.created_at.clone(),
                action_url: created.action_url.clone(),
                action_text: created.action_text.clone(),
            },
        );
        Ok(created)
    }

    /// Send one message to every active staff member holding `role`.
    /// Failures on individual recipients are logged and skipped; the write
    /// that triggered the fan-out must not fail because of it.
    pub fn notify_role(&self, role: Role, content: &NotificationContent) -> usize {
        let ids: Vec<i64> = {
            let conn = self.store.conn();
            let Ok(mut stmt) = conn.prepare(
                "SELECT p.id FROM user_profiles p
                 JOIN user_accounts a ON a.id = p.account_id
                 WHERE p.role = ?1 AND a.is_active = 1",
            ) else {
                return 0;
            };
            match stmt
                .query_map(params![role.as_str()], |row| row.get(0))
                .and_then(|rows| rows.collect())
            {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!("role fan-out query failed: {e}");
                    return 0;
                }
            }
        };
        let mut sent = 0;
        for id in ids {
            match self.send(id, content) {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!("failed to notify profile {id}: {e}"),
            }
        }
        sent
    }

    pub fn get(&self, id: i64) -> HmisResult<Notification> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM notifications WHERE id = ?1"),
                params![id],
                notification_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("notification", id))
    }

    /// Newest first, optionally unread only.
    pub fn list_for(
        &self,
        recipient_profile_id: i64,
        unread_only: bool,
    ) -> HmisResult<Vec<Notification>> {
        let conn = self.store.conn();
        let sql = if unread_only {
            format!(
                "SELECT {COLUMNS} FROM notifications
                 WHERE recipient_profile_id = ?1 AND is_read = 0
                 ORDER BY created_at DESC, id DESC"
            )
        } else {
            format!(
                "SELECT {COLUMNS} FROM notifications
                 WHERE recipient_profile_id = ?1
                 ORDER BY created_at DESC, id DESC"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![recipient_profile_id], notification_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn unread_count(&self, recipient_profile_id: i64) -> HmisResult<i64> {
        let count = self.store.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_profile_id = ?1 AND is_read = 0",
            params![recipient_profile_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark one notification read. Only the recipient may do this; anyone
    /// else gets not-found rather than a hint the row exists.
    pub fn mark_read(&self, id: i64, recipient_profile_id: i64) -> HmisResult<()> {
        let changed = self.store.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_profile_id = ?2",
            params![id, recipient_profile_id],
        )?;
        if changed == 0 {
            return Err(HmisError::not_found("notification", id));
        }
        Ok(())
    }

    pub fn mark_all_read(&self, recipient_profile_id: i64) -> HmisResult<usize> {
        let changed = self.store.conn().execute(
            "UPDATE notifications SET is_read = 1
             WHERE recipient_profile_id = ?1 AND is_read = 0",
            params![recipient_profile_id],
        )?;
        Ok(changed)
    }
}

const COLUMNS: &str = "id, recipient_profile_id, sender_profile_id, title, message, \
                       notification_type, priority, is_read, action_url, action_text, \
                       related_wound_case_id, related_patient_id, related_appointment_id, \
                       created_at";

fn notification_row(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        recipient_profile_id: row.get(1)?,
        sender_profile_id: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        notification_type: row.get(5)?,
        priority: row.get(6)?,
        is_read: row.get(7)?,
        action_url: row.get(8)?,
        action_text: row.get(9)?,
        related_wound_case_id: row.get(10)?,
        related_patient_id: row.get(11)?,
        related_appointment_id: row.get(12)?,
        created_at: row.get(13)?,
    })
}
