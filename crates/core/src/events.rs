//! In-process domain event bus.
//!
//! Core writes publish events here; indexing, notification and audit
//! consumers subscribe independently. Publishing is strictly best-effort: a
//! send with no live subscribers, or a lagging subscriber, never affects the
//! write that produced the event.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 256;

/// JSON event payload pushed over the wound-updates broadcast topic.
#[derive(Debug, Clone, Serialize)]
pub struct WoundUpdate {
    pub wound_case_id: i64,
    pub wound_id: String,
    pub patient_id: i64,
    pub status: String,
    pub kind: &'static str,
}

/// JSON event payload pushed over the appointment-updates broadcast topic.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentUpdate {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub status: String,
    pub kind: &'static str,
}

/// Per-user notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPush {
    pub id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub priority: String,
    pub created_at: String,
    pub action_url: String,
    pub action_text: String,
}

/// Broadcast hub: two shared topics plus a lazily created per-user feed.
#[derive(Clone)]
pub struct EventBus {
    wound_updates: broadcast::Sender<String>,
    appointment_updates: broadcast::Sender<String>,
    user_feeds: Arc<Mutex<HashMap<i64, broadcast::Sender<String>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (wound_updates, _) = broadcast::channel(TOPIC_CAPACITY);
        let (appointment_updates, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            wound_updates,
            appointment_updates,
            user_feeds: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to the wound-updates broadcast topic.
    pub fn subscribe_wound_updates(&self) -> broadcast::Receiver<String> {
        self.wound_updates.subscribe()
    }

    /// Subscribe to the appointment-updates broadcast topic.
    pub fn subscribe_appointments(&self) -> broadcast::Receiver<String> {
        self.appointment_updates.subscribe()
    }

    /// Subscribe to a user's private notification feed.
    pub fn subscribe_user(&self, profile_id: i64) -> broadcast::Receiver<String> {
        self.user_feed(profile_id).subscribe()
    }

    pub fn publish_wound_update(&self, update: &WoundUpdate) {
        Self::send_json(&self.wound_updates, update, "wound_updates");
    }

    pub fn publish_appointment_update(&self, update: &AppointmentUpdate) {
        Self::send_json(&self.appointment_updates, update, "appointment_updates");
    }

    pub fn push_to_user(&self, profile_id: i64, push: &NotificationPush) {
        let sender = self.user_feed(profile_id);
        Self::send_json(&sender, push, "user_feed");
    }

    fn user_feed(&self, profile_id: i64) -> broadcast::Sender<String> {
        let mut feeds = self
            .user_feeds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        feeds
            .entry(profile_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    fn send_json<T: Serialize>(sender: &broadcast::Sender<String>, payload: &T, topic: &str) {
        match serde_json::to_string(payload) {
            // A send error only means no subscriber is connected right now.
            Ok(json) => {
                if sender.send(json).is_err() {
                    tracing::debug!("no subscribers on {topic}, event dropped");
                }
            }
            Err(e) => tracing::warn!("failed to serialise {topic} event: {e}"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish_wound_update(&WoundUpdate {
            wound_case_id: 1,
            wound_id: "WND-00001".into(),
            patient_id: 1,
            status: "active".into(),
            kind: "created",
        });
    }

    #[test]
    fn subscriber_receives_wound_update() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_wound_updates();
        bus.publish_wound_update(&WoundUpdate {
            wound_case_id: 7,
            wound_id: "WND-00007".into(),
            patient_id: 3,
            status: "healing".into(),
            kind: "updated",
        });
        let json = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["wound_id"], "WND-00007");
        assert_eq!(value["kind"], "updated");
    }

    #[test]
    fn user_feeds_are_isolated() {
        let bus = EventBus::new();
        let mut alice = bus.subscribe_user(1);
        let mut bob = bus.subscribe_user(2);
        bus.push_to_user(1, &NotificationPush {
            id: 1,
            title: "t".into(),
            message: "m".into(),
            notification_type: "info".into(),
            priority: "medium".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            action_url: String::new(),
            action_text: String::new(),
        });
        assert!(alice.try_recv().is_ok());
        assert!(bob.try_recv().is_err());
    }
}
