//! User-visible transient notifications
//!
//! Orchestrator operations never propagate recoverable failures to their
//! callers. Instead they publish a notification here, which a UI can render
//! as a toast and a CLI can print. The notifier supports:
//! - Multiple subscribers via a broadcast channel
//! - A bounded history for consumers that poll instead of subscribing

use crate::core::error::{ErrorReport, TaggerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A single notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    fn new(level: NotificationLevel, message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            level,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Publisher of user-visible notifications
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
    history: Mutex<VecDeque<Notification>>,
    max_history: usize,
}

impl Notifier {
    /// Create a new notifier with default history size
    pub fn new() -> Self {
        Self::with_history_size(100)
    }

    /// Create a new notifier with specified history size
    pub fn with_history_size(max_history: usize) -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(max_history)),
            max_history,
        }
    }

    /// Subscribe to notifications published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(notification = %message, "Success");
        self.publish(Notification::new(NotificationLevel::Success, message));
    }

    /// Report an error to the user, logging it with a trace id
    pub fn error(&self, error: &TaggerError) {
        let report = ErrorReport::from_error(error);
        tracing::error!(
            error_type = %report.error,
            trace_id = %report.trace_id,
            "{}",
            report.message
        );
        self.publish(Notification::new(NotificationLevel::Error, report.message));
    }

    fn publish(&self, notification: Notification) {
        if let Ok(mut history) = self.history.lock() {
            history.push_back(notification.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        // No receivers is fine, the history still has it
        let _ = self.sender.send(notification);
    }

    /// Get the notification history, oldest first
    pub fn history(&self) -> Vec<Notification> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recent notification, if any
    pub fn last(&self) -> Option<Notification> {
        self.history.lock().ok().and_then(|h| h.back().cloned())
    }

    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
