use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::TimeOfDay;

pub const SLOT_TITLE: &str = "Table Available";
/// Pushover "high" priority; bypasses the user's quiet hours.
pub const SLOT_PRIORITY: i8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub message: String,
    pub priority: i8,
}

impl NotificationRequest {
    pub fn slot_available(time: TimeOfDay, date: NaiveDate, party_size: u32) -> Self {
        Self {
            title: SLOT_TITLE.to_string(),
            message: format!(
                "Table available at {} on {} for {} people.",
                time,
                date.format("%Y-%m-%d"),
                party_size
            ),
            priority: SLOT_PRIORITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    pub id: Option<String>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("notification rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// Delivery adapters implement this trait.
pub trait NotificationSink: Send + Sync {
    fn send(&self, request: &NotificationRequest) -> Result<Ack, SendError>;
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send(&self, request: &NotificationRequest) -> Result<Ack, SendError> {
        tracing::info!(
            title = %request.title,
            priority = request.priority,
            "dry run: {}",
            request.message
        );
        Ok(Ack::default())
    }
}

/// Keeps every request it is handed. Messages listed in `fail_on` are
/// rejected instead of recorded.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<NotificationRequest>>,
    fail_on: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any request whose message contains `needle`.
    pub fn fail_when(&self, needle: impl Into<String>) {
        self.fail_on.lock().push(needle.into());
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn send(&self, request: &NotificationRequest) -> Result<Ack, SendError> {
        if self
            .fail_on
            .lock()
            .iter()
            .any(|needle| request.message.contains(needle.as_str()))
        {
            return Err(SendError::Rejected {
                status: 500,
                detail: "scripted failure".to_string(),
            });
        }
        let mut sent = self.sent.lock();
        sent.push(request.clone());
        Ok(Ack {
            id: Some(format!("rec-{}", sent.len())),
        })
    }
}

impl<T: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<T> {
    fn send(&self, request: &NotificationRequest) -> Result<Ack, SendError> {
        (**self).send(request)
    }
}
