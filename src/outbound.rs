use std::sync::Mutex;

use serde_json::Value;

use crate::types::SessionId;

/// Session/broadcast collaborator. Sends are fire-and-forget: a full or
/// closed session must never block or fail the others.
pub trait Outbound: Send + Sync {
    fn send_to(&self, session: SessionId, message: &Value);

    fn broadcast(&self, sessions: &[SessionId], message: &Value) {
        for session in sessions {
            self.send_to(*session, message);
        }
    }
}

/// Keeps every message in memory. Used by tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(SessionId, Value)>>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(SessionId, Value)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Messages of one `type`, in send order.
    pub fn of_type(&self, message_type: &str) -> Vec<(SessionId, Value)> {
        self.messages()
            .into_iter()
            .filter(|(_, message)| message.get("type").and_then(Value::as_str) == Some(message_type))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl Outbound for RecordingOutbound {
    fn send_to(&self, session: SessionId, message: &Value) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((session, message.clone()));
        }
    }
}
