use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Where an error should surface in the embedding UI. Errors are scoped to
/// the control they belong to so a failed send never blocks the session list
/// and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorScope {
    /// The message input of the open conversation.
    Composer,
    /// The single-session view (acquire/refresh/close).
    Session,
    /// The admin dashboard's session list.
    SessionList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// The visible state of a session changed (new messages or new status).
    SessionUpdated { session_id: String },

    /// A session reached its terminal state, locally or server-side.
    SessionClosed { session_id: String },

    /// The admin dashboard's active-session list was replaced.
    SessionListUpdated { count: usize },

    /// The admin's selected session disappeared or was closed.
    SelectionCleared { session_id: String },

    /// A scoped, dismissible error message.
    Error { scope: ErrorScope, message: String },
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }

    pub fn error(&self, scope: ErrorScope, message: impl Into<String>) {
        self.publish(Event::Error {
            scope,
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
