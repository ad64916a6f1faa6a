use crate::api::ApiClient;
use crate::bus::{ErrorScope, Event, EventBus};
use crate::chat::AttachmentUpload;
use crate::error::{ChatError, Result};
use crate::session::SessionSlot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What the user has typed (and possibly attached) but not yet sent. `send`
/// borrows the draft, so a failed send leaves the input intact for retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageDraft {
    pub content: String,
    pub attachment: Option<AttachmentUpload>,
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(content: impl Into<String>, attachment: AttachmentUpload) -> Self {
        Self {
            content: content.into(),
            attachment: Some(attachment),
        }
    }

    /// A message must carry content or an attachment, never neither.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.attachment.is_none()
    }

    /// Client-side checks. Runs before any network activity; a draft that
    /// fails here is never transmitted.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if let Some(upload) = &self.attachment {
            if upload.is_oversized() {
                return Err(ChatError::AttachmentTooLarge {
                    size: upload.size(),
                });
            }
        }
        Ok(())
    }
}

/// Clears the in-flight latch on every exit path, including early `?`.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sends messages for one session and reconciles the returned snapshot. The
/// server is authoritative: on success the whole local message list is
/// replaced with what came back; nothing is appended optimistically, so a
/// failure needs no rollback.
pub struct MessageChannel {
    api: Arc<ApiClient>,
    session_id: String,
    slot: Arc<SessionSlot>,
    bus: Arc<EventBus>,
    in_flight: AtomicBool,
}

impl MessageChannel {
    pub(crate) fn new(
        api: Arc<ApiClient>,
        session_id: String,
        slot: Arc<SessionSlot>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            api,
            session_id,
            slot,
            bus,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Send the draft. Refused without touching the network when the draft is
    /// empty or oversized, the session is closed, or another send is still in
    /// flight.
    pub async fn send(&self, draft: &MessageDraft) -> Result<()> {
        draft.validate()?;
        if self.slot.is_closed() {
            return Err(ChatError::SessionClosed);
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(ChatError::SendInFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let stamp = self.slot.begin();
        debug!("sending draft to session {}", self.session_id);
        match self.api.send_message(&self.session_id, draft).await {
            Ok(snapshot) => {
                if self.slot.apply_if_newer(stamp, snapshot) {
                    self.bus.publish(Event::SessionUpdated {
                        session_id: self.session_id.clone(),
                    });
                }
                Ok(())
            }
            Err(err) => {
                // Local state untouched; the caller still holds the draft
                self.bus.error(ErrorScope::Composer, err.to_string());
                Err(err)
            }
        }
    }
}
