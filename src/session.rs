use crate::api::ApiClient;
use crate::bus::{ErrorScope, Event, EventBus};
use crate::channel::{MessageChannel, MessageDraft};
use crate::chat::{ChatSession, SessionStatus};
use crate::error::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Poll cadence for the single-session chat widget.
pub const WIDGET_REFRESH_INTERVAL: Duration = Duration::from_secs(3);

// -----------------------------------------------------------------------------
// SessionSlot
// -----------------------------------------------------------------------------

/// The one place a session's local view lives. Pollers and senders both write
/// through here, and both may be in flight at once, so every request takes a
/// stamp (`begin`) before it goes out and applies its response with
/// `apply_if_newer`: a slow response that lost the race is discarded instead
/// of clobbering newer data. Once the session is closed the slot refuses all
/// further mutation.
pub struct SessionSlot {
    inner: Mutex<SlotInner>,
    seq: AtomicU64,
}

struct SlotInner {
    session: Option<ChatSession>,
    last_applied: u64,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                session: None,
                last_applied: 0,
            }),
            seq: AtomicU64::new(0),
        }
    }

    pub fn with_session(session: ChatSession) -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                session: Some(session),
                last_applied: 0,
            }),
            seq: AtomicU64::new(0),
        }
    }

    /// Take a stamp for a request about to be issued.
    pub fn begin(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the local view with a server snapshot, unless the stamp is
    /// stale or the session has already closed. Returns whether the visible
    /// state actually changed.
    pub fn apply_if_newer(&self, stamp: u64, session: ChatSession) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if stamp <= inner.last_applied {
            debug!("discarding stale snapshot (stamp {})", stamp);
            return false;
        }
        inner.last_applied = stamp;
        if inner
            .session
            .as_ref()
            .map(|s| s.is_closed())
            .unwrap_or(false)
        {
            return false;
        }
        let changed = inner.session.as_ref() != Some(&session);
        if changed {
            inner.session = Some(session);
        }
        changed
    }

    /// Force the terminal status. Explicit closes and vanished sessions both
    /// land here; terminal wins regardless of stamp ordering.
    pub fn mark_closed(&self, stamp: u64) {
        let mut inner = self.inner.lock().unwrap();
        if stamp > inner.last_applied {
            inner.last_applied = stamp;
        }
        if let Some(session) = &mut inner.session {
            session.status = SessionStatus::Closed;
        }
    }

    pub fn snapshot(&self) -> Option<ChatSession> {
        self.inner.lock().unwrap().session.clone()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.inner.lock().unwrap().session.as_ref().map(|s| s.status)
    }

    pub fn is_closed(&self) -> bool {
        self.status().map(|s| s.is_terminal()).unwrap_or(false)
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Poller
// -----------------------------------------------------------------------------

/// Owns at most one background polling task. Starting a new one aborts the
/// old one first, so a start/stop/start sequence can never leave two timers
/// running. Dropping the poller aborts whatever is left.
pub struct Poller {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    pub fn start<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.handle.lock().unwrap();
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = Some(tokio::spawn(fut));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

// -----------------------------------------------------------------------------
// ChatWidget
// -----------------------------------------------------------------------------

struct WidgetShared {
    api: Arc<ApiClient>,
    bus: Arc<EventBus>,
    slot: Arc<SessionSlot>,
    session_id: String,
    channel: MessageChannel,
}

/// The end-user side of a conversation: acquires (or resumes) one session,
/// keeps it fresh with a background poll, and exposes the message channel
/// for sending.
pub struct ChatWidget {
    shared: Arc<WidgetShared>,
    poller: Poller,
}

impl ChatWidget {
    /// Fetch the session with the given id, or create a fresh one when none
    /// is known yet (the first time a user opens the widget). Acquisition is
    /// not retried automatically; the caller surfaces the error.
    pub async fn open(
        api: Arc<ApiClient>,
        bus: Arc<EventBus>,
        existing_id: Option<&str>,
    ) -> Result<Self> {
        let session = match existing_id {
            Some(id) => api.fetch_session(id).await?,
            None => api.create_session().await?,
        };
        let session_id = session.id.clone();
        let slot = Arc::new(SessionSlot::with_session(session));
        let channel = MessageChannel::new(api.clone(), session_id.clone(), slot.clone(), bus.clone());

        Ok(Self {
            shared: Arc::new(WidgetShared {
                api,
                bus,
                slot,
                session_id,
                channel,
            }),
            poller: Poller::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn session(&self) -> Option<ChatSession> {
        self.shared.slot.snapshot()
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.shared.channel
    }

    pub async fn send(&self, draft: &MessageDraft) -> Result<()> {
        self.shared.channel.send(draft).await
    }

    pub fn start_refresh(&self) {
        self.start_refresh_every(WIDGET_REFRESH_INTERVAL);
    }

    /// Begin background refresh. Replaces any previously running timer. A
    /// failed poll cycle is reported on the bus and the next tick still
    /// fires; the loop only ends when the session reaches its terminal state.
    pub fn start_refresh_every(&self, every: Duration) {
        if self.shared.slot.is_closed() {
            return;
        }
        let shared = self.shared.clone();
        self.poller.start(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip that so the first poll lands
            // one full interval after start, like a UI timer would
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match Self::refresh_shared(&shared).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        warn!("poll failed for session {}: {}", shared.session_id, err);
                        shared.bus.error(ErrorScope::Session, err.to_string());
                    }
                }
            }
        });
    }

    pub fn stop_refresh(&self) {
        self.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// One poll cycle. `Ok(false)` means the session is terminal (closed, or
    /// vanished server-side, which counts as an implicit close).
    pub async fn refresh_once(&self) -> Result<bool> {
        Self::refresh_shared(&self.shared).await
    }

    async fn refresh_shared(shared: &WidgetShared) -> Result<bool> {
        let stamp = shared.slot.begin();
        match shared.api.fetch_session(&shared.session_id).await {
            Ok(session) => {
                let changed = shared.slot.apply_if_newer(stamp, session);
                if shared.slot.is_closed() {
                    if changed {
                        shared.bus.publish(Event::SessionClosed {
                            session_id: shared.session_id.clone(),
                        });
                    }
                    Ok(false)
                } else {
                    if changed {
                        shared.bus.publish(Event::SessionUpdated {
                            session_id: shared.session_id.clone(),
                        });
                    }
                    Ok(true)
                }
            }
            Err(err) if err.is_not_found() => {
                // Gone from the server's books: treat as closed, not as an error
                shared.slot.mark_closed(stamp);
                shared.bus.publish(Event::SessionClosed {
                    session_id: shared.session_id.clone(),
                });
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Explicit close: tell the server, pin local state to `closed`, stop
    /// the timer.
    pub async fn close(&self) -> Result<()> {
        self.shared.api.end_session(&self.shared.session_id).await?;
        let stamp = self.shared.slot.begin();
        self.shared.slot.mark_closed(stamp);
        self.poller.stop();
        self.shared.bus.publish(Event::SessionClosed {
            session_id: self.shared.session_id.clone(),
        });
        Ok(())
    }
}
