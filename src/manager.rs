use crate::api::ApiClient;
use crate::bus::{ErrorScope, Event, EventBus};
use crate::channel::MessageChannel;
use crate::chat::{ChatSession, SessionStatus};
use crate::error::Result;
use crate::session::{Poller, SessionSlot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Poll cadence for the admin's active-session list.
pub const DASHBOARD_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Status facet of the dashboard filter. Closed sessions never appear in the
/// active list, so there is no `Closed` arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Waiting,
    Active,
    Initialized,
}

impl StatusFilter {
    pub fn matches(&self, status: SessionStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Waiting => status == SessionStatus::Waiting,
            StatusFilter::Active => status == SessionStatus::Active,
            StatusFilter::Initialized => status == SessionStatus::Initialized,
        }
    }
}

/// The admin's current focus: one session's live detail plus the channel for
/// replying into it. Selection starts no timer of its own; the list poll
/// keeps the detail fresh.
pub struct AdminSelection {
    session_id: String,
    slot: Arc<SessionSlot>,
    channel: MessageChannel,
}

impl AdminSelection {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session(&self) -> Option<ChatSession> {
        self.slot.snapshot()
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }
}

struct DashboardState {
    sessions: Vec<ChatSession>,
    selected: Option<Arc<AdminSelection>>,
    last_applied: u64,
    query: String,
    status_filter: StatusFilter,
}

struct DashboardShared {
    api: Arc<ApiClient>,
    bus: Arc<EventBus>,
    state: Mutex<DashboardState>,
    seq: AtomicU64,
}

/// Multi-session aggregator for the support dashboard: polls the active list,
/// preserves the admin's selection across refreshes, and computes the
/// filtered view synchronously.
pub struct Dashboard {
    shared: Arc<DashboardShared>,
    poller: Poller,
}

impl Dashboard {
    pub fn new(api: Arc<ApiClient>, bus: Arc<EventBus>) -> Self {
        Self {
            shared: Arc::new(DashboardShared {
                api,
                bus,
                state: Mutex::new(DashboardState {
                    sessions: Vec::new(),
                    selected: None,
                    last_applied: 0,
                    query: String::new(),
                    status_filter: StatusFilter::All,
                }),
                seq: AtomicU64::new(0),
            }),
            poller: Poller::new(),
        }
    }

    pub fn start_refresh(&self) {
        self.start_refresh_every(DASHBOARD_REFRESH_INTERVAL);
    }

    /// Begin the list poll. A failed cycle is reported on the bus and the
    /// timer keeps running.
    pub fn start_refresh_every(&self, every: Duration) {
        let shared = self.shared.clone();
        self.poller.start(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = Self::refresh_shared(&shared).await {
                    warn!("active-session poll failed: {}", err);
                    shared.bus.error(ErrorScope::SessionList, err.to_string());
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

    pub async fn refresh_once(&self) -> Result<()> {
        Self::refresh_shared(&self.shared).await
    }

    async fn refresh_shared(shared: &DashboardShared) -> Result<()> {
        let stamp = shared.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // Stamp the selection's slot before the request goes out, so a reply
        // that lands while this list call is in flight cannot be clobbered
        // by it.
        let selection = {
            let state = shared.state.lock().unwrap();
            state
                .selected
                .as_ref()
                .map(|sel| (sel.clone(), sel.slot.begin()))
        };
        let sessions = shared.api.list_active_sessions().await?;
        Self::apply_list(shared, stamp, selection, sessions);
        Ok(())
    }

    fn apply_list(
        shared: &DashboardShared,
        stamp: u64,
        selection: Option<(Arc<AdminSelection>, u64)>,
        sessions: Vec<ChatSession>,
    ) {
        let count = sessions.len();
        let mut updated = None;
        let mut cleared = None;
        {
            let mut state = shared.state.lock().unwrap();
            if stamp <= state.last_applied {
                return;
            }
            state.last_applied = stamp;

            if let Some(current) = state.selected.clone() {
                match sessions.iter().find(|s| s.id == current.session_id) {
                    Some(fresh) => {
                        // Update the detail in place, and only when the
                        // content actually differs and the selection did not
                        // change while the request was in flight.
                        if let Some((issued_for, detail_stamp)) = &selection {
                            if Arc::ptr_eq(issued_for, &current)
                                && current.slot.apply_if_newer(*detail_stamp, fresh.clone())
                            {
                                updated = Some(current.session_id.clone());
                            }
                        }
                    }
                    None => {
                        // Vanished server-side: implicit close, not an error
                        cleared = Some(current.session_id.clone());
                        current.slot.mark_closed(current.slot.begin());
                        state.selected = None;
                    }
                }
            }
            state.sessions = sessions;
        }

        shared.bus.publish(Event::SessionListUpdated { count });
        if let Some(session_id) = updated {
            shared.bus.publish(Event::SessionUpdated { session_id });
        }
        if let Some(session_id) = cleared {
            shared.bus.publish(Event::SelectionCleared { session_id });
        }
    }

    /// Focus a session. Selecting the already-selected id returns the same
    /// handle and changes nothing; otherwise a fresh selection (slot +
    /// message channel) is built from the current list entry. Returns `None`
    /// when the id is not in the list.
    pub fn select(&self, session_id: &str) -> Option<Arc<AdminSelection>> {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(sel) = &state.selected {
            if sel.session_id == session_id {
                return Some(sel.clone());
            }
        }
        let session = state.sessions.iter().find(|s| s.id == session_id)?.clone();
        let slot = Arc::new(SessionSlot::with_session(session));
        let channel = MessageChannel::new(
            self.shared.api.clone(),
            session_id.to_string(),
            slot.clone(),
            self.shared.bus.clone(),
        );
        let selection = Arc::new(AdminSelection {
            session_id: session_id.to_string(),
            slot,
            channel,
        });
        state.selected = Some(selection.clone());
        Some(selection)
    }

    pub fn deselect(&self) {
        self.shared.state.lock().unwrap().selected = None;
    }

    pub fn selected(&self) -> Option<Arc<AdminSelection>> {
        self.shared.state.lock().unwrap().selected.clone()
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.shared.state.lock().unwrap().sessions.clone()
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.shared.state.lock().unwrap().query = query.into();
    }

    pub fn set_status_filter(&self, filter: StatusFilter) {
        self.shared.state.lock().unwrap().status_filter = filter;
    }

    /// Pure view computation over the in-memory list; never touches the
    /// network.
    pub fn filtered_sessions(&self) -> Vec<ChatSession> {
        let state = self.shared.state.lock().unwrap();
        state
            .sessions
            .iter()
            .filter(|s| {
                state.status_filter.matches(s.status) && s.participant.matches_query(&state.query)
            })
            .cloned()
            .collect()
    }

    /// End a session from the list. This removes the row and, when it was
    /// the selected one, clears the selection. It never selects anything:
    /// ending and selecting are independent operations.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        self.shared.api.end_session(session_id).await?;
        let cleared = {
            let mut state = self.shared.state.lock().unwrap();
            // Invalidate list responses issued before the end completed, so
            // a slow in-flight poll cannot resurrect the removed row
            state.last_applied = self.shared.seq.fetch_add(1, Ordering::SeqCst) + 1;
            state.sessions.retain(|s| s.id != session_id);
            match &state.selected {
                Some(sel) if sel.session_id == session_id => {
                    sel.slot.mark_closed(sel.slot.begin());
                    state.selected = None;
                    true
                }
                _ => false,
            }
        };
        self.shared.bus.publish(Event::SessionClosed {
            session_id: session_id.to_string(),
        });
        if cleared {
            self.shared.bus.publish(Event::SelectionCleared {
                session_id: session_id.to_string(),
            });
        }
        Ok(())
    }
}
