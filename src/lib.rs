//! Client-side engine for the live chat support system: session lifecycle,
//! message exchange and the admin multi-session dashboard, over a REST
//! collaborator API.

pub mod api;
pub mod bus;
pub mod channel;
pub mod chat;
pub mod entity;
pub mod error;
pub mod manager;
pub mod session;

pub use api::ApiClient;
pub use bus::{ErrorScope, Event, EventBus};
pub use channel::{MessageChannel, MessageDraft};
pub use chat::{
    Attachment, AttachmentUpload, ChatSession, Message, SessionStatus, MAX_ATTACHMENT_BYTES,
};
pub use entity::{Participant, Role, Sender};
pub use error::{ChatError, Result};
pub use manager::{AdminSelection, Dashboard, StatusFilter, DASHBOARD_REFRESH_INTERVAL};
pub use session::{ChatWidget, Poller, SessionSlot, WIDGET_REFRESH_INTERVAL};
