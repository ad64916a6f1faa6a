use thiserror::Error;

/// Errors produced at the boundary of every chat operation. Nothing in this
/// crate propagates past that boundary uncaught: callers either surface the
/// message inline or (for poll cycles) log it and keep the timer running.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The request never completed (connect failure, timeout, dropped
    /// connection). Recoverable by retry.
    #[error("request failed: {0}")]
    Transport(String),

    /// The bearer credential was rejected (401). Belongs to the auth
    /// collaborator, not to any single chat control.
    #[error("authentication expired or invalid")]
    Auth,

    /// The server answered with a non-2xx status. Carries the server's own
    /// message when the body provided one.
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A draft with no content and no attachment; never sent.
    #[error("message is empty")]
    EmptyMessage,

    /// Attachment over the ceiling; rejected before any network call.
    #[error("attachment is {size} bytes, over the 5 MiB limit")]
    AttachmentTooLarge { size: usize },

    /// A send is already in flight for this session.
    #[error("a message is already being sent")]
    SendInFlight,

    /// The session is closed and accepts no further messages.
    #[error("session is closed")]
    SessionClosed,
}

impl ChatError {
    /// True for the client-side guards that never issue a request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyMessage | Self::AttachmentTooLarge { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth)
    }

    /// True when the server said the resource is gone, which the session
    /// lifecycle treats as an implicit close rather than an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status: 404, .. })
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("timed out: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
