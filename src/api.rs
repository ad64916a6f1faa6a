use crate::channel::MessageDraft;
use crate::chat::ChatSession;
use crate::error::{ChatError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error payload the collaborator sends alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Typed client for the chat collaborator API. One reqwest client, bearer
/// auth on every request, bounded timeouts so a dead server never leaves a
/// send hanging forever.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Maps non-2xx responses to the error taxonomy: 401 is an auth problem,
    /// anything else carries the server's own message when the body has one.
    async fn expect_ok(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ChatError::Auth);
        }
        if !status.is_success() {
            let message = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request rejected")
                        .to_string()
                });
            return Err(ChatError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    /// POST /session: create a session for the authenticated user.
    pub async fn create_session(&self) -> Result<ChatSession> {
        debug!("creating chat session");
        let resp = self
            .http
            .post(self.url("/session"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::expect_ok(resp).await?.json().await?)
    }

    /// GET /session/{id}: current snapshot, status plus full message list.
    pub async fn fetch_session(&self, session_id: &str) -> Result<ChatSession> {
        let resp = self
            .http
            .get(self.url(&format!("/session/{}", session_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::expect_ok(resp).await?.json().await?)
    }

    /// GET /active-sessions: every non-closed session (admin only).
    pub async fn list_active_sessions(&self) -> Result<Vec<ChatSession>> {
        let resp = self
            .http
            .get(self.url("/active-sessions"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::expect_ok(resp).await?.json().await?)
    }

    /// POST /message/{sessionId}: multipart `content` + optional
    /// `attachment`; returns the updated session snapshot.
    pub async fn send_message(&self, session_id: &str, draft: &MessageDraft) -> Result<ChatSession> {
        let mut form = Form::new().text("content", draft.content.clone());
        if let Some(upload) = &draft.attachment {
            let part = Part::bytes(upload.bytes.clone())
                .file_name(upload.file_name.clone())
                .mime_str(&upload.media_type)
                .map_err(|e| ChatError::Transport(format!("invalid media type: {}", e)))?;
            form = form.part("attachment", part);
        }

        debug!("sending message to session {}", session_id);
        let resp = self
            .http
            .post(self.url(&format!("/message/{}", session_id)))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        Ok(Self::expect_ok(resp).await?.json().await?)
    }

    /// POST /session/{id}/end: close the session.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        debug!("ending session {}", session_id);
        let resp = self
            .http
            .post(self.url(&format!("/session/{}/end", session_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::expect_ok(resp).await?;
        Ok(())
    }
}
