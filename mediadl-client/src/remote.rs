//! The messaging client this crate drives, and the records it hands back.
//!
//! mediadl does not speak the wire protocol itself. Anything implementing
//! [`MessagingClient`] (an MTProto client, a test double) can be plugged into
//! [`crate::AuthController`] and [`crate::DownloadOrchestrator`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mediadl_session::SessionToken;

use crate::errors::RemoteError;

// ─── Handles ──────────────────────────────────────────────────────────────────

/// Opaque reference to a resolved chat, as returned by
/// [`MessagingClient::resolve_entity`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle(pub String);

/// Opaque reference to the media of one message, enough for the client to
/// locate and download it later.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub String);

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Raw records ──────────────────────────────────────────────────────────────

/// A message as listed by [`MessagingClient::fetch_messages`].
#[derive(Clone, Debug)]
pub struct RawMessage {
    /// Message ID, unique within the chat.
    pub id:    i32,
    /// Unix timestamp (seconds).
    pub date:  i64,
    pub media: Option<RawMedia>,
}

/// The attachment of a message.
///
/// The remote side may set several markers at once (a video is also a
/// document); classification picks the most specific one.
#[derive(Clone, Debug)]
pub struct RawMedia {
    pub handle:    MediaHandle,
    pub photo:     bool,
    pub video:     bool,
    pub document:  Option<RawDocument>,
    /// Size reported on the media itself, when the remote side sends one.
    pub size:      Option<u64>,
    /// MIME type reported on the media itself (non-document media).
    pub mime_type: Option<String>,
}

impl RawMedia {
    /// Media with no kind markers set.
    pub fn new(handle: MediaHandle) -> Self {
        Self { handle, photo: false, video: false, document: None, size: None, mime_type: None }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RawDocument {
    pub mime_type:  Option<String>,
    pub size:       Option<u64>,
    pub attributes: Vec<DocumentAttribute>,
}

impl RawDocument {
    /// The declared file name, if the sender attached one.
    pub fn file_name(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            DocumentAttribute::Filename(name) if !name.is_empty() => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Document attributes mediadl cares about; anything else maps to `Other`.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentAttribute {
    Filename(String),
    Video { duration_secs: f64, width: u32, height: u32 },
    Audio { duration_secs: u32, voice: bool },
    Other,
}

// ─── Connect parameters ───────────────────────────────────────────────────────

/// What [`MessagingClient::connect`] needs to open the transport.
#[derive(Clone, Debug)]
pub struct ConnectParams {
    pub api_id:   String,
    pub api_hash: String,
    /// Previously persisted session, used to skip the code challenge.
    pub session:  Option<SessionToken>,
}

// ─── Traits ───────────────────────────────────────────────────────────────────

/// Asks the user for the one-time verification code.
#[async_trait]
pub trait CodePrompt: Send + Sync {
    /// Suspends until the user submits a code. `None` means the login attempt
    /// was abandoned and the client should give up.
    async fn request_code(&self) -> Option<String>;
}

/// The operations mediadl needs from a messaging-platform client.
///
/// Implementations own the connection; all methods take `&self` so one client
/// can be shared between the auth controller and the orchestrator.
#[async_trait]
pub trait MessagingClient: Send + Sync + 'static {
    /// Open the transport, resuming `params.session` when given.
    async fn connect(&self, params: &ConnectParams) -> Result<(), RemoteError>;

    /// Run the login exchange for `phone`.
    ///
    /// Calls `prompt` whenever the remote side asks for a verification code.
    /// Returns `Ok(())` once the session is authorised, which may happen
    /// without prompting if the resumed session was already logged in.
    async fn begin_login(&self, phone: &str, prompt: &dyn CodePrompt) -> Result<(), RemoteError>;

    /// Serialize the current session so it can be persisted.
    fn export_session(&self) -> Result<SessionToken, RemoteError>;

    /// Resolve a chat ID or `@username` into a handle.
    async fn resolve_entity(&self, chat: &str) -> Result<EntityHandle, RemoteError>;

    /// The most recent `limit` messages of a chat, in the order the remote
    /// side returns them.
    async fn fetch_messages(
        &self,
        chat:  &EntityHandle,
        limit: usize,
    ) -> Result<Vec<RawMessage>, RemoteError>;

    /// A URL the media can be fetched from directly, if the remote side can
    /// provide one.
    async fn resolve_direct_url(&self, media: &MediaHandle) -> Result<Option<String>, RemoteError>;

    /// Download the media through the client, reporting `(received, total)`
    /// bytes as chunks arrive.
    async fn stream_download(
        &self,
        media:    &MediaHandle,
        progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<Vec<u8>, RemoteError>;

    /// Close the transport.
    async fn disconnect(&self) -> Result<(), RemoteError>;
}

/// Shared handle to a client.
pub type SharedClient = Arc<dyn MessagingClient>;
