//! Scripted stand-ins for the messaging client and the file sink.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mediadl_client::{
    CodePrompt, ConnectParams, DocumentAttribute, EntityHandle, FileSink, MediaHandle,
    MessagingClient, RawDocument, RawMedia, RawMessage, RemoteError, RpcError, SessionToken,
};
use tokio::sync::oneshot;

pub const API_ID:   &str = "123456";
pub const API_HASH: &str = "0123456789abcdef0123456789abcdef";
pub const PHONE:    &str = "+15551234567";

pub fn rpc(code: i32, name: &str) -> RemoteError {
    RemoteError::Rpc(RpcError::parse(code, name))
}

// ── FakeClient ────────────────────────────────────────────────────────────────

/// How `begin_login` behaves.
#[derive(Clone, Debug)]
pub enum LoginScript {
    /// Ask for a code once; succeed if it matches, reject otherwise.
    Code { expected: String },
    /// The resumed session is already signed in.
    AlreadyAuthorized,
    /// Fail before asking for a code.
    Reject { code: i32, name: String },
    /// Ask for a code, but lose the connection once `link_loss` fires.
    DropWhileWaiting,
}

/// Per-media behaviour of the download calls.
#[derive(Clone, Debug, Default)]
pub struct MediaScript {
    /// `None`: no direct URL for this media.
    pub url:   Option<String>,
    /// `None`: the buffered transfer fails.
    pub bytes: Option<Vec<u8>>,
}

pub struct FakeClient {
    pub calls:           Mutex<Vec<String>>,
    pub prompts:         AtomicUsize,
    /// Remaining `connect` calls that fail with a transient error.
    pub connect_failures: AtomicU32,
    pub login:           Mutex<LoginScript>,
    pub last_params:     Mutex<Option<ConnectParams>>,
    pub session:         SessionToken,
    pub messages:        Mutex<Vec<RawMessage>>,
    pub media:           Mutex<HashMap<String, MediaScript>>,
    /// When set, `stream_download` reports 25% and waits here before finishing.
    pub stream_gate:     Mutex<Option<oneshot::Receiver<()>>>,
    /// When set, `connect` waits here before succeeding.
    pub connect_gate:    Mutex<Option<oneshot::Receiver<()>>>,
    /// Fired to break a `DropWhileWaiting` login.
    pub link_loss:       Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeClient {
    pub fn new(login: LoginScript) -> Arc<Self> {
        Arc::new(Self {
            calls:            Mutex::new(Vec::new()),
            prompts:          AtomicUsize::new(0),
            connect_failures: AtomicU32::new(0),
            login:            Mutex::new(login),
            last_params:      Mutex::new(None),
            session:          SessionToken::new("1BQANOTEuMTA4LjU2LjE2OQG7"),
            messages:         Mutex::new(Vec::new()),
            media:            Mutex::new(HashMap::new()),
            stream_gate:      Mutex::new(None),
            connect_gate:     Mutex::new(None),
            link_loss:        Mutex::new(None),
        })
    }

    pub fn with_code(expected: &str) -> Arc<Self> {
        Self::new(LoginScript::Code { expected: expected.to_string() })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.starts_with(call)).count()
    }

    pub fn set_messages(&self, messages: Vec<RawMessage>) {
        *self.messages.lock().unwrap() = messages;
    }

    pub fn script_media(&self, handle: &str, script: MediaScript) {
        self.media.lock().unwrap().insert(handle.to_string(), script);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    async fn connect(&self, params: &ConnectParams) -> Result<(), RemoteError> {
        self.record("connect");
        *self.last_params.lock().unwrap() = Some(params.clone());
        let gate = self.connect_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let left = self.connect_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.connect_failures.store(left - 1, Ordering::SeqCst);
            return Err(RemoteError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));
        }
        Ok(())
    }

    async fn begin_login(&self, phone: &str, prompt: &dyn CodePrompt) -> Result<(), RemoteError> {
        self.record(format!("begin_login {phone}"));
        let script = self.login.lock().unwrap().clone();
        match script {
            LoginScript::AlreadyAuthorized => Ok(()),
            LoginScript::Reject { code, name } => Err(rpc(code, &name)),
            LoginScript::Code { expected } => {
                self.prompts.fetch_add(1, Ordering::SeqCst);
                match prompt.request_code().await {
                    Some(code) if code == expected => Ok(()),
                    Some(_) => Err(rpc(400, "PHONE_CODE_INVALID")),
                    None    => Err(RemoteError::Dropped),
                }
            }
            LoginScript::DropWhileWaiting => {
                self.prompts.fetch_add(1, Ordering::SeqCst);
                let lost = self.link_loss.lock().unwrap().take();
                tokio::select! {
                    _ = prompt.request_code() => Ok(()),
                    _ = async {
                        match lost {
                            Some(lost) => { let _ = lost.await; }
                            None       => std::future::pending::<()>().await,
                        }
                    } => {
                        Err(RemoteError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
                    }
                }
            }
        }
    }

    fn export_session(&self) -> Result<SessionToken, RemoteError> {
        Ok(self.session.clone())
    }

    async fn resolve_entity(&self, chat: &str) -> Result<EntityHandle, RemoteError> {
        self.record(format!("resolve_entity {chat}"));
        if chat == "@missing" {
            return Err(rpc(400, "USERNAME_NOT_OCCUPIED"));
        }
        Ok(EntityHandle(chat.trim_start_matches('@').to_string()))
    }

    async fn fetch_messages(
        &self,
        chat:  &EntityHandle,
        limit: usize,
    ) -> Result<Vec<RawMessage>, RemoteError> {
        self.record(format!("fetch_messages {chat} {limit}"));
        Ok(self.messages.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn resolve_direct_url(&self, media: &MediaHandle) -> Result<Option<String>, RemoteError> {
        self.record(format!("resolve_direct_url {media}"));
        let script = self.media.lock().unwrap().get(&media.0).cloned();
        match script {
            Some(s) => Ok(s.url),
            None    => Err(rpc(400, "MEDIA_INVALID")),
        }
    }

    async fn stream_download(
        &self,
        media:    &MediaHandle,
        progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<Vec<u8>, RemoteError> {
        self.record(format!("stream_download {media}"));
        let script = self.media.lock().unwrap().get(&media.0).cloned();
        let Some(bytes) = script.and_then(|s| s.bytes) else {
            return Err(rpc(400, "FILE_REFERENCE_EXPIRED"));
        };
        let total = bytes.len() as u64;
        progress(total / 4, total);
        let gate = self.stream_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        progress(total, total);
        Ok(bytes)
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        self.record("disconnect");
        Ok(())
    }
}

// ── FakeSink ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Saved {
    Url { url: String, filename: String },
    Bytes { filename: String, len: usize },
}

#[derive(Default)]
pub struct FakeSink {
    pub saved: Mutex<Vec<Saved>>,
}

impl FakeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn saved(&self) -> Vec<Saved> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSink for FakeSink {
    async fn save_url(&self, url: &str, filename: &str) -> io::Result<PathBuf> {
        self.saved.lock().unwrap().push(Saved::Url {
            url:      url.to_string(),
            filename: filename.to_string(),
        });
        Ok(PathBuf::from(filename))
    }

    async fn save_bytes(&self, filename: &str, bytes: Vec<u8>) -> io::Result<PathBuf> {
        self.saved.lock().unwrap().push(Saved::Bytes {
            filename: filename.to_string(),
            len:      bytes.len(),
        });
        Ok(PathBuf::from(filename))
    }
}

// ── Message builders ──────────────────────────────────────────────────────────

pub fn handle(id: i32) -> MediaHandle {
    MediaHandle(format!("m{id}"))
}

pub fn photo_message(id: i32) -> RawMessage {
    let mut media = RawMedia::new(handle(id));
    media.photo = true;
    media.size  = Some(2048);
    RawMessage { id, date: 1_700_000_000 + i64::from(id), media: Some(media) }
}

pub fn document_message(id: i32, filename: Option<&str>, size: Option<u64>) -> RawMessage {
    let attributes = filename
        .map(|f| vec![DocumentAttribute::Filename(f.to_string())])
        .unwrap_or_default();
    let mut media = RawMedia::new(handle(id));
    media.document = Some(RawDocument {
        mime_type: Some("application/pdf".into()),
        size,
        attributes,
    });
    RawMessage { id, date: 1_700_000_000 + i64::from(id), media: Some(media) }
}

pub fn text_message(id: i32) -> RawMessage {
    RawMessage { id, date: 1_700_000_000 + i64::from(id), media: None }
}
