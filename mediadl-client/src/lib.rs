//! # mediadl-client
//!
//! Log into a Telegram account, list the media of a chat and save the
//! selected files locally.
//!
//! ## Features
//! - Challenge/response login with the verification code supplied from outside
//!   (a UI form, a terminal prompt, a test)
//! - Session resumption: the token is persisted after login and reused
//! - Credential format checks before anything touches the network
//! - Media catalog with photo / video / document classification and derived
//!   file names
//! - Downloads through a strategy chain (direct URL, then buffered transfer
//!   with byte progress)
//! - Sequential batch downloads with a configurable pause between items
//! - `FLOOD_WAIT` and transient I/O auto-retry with configurable policy
//!
//! The wire protocol is not part of this crate: plug any
//! [`MessagingClient`] implementation into [`AuthController`] and
//! [`DownloadOrchestrator`].

#![deny(unsafe_code)]

mod auth;
mod errors;
mod retry;
pub mod catalog;
pub mod config;
pub mod download;
pub mod library;
pub mod remote;
pub mod sink;
pub mod validate;

pub use auth::{AuthController, AuthPhase};
pub use catalog::{MediaId, MediaItem, MediaKind, build_catalog, human_size};
pub use config::{Config, ConfigError};
pub use download::{
    BatchReport, DownloadOrchestrator, DownloadProgress, Downloaded, ItemOutcome, StrategyKind,
    TransferStrategy,
};
pub use errors::{CodeStateError, Error, FormatError, RemoteError, RpcError, StrategyError};
pub use library::{MediaLibrary, SelectionSet};
pub use remote::{
    CodePrompt, ConnectParams, DocumentAttribute, EntityHandle, MediaHandle, MessagingClient,
    RawDocument, RawMedia, RawMessage, SharedClient,
};
pub use retry::{AutoSleep, NoRetries, RetryContext, RetryPolicy};
pub use sink::{DirectorySink, FileSink};
pub use validate::Credentials;

pub use mediadl_session::{SessionStore, SessionToken};
