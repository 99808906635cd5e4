//! # mediadl-session
//!
//! Persistence for the one piece of state mediadl keeps across restarts: the
//! serialized session token handed out by the messaging client after a
//! successful login.
//!
//! The token is opaque. Nothing in this crate parses it; backends only store,
//! return and forget it.
//!
//! ## Backends
//! - [`FileSessionStore`]: a single file, replaced atomically on save (default).
//! - [`InMemorySessionStore`]: nothing touches the disk.
//! - [`SqliteSessionStore`]: a key/value table (requires `sqlite-session`).

#![deny(unsafe_code)]

mod store;
mod token;

pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
#[cfg(feature = "sqlite-session")]
pub use store::SqliteSessionStore;
pub use token::SessionToken;

/// Key under which the token is persisted by key/value backends.
pub const SESSION_KEY: &str = "telegramSession";
