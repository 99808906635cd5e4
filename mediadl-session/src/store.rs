//! Pluggable session storage.
//!
//! The [`SessionStore`] trait abstracts over where the token lives so the auth
//! controller can be handed a file, a database row or plain memory.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::SessionToken;

// ─── Trait ────────────────────────────────────────────────────────────────────

/// Where and how the session token is persisted.
pub trait SessionStore: Send + Sync {
    /// Read the persisted token, or `None` on first run.
    fn load(&self) -> io::Result<Option<SessionToken>>;

    /// Replace the persisted token. Readers never observe a partial write.
    fn save(&self, token: &SessionToken) -> io::Result<()>;

    /// Forget the token. Clearing an empty store is not an error.
    fn clear(&self) -> io::Result<()>;

    /// Human-readable name of this backend (for log messages).
    fn name(&self) -> &str;
}

// ─── FileSessionStore ─────────────────────────────────────────────────────────

/// Stores the token as the whole content of a single file.
///
/// Saves go through a sibling `*.tmp` file that is synced and then renamed over
/// the target, so a crash mid-save leaves either the old or the new token.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> io::Result<Option<SessionToken>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let token = SessionToken::new(raw);
        Ok(if token.is_empty() { None } else { Some(token) })
    }

    fn save(&self, token: &SessionToken) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(token.as_str().as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        tracing::debug!("[mediadl] Session written to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str { "file" }
}

// ─── InMemorySessionStore ─────────────────────────────────────────────────────

/// A store that keeps the token only for the lifetime of the process.
#[derive(Default)]
pub struct InMemorySessionStore {
    token: Mutex<Option<SessionToken>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already persisted, as if a previous run saved it.
    pub fn with_token(token: SessionToken) -> Self {
        Self { token: Mutex::new(Some(token)) }
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> io::Result<Option<SessionToken>> {
        let lock = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lock.clone().filter(|t| !t.is_empty()))
    }

    fn save(&self, token: &SessionToken) -> io::Result<()> {
        let mut lock = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        *lock = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        let mut lock = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        *lock = None;
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

// ─── SqliteSessionStore ───────────────────────────────────────────────────────

#[cfg(feature = "sqlite-session")]
pub use sqlite_store::SqliteSessionStore;

#[cfg(feature = "sqlite-session")]
mod sqlite_store {
    use super::*;
    use rusqlite::{Connection, OptionalExtension, params};

    use crate::SESSION_KEY;

    fn to_io(e: rusqlite::Error) -> io::Error {
        io::Error::other(e)
    }

    /// SQLite-backed store: one row of a `kv` table, keyed by [`SESSION_KEY`].
    ///
    /// Enable with the `sqlite-session` Cargo feature.
    pub struct SqliteSessionStore {
        path: PathBuf,
    }

    impl SqliteSessionStore {
        pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
            let path = path.into();
            // Create the schema now so a bad path fails at construction.
            let conn = Connection::open(&path).map_err(to_io)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            ).map_err(to_io)?;
            Ok(Self { path })
        }

        fn open(&self) -> io::Result<Connection> {
            Connection::open(&self.path).map_err(to_io)
        }
    }

    impl SessionStore for SqliteSessionStore {
        fn load(&self) -> io::Result<Option<SessionToken>> {
            let conn = self.open()?;
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![SESSION_KEY],
                    |row| row.get(0),
                )
                .optional()
                .map_err(to_io)?;
            Ok(value.map(SessionToken::new).filter(|t| !t.is_empty()))
        }

        fn save(&self, token: &SessionToken) -> io::Result<()> {
            let conn = self.open()?;
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![SESSION_KEY, token.as_str()],
            ).map_err(to_io)?;
            Ok(())
        }

        fn clear(&self) -> io::Result<()> {
            let conn = self.open()?;
            conn.execute("DELETE FROM kv WHERE key = ?1", params![SESSION_KEY])
                .map_err(to_io)?;
            Ok(())
        }

        fn name(&self) -> &str { "sqlite" }
    }
}
