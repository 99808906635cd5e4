//! Error types for mediadl-client.
//!
//! [`RemoteError`] is what the messaging client reports; [`Error`] is what the
//! controller and orchestrator surface to the UI layer. Every variant renders
//! as a status line fit to show the user.

use std::{fmt, io};

use crate::download::StrategyKind;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// A request the remote side answered with an error.
///
/// A trailing number in the error message is split off into `value`:
/// `"FLOOD_WAIT_30"` parses as name `FLOOD_WAIT`, value `30`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    pub code:  i32,
    pub name:  String,
    pub value: Option<u32>,
}

impl RpcError {
    pub fn parse(code: i32, message: &str) -> Self {
        let split = message
            .rsplit_once('_')
            .filter(|(_, tail)| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|(name, tail)| Some((name, tail.parse::<u32>().ok()?)));
        match split {
            Some((name, value)) => Self { code, name: name.to_string(), value: Some(value) },
            None                => Self { code, name: message.to_string(), value: None },
        }
    }

    /// Compare the name against `pattern`. A leading or trailing `*` matches
    /// any suffix or prefix: `PHONE_CODE_*`, `*_INVALID`.
    pub fn is(&self, pattern: &str) -> bool {
        match (pattern.strip_suffix('*'), pattern.strip_prefix('*')) {
            (Some(head), _) => self.name.starts_with(head),
            (None, Some(tail)) => self.name.ends_with(tail),
            (None, None) => self.name == pattern,
        }
    }

    /// Seconds to wait, for `420 FLOOD_WAIT_n`.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        (self.code == 420 && self.name == "FLOOD_WAIT")
            .then_some(self.value)
            .flatten()
            .map(u64::from)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{} {}_{v}", self.code, self.name),
            None    => write!(f, "{} {}", self.code, self.name),
        }
    }
}

impl std::error::Error for RpcError {}

// ─── RemoteError ──────────────────────────────────────────────────────────────

/// Failure reported by a [`crate::MessagingClient`] call.
#[derive(Debug)]
pub enum RemoteError {
    /// The remote side rejected the request.
    Rpc(RpcError),
    /// Network / I/O failure.
    Io(io::Error),
    /// The client cannot perform this request for this kind of media or peer.
    Unsupported(String),
    /// The request was dropped (connection closed, login abandoned).
    Dropped,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)         => write!(f, "{e}"),
            Self::Io(e)          => write!(f, "I/O error: {e}"),
            Self::Unsupported(s) => write!(f, "unsupported: {s}"),
            Self::Dropped        => write!(f, "request dropped"),
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(e) => Some(e),
            Self::Io(e)  => Some(e),
            _            => None,
        }
    }
}

impl From<io::Error> for RemoteError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<RpcError> for RemoteError {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

impl RemoteError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    /// If this is a FLOOD_WAIT error, returns how many seconds to wait.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _            => None,
        }
    }

    /// Failures that may go away on their own (network hiccups, dropped links).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Dropped)
    }
}

// ─── FormatError ──────────────────────────────────────────────────────────────

/// Input rejected before any network activity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatError {
    /// The API identifier is empty or not all digits.
    Identifier,
    /// The API secret is not 32 hexadecimal characters.
    Secret,
    /// The phone number is not `+` followed by 10–15 digits.
    Phone,
    /// No chat identifier or username was given.
    EmptyChat,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier => write!(f, "API ID must be numeric"),
            Self::Secret     => write!(f, "invalid API hash format (32 hexadecimal characters)"),
            Self::Phone      => write!(f, "invalid phone number format, use +1234567890"),
            Self::EmptyChat  => write!(f, "enter a chat ID or @username"),
        }
    }
}

impl std::error::Error for FormatError {}

// ─── CodeStateError ───────────────────────────────────────────────────────────

/// Why a verification code could not be submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeStateError {
    /// The submitted code was empty after trimming.
    EmptyCode,
    /// No verification code has been requested (or it was already used).
    NoPendingChallenge,
}

impl fmt::Display for CodeStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCode          => write!(f, "please enter the verification code"),
            Self::NoPendingChallenge => write!(f, "no code was requested, try connecting again"),
        }
    }
}

impl std::error::Error for CodeStateError {}

// ─── Error ────────────────────────────────────────────────────────────────────

/// The error type surfaced by [`crate::AuthController`] and
/// [`crate::DownloadOrchestrator`].
#[derive(Debug)]
pub enum Error {
    /// Bad credential or input shape; nothing was sent.
    Format(FormatError),
    /// The transport could not be established or broke mid-attempt.
    Connection(RemoteError),
    /// The remote side rejected the code or the credentials.
    Auth(RemoteError),
    /// A code was submitted while none was pending, or the code was empty.
    InvalidCodeState(CodeStateError),
    /// `connect` was called while another login attempt is still running.
    AlreadyInProgress,
    /// Fetching media requires an authenticated session.
    NotAuthenticated,
    /// Entity resolution or message listing failed.
    Fetch { chat: String, source: RemoteError },
    /// A batch download was requested with nothing selected.
    NothingSelected,
    /// Every transfer strategy failed for one item.
    Download { filename: String, attempts: Vec<(StrategyKind, StrategyError)> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e)           => write!(f, "{e}"),
            Self::Connection(e)       => write!(f, "connection error: {e}"),
            Self::Auth(e)             => write!(f, "authentication error: {e}"),
            Self::InvalidCodeState(e) => write!(f, "verification failed: {e}"),
            Self::AlreadyInProgress   => write!(f, "a login attempt is already in progress"),
            Self::NotAuthenticated    => write!(f, "not connected, log in first"),
            Self::Fetch { chat, source } => write!(f, "fetch error for {chat}: {source}"),
            Self::NothingSelected     => write!(f, "please select files to download"),
            Self::Download { filename, attempts } => {
                write!(f, "download of {filename} failed")?;
                for (i, (kind, err)) in attempts.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{kind}: {err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(e)           => Some(e),
            Self::Connection(e)       => Some(e),
            Self::Auth(e)             => Some(e),
            Self::InvalidCodeState(e) => Some(e),
            Self::Fetch { source, .. } => Some(source),
            _                         => None,
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self { Self::Format(e) }
}

impl From<CodeStateError> for Error {
    fn from(e: CodeStateError) -> Self { Self::InvalidCodeState(e) }
}

impl Error {
    /// Errors the user fixes by re-entering input; no state was touched.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Format(_) | Self::InvalidCodeState(_) | Self::NothingSelected)
    }
}

// ─── StrategyError ────────────────────────────────────────────────────────────

/// Why a single transfer strategy gave up on an item.
#[derive(Debug)]
pub enum StrategyError {
    /// The strategy does not apply (e.g. no direct URL for this media).
    Unavailable(String),
    /// The messaging client failed.
    Remote(RemoteError),
    /// Saving the file failed.
    Save(io::Error),
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(why) => write!(f, "unavailable ({why})"),
            Self::Remote(e)        => write!(f, "{e}"),
            Self::Save(e)          => write!(f, "save failed: {e}"),
        }
    }
}

impl std::error::Error for StrategyError {}

impl From<RemoteError> for StrategyError {
    fn from(e: RemoteError) -> Self { Self::Remote(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_splits_numeric_suffix() {
        let e = RpcError::parse(420, "FLOOD_WAIT_30");
        assert_eq!((e.name.as_str(), e.value), ("FLOOD_WAIT", Some(30)));
        assert_eq!(e.flood_wait_seconds(), Some(30));
        assert_eq!(e.to_string(), "420 FLOOD_WAIT_30");

        let e = RpcError::parse(400, "PHONE_CODE_INVALID");
        assert_eq!((e.name.as_str(), e.value), ("PHONE_CODE_INVALID", None));
        assert_eq!(e.flood_wait_seconds(), None);

        let e = RpcError::parse(400, "FILE_PART_+5");
        assert_eq!(e.value, None);
    }

    #[test]
    fn rpc_error_wildcards() {
        let e = RpcError::parse(400, "PHONE_CODE_EXPIRED");
        assert!(e.is("PHONE_CODE_EXPIRED"));
        assert!(e.is("PHONE_CODE_*"));
        assert!(e.is("*_EXPIRED"));
        assert!(!e.is("PHONE_CODE"));
        assert!(!e.is("*_INVALID"));
    }

    #[test]
    fn download_error_lists_every_attempt() {
        let err = Error::Download {
            filename: "a.jpg".into(),
            attempts: vec![
                (StrategyKind::DirectUrl, StrategyError::Unavailable("no direct URL".into())),
                (StrategyKind::Buffered, StrategyError::Remote(RemoteError::Dropped)),
            ],
        };
        assert_eq!(
            err.to_string(),
            "download of a.jpg failed: direct-url: unavailable (no direct URL); buffered: request dropped"
        );
    }
}
