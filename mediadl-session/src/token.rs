use std::fmt;

/// Serialized session produced by the messaging client.
///
/// Treated as an opaque credential: it can be compared and persisted, but its
/// `Debug` output never reveals the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// An empty token is what a fresh client exports before login; backends
    /// report it as "no session".
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken {{ len: {} }}", self.0.len())
    }
}

impl From<String> for SessionToken {
    fn from(raw: String) -> Self { Self(raw) }
}

impl From<&str> for SessionToken {
    fn from(raw: &str) -> Self { Self(raw.to_string()) }
}
