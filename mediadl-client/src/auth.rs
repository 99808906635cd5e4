//! The login state machine.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──code requested──▶ AwaitingCode
//!  ▲                    │  ▲                            │
//!  │                    │  └────────submit_code─────────┘
//!  │                    ▼
//!  └──disconnect── Authenticated
//! ```
//!
//! Any failure of an attempt returns the controller to `Idle`. The login
//! exchange runs on its own task; `connect` and `submit_code` only wait until
//! it needs the user again or finishes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mediadl_session::SessionStore;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::catalog::fetch_catalog;
use crate::config::Config;
use crate::errors::{CodeStateError, Error, FormatError, RemoteError};
use crate::library::MediaLibrary;
use crate::remote::{CodePrompt, ConnectParams, SharedClient};
use crate::retry::{RetryPolicy, retrying};
use crate::validate::Credentials;

// ─── Public phase ─────────────────────────────────────────────────────────────

/// Where the controller is in the login flow, as shown to the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    Connecting,
    AwaitingCode,
    Authenticated,
}

// ─── PendingChallenge ─────────────────────────────────────────────────────────

/// The suspended half of a verification-code request.
///
/// Resolving consumes the challenge, so a code can be delivered at most once.
/// Dropping it unresolved tells the waiting login task the attempt is over.
struct PendingChallenge {
    resolver: oneshot::Sender<String>,
}

impl PendingChallenge {
    /// `false` when the login task stopped waiting in the meantime.
    fn resolve(self, code: String) -> bool {
        self.resolver.send(code).is_ok()
    }
}

// ─── Internal state ───────────────────────────────────────────────────────────

/// Every attempt gets its own number so a late result from an abandoned
/// attempt cannot touch the state of a newer one.
type AttemptId = u64;

enum AuthState {
    Idle,
    Connecting { attempt: AttemptId, verifying: bool },
    AwaitingCode { attempt: AttemptId, challenge: PendingChallenge },
    Authenticated { attempt: AttemptId },
}

impl AuthState {
    fn phase(&self) -> AuthPhase {
        match self {
            Self::Idle                 => AuthPhase::Idle,
            Self::Connecting { .. }    => AuthPhase::Connecting,
            Self::AwaitingCode { .. }  => AuthPhase::AwaitingCode,
            Self::Authenticated { .. } => AuthPhase::Authenticated,
        }
    }

    fn attempt(&self) -> Option<AttemptId> {
        match self {
            Self::Idle => None,
            Self::Connecting { attempt, .. }
            | Self::AwaitingCode { attempt, .. }
            | Self::Authenticated { attempt } => Some(*attempt),
        }
    }
}

struct Inner {
    state:        AuthState,
    next_attempt: AttemptId,
    /// Error that ended an attempt, kept until someone collects it.
    failure:      Option<(AttemptId, Error)>,
    task:         Option<JoinHandle<()>>,
}

/// State shared with the login task.
struct LoginCore {
    client: SharedClient,
    store:  Arc<dyn SessionStore>,
    inner:  Mutex<Inner>,
    phase:  watch::Sender<AuthPhase>,
}

impl LoginCore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner, state: AuthState) {
        let phase = state.phase();
        inner.state = state;
        self.phase.send_replace(phase);
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.lock().state.attempt() == Some(attempt)
    }

    /// Register the challenge for `attempt`. Refused when the attempt is no
    /// longer current or a challenge is already outstanding.
    fn open_challenge(&self, attempt: AttemptId, challenge: PendingChallenge) -> bool {
        let mut inner = self.lock();
        let ready = matches!(
            inner.state,
            AuthState::Connecting { attempt: current, .. } if current == attempt
        );
        if ready {
            self.set_state(&mut inner, AuthState::AwaitingCode { attempt, challenge });
            tracing::info!("[mediadl] Verification code requested");
        } else if matches!(inner.state, AuthState::AwaitingCode { .. }) {
            tracing::warn!("[mediadl] Ignoring second code request, one is already pending");
        } else {
            tracing::debug!("[mediadl] Code requested by abandoned attempt {attempt}");
        }
        ready
    }

    /// Called by the login task when `begin_login` returns.
    fn finish_login(&self, attempt: AttemptId, result: Result<(), RemoteError>) {
        let verifying = match self.lock().state {
            AuthState::Connecting { attempt: a, verifying } if a == attempt => verifying,
            AuthState::AwaitingCode { attempt: a, .. } if a == attempt => false,
            _ => {
                tracing::debug!("[mediadl] Discarding result of abandoned attempt {attempt}");
                return;
            }
        };

        match result {
            Ok(()) => {
                // The save happens under the lock: a disconnect either sees
                // the attempt and clears after us, or abandons it first.
                let mut inner = self.lock();
                if inner.state.attempt() != Some(attempt) {
                    tracing::debug!("[mediadl] Attempt {attempt} abandoned before its session was saved");
                    return;
                }
                self.persist_session();
                self.set_state(&mut inner, AuthState::Authenticated { attempt });
                tracing::info!("[mediadl] Signed in");
            }
            Err(e) => {
                let err = classify_login_error(e, verifying);
                tracing::warn!("[mediadl] Login failed: {err}");
                let mut inner = self.lock();
                if inner.state.attempt() == Some(attempt) {
                    self.set_state(&mut inner, AuthState::Idle);
                    inner.failure = Some((attempt, err));
                    inner.task    = None;
                }
            }
        }
    }

    /// A failed save leaves the session usable, only resumption is lost.
    fn persist_session(&self) {
        let token = match self.client.export_session() {
            Ok(t)  => t,
            Err(e) => {
                tracing::warn!("[mediadl] Could not export session: {e}");
                return;
            }
        };
        match self.store.save(&token) {
            Ok(())  => tracing::info!("[mediadl] Session saved ({})", self.store.name()),
            Err(e)  => tracing::warn!("[mediadl] Could not save session ({}): {e}", self.store.name()),
        }
    }

    /// What a settled attempt ended in.
    fn outcome(&self, attempt: AttemptId) -> Result<AuthPhase, Error> {
        let mut inner = self.lock();
        if inner.failure.as_ref().is_some_and(|(a, _)| *a == attempt) {
            if let Some((_, err)) = inner.failure.take() {
                return Err(err);
            }
        }
        match inner.state {
            AuthState::AwaitingCode { attempt: a, .. } if a == attempt => Ok(AuthPhase::AwaitingCode),
            AuthState::Authenticated { attempt: a } if a == attempt => Ok(AuthPhase::Authenticated),
            _ => Err(Error::Connection(RemoteError::Dropped)),
        }
    }
}

/// Rejections after a code was submitted, and 401s, are the user's to fix;
/// everything else is a connection problem.
fn classify_login_error(e: RemoteError, verifying: bool) -> Error {
    let rejected = matches!(
        &e,
        RemoteError::Rpc(rpc) if verifying || rpc.code == 401 || rpc.is("PHONE_CODE_*")
    );
    if rejected { Error::Auth(e) } else { Error::Connection(e) }
}

/// Handed to the client as its code source for one attempt.
struct ChallengePrompt<'a> {
    core:    &'a LoginCore,
    attempt: AttemptId,
}

#[async_trait]
impl<'a> CodePrompt for ChallengePrompt<'a> {
    async fn request_code(&self) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        if !self.core.open_challenge(self.attempt, PendingChallenge { resolver: tx }) {
            return None;
        }
        rx.await.ok()
    }
}

// ─── AuthController ───────────────────────────────────────────────────────────

/// Drives one messaging account through login, catalog fetches and logout.
///
/// # Example
/// ```rust,no_run
/// # async fn f(client: mediadl_client::SharedClient) -> Result<(), mediadl_client::Error> {
/// use std::sync::Arc;
/// use mediadl_client::{AuthController, AuthPhase, Config, Credentials};
/// use mediadl_session::FileSessionStore;
///
/// let config = Config::default();
/// let store  = Arc::new(FileSessionStore::new(&config.session_path));
/// let auth   = AuthController::new(client, store, &config);
///
/// let creds = Credentials::new("12345", "0123456789abcdef0123456789abcdef", "+15551234567");
/// if auth.connect(creds).await? == AuthPhase::AwaitingCode {
///     auth.submit_code("12345").await?;
/// }
/// auth.fetch_media("@somechannel").await?;
/// # Ok(()) }
/// ```
pub struct AuthController {
    core:        Arc<LoginCore>,
    library:     MediaLibrary,
    policy:      Arc<dyn RetryPolicy>,
    fetch_limit: usize,
}

impl AuthController {
    pub fn new(client: SharedClient, store: Arc<dyn SessionStore>, config: &Config) -> Self {
        let (phase, _) = watch::channel(AuthPhase::Idle);
        let inner = Inner {
            state:        AuthState::Idle,
            next_attempt: 1,
            failure:      None,
            task:         None,
        };
        Self {
            core: Arc::new(LoginCore { client, store, inner: Mutex::new(inner), phase }),
            library:     MediaLibrary::new(),
            policy:      config.retry_policy(),
            fetch_limit: config.fetch_limit,
        }
    }

    /// Replace the policy used for connecting and fetching.
    pub fn with_retry_policy<P: RetryPolicy>(mut self, policy: P) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn phase(&self) -> AuthPhase {
        *self.core.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthPhase> {
        self.core.phase.subscribe()
    }

    pub fn is_waiting_for_code(&self) -> bool {
        self.phase() == AuthPhase::AwaitingCode
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == AuthPhase::Authenticated
    }

    /// The error that ended the last attempt, if nobody has seen it yet.
    pub fn take_failure(&self) -> Option<Error> {
        self.core.lock().failure.take().map(|(_, e)| e)
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    /// The client, while signed in.
    pub fn client(&self) -> Option<SharedClient> {
        self.is_authenticated().then(|| Arc::clone(&self.core.client))
    }

    /// Start a login attempt.
    ///
    /// Returns once the remote side asks for a verification code
    /// (`AwaitingCode`), a stored session was accepted (`Authenticated`), or
    /// the attempt failed. Malformed credentials are rejected before anything
    /// is sent.
    pub async fn connect(&self, credentials: Credentials) -> Result<AuthPhase, Error> {
        credentials.validate()?;

        let attempt = {
            let mut inner = self.core.lock();
            if !matches!(inner.state, AuthState::Idle) {
                return Err(Error::AlreadyInProgress);
            }
            let attempt = inner.next_attempt;
            inner.next_attempt += 1;
            inner.failure = None;
            self.core.set_state(&mut inner, AuthState::Connecting { attempt, verifying: false });
            attempt
        };
        tracing::info!("[mediadl] Connecting (attempt {attempt}) …");

        let session = match self.core.store.load() {
            Ok(s)  => s,
            Err(e) => {
                tracing::warn!("[mediadl] Could not read stored session: {e}");
                None
            }
        };
        if session.is_some() {
            tracing::debug!("[mediadl] Resuming stored session");
        }
        let params = ConnectParams {
            api_id:   credentials.identifier().to_string(),
            api_hash: credentials.secret().to_string(),
            session,
        };

        if let Err(e) = retrying(self.policy.as_ref(), || self.core.client.connect(&params)).await {
            tracing::warn!("[mediadl] Connection failed: {e}");
            let mut inner = self.core.lock();
            if inner.state.attempt() == Some(attempt) {
                self.core.set_state(&mut inner, AuthState::Idle);
            }
            return Err(Error::Connection(e));
        }
        if !self.core.is_current(attempt) {
            // Disconnected while the transport was opening.
            if let Err(e) = self.core.client.disconnect().await {
                tracing::warn!("[mediadl] Error while closing abandoned connection: {e}");
            }
            return Err(Error::Connection(RemoteError::Dropped));
        }

        let core  = Arc::clone(&self.core);
        let phone = credentials.phone().to_string();
        let task  = tokio::spawn(async move {
            let prompt = ChallengePrompt { core: &core, attempt };
            let result = core.client.begin_login(&phone, &prompt).await;
            core.finish_login(attempt, result);
        });
        {
            let mut inner = self.core.lock();
            if inner.state.attempt() == Some(attempt) {
                inner.task = Some(task);
            } else {
                task.abort();
            }
        }

        self.settle(attempt).await
    }

    /// Deliver the verification code to the pending challenge.
    ///
    /// An empty code, or a code while none is pending, is refused without
    /// touching the state.
    pub async fn submit_code(&self, code: &str) -> Result<AuthPhase, Error> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CodeStateError::EmptyCode.into());
        }

        let (attempt, challenge) = {
            let mut inner = self.core.lock();
            match std::mem::replace(&mut inner.state, AuthState::Idle) {
                AuthState::AwaitingCode { attempt, challenge } => {
                    self.core.set_state(&mut inner, AuthState::Connecting { attempt, verifying: true });
                    (attempt, challenge)
                }
                other => {
                    inner.state = other;
                    return Err(CodeStateError::NoPendingChallenge.into());
                }
            }
        };

        if !challenge.resolve(code.to_string()) {
            tracing::debug!("[mediadl] Login task ended before the code arrived");
        }
        self.settle(attempt).await
    }

    async fn settle(&self, attempt: AttemptId) -> Result<AuthPhase, Error> {
        let mut rx = self.core.phase.subscribe();
        loop {
            if *rx.borrow_and_update() != AuthPhase::Connecting {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.core.outcome(attempt)
    }

    /// Fetch the latest media of `chat` into the library, replacing the
    /// previous catalog and selection. Returns the number of items found.
    pub async fn fetch_media(&self, chat: &str) -> Result<usize, Error> {
        let chat = chat.trim();
        if chat.is_empty() {
            return Err(FormatError::EmptyChat.into());
        }
        if !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        let items = fetch_catalog(
            self.core.client.as_ref(),
            chat,
            self.fetch_limit,
            self.policy.as_ref(),
        )
        .await?;
        let found = items.len();
        self.library.replace_catalog(items);
        Ok(found)
    }

    /// Abandon any attempt, close the transport and forget the stored
    /// session, catalog and selection. Does nothing when already idle.
    pub async fn disconnect(&self) {
        let task = {
            let mut inner = self.core.lock();
            if matches!(inner.state, AuthState::Idle) && inner.task.is_none() {
                return;
            }
            self.core.set_state(&mut inner, AuthState::Idle);
            inner.failure = None;
            inner.task.take()
        };
        if let Some(task) = task {
            task.abort();
        }

        self.library.clear();
        match self.core.store.clear() {
            Ok(())  => tracing::info!("[mediadl] Session cleared ({})", self.core.store.name()),
            Err(e)  => tracing::warn!("[mediadl] Could not clear stored session: {e}"),
        }
        if let Err(e) = self.core.client.disconnect().await {
            tracing::warn!("[mediadl] Error while disconnecting: {e}");
        }
        tracing::info!("[mediadl] Disconnected");
    }
}

impl Drop for AuthController {
    fn drop(&mut self) {
        if let Some(task) = self.core.lock().task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for AuthController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthController")
            .field("phase", &self.phase())
            .field("library", &self.library)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RpcError;

    #[test]
    fn late_rejections_are_connection_errors() {
        let rpc = |code, name| RemoteError::Rpc(RpcError::parse(code, name));

        assert!(matches!(classify_login_error(rpc(400, "PHONE_NUMBER_INVALID"), false), Error::Connection(_)));
        assert!(matches!(classify_login_error(rpc(400, "PHONE_CODE_INVALID"), false), Error::Auth(_)));
        assert!(matches!(classify_login_error(rpc(400, "PHONE_NUMBER_INVALID"), true), Error::Auth(_)));
        assert!(matches!(classify_login_error(rpc(401, "AUTH_KEY_UNREGISTERED"), false), Error::Auth(_)));
        assert!(matches!(classify_login_error(RemoteError::Dropped, true), Error::Connection(_)));
    }

    #[test]
    fn dropped_challenge_reports_unresolved() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        assert!(!PendingChallenge { resolver: tx }.resolve("1".into()));
    }
}
