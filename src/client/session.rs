use super::{ClientError, ClientResult, IdentityClient};
use crate::models::{Registration, Session, SessionUser};
use crate::validation::{is_plausible_email, PASSWORD_MIN};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::{sync::mpsc, task::JoinHandle};

// ── Session state ──────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    current: Option<Session>,
    listeners: Vec<mpsc::UnboundedSender<Option<SessionUser>>>,
}

impl Shared {
    fn publish(&mut self, session: Option<Session>) {
        if self.current == session {
            return;
        }
        let user = session.as_ref().map(|s| s.user.clone());
        self.current = session;
        self.listeners.retain(|tx| tx.send(user.clone()).is_ok());
    }
}

/// The one place the current session lives. Created at the application
/// root and handed to whatever needs it; clones share the same state.
#[derive(Clone)]
pub struct SessionState {
    shared: Arc<Mutex<Shared>>,
    started: Arc<AtomicBool>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            shared: Arc::new(Mutex::new(Shared::default())),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<Session> {
        self.lock().current.clone()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.lock().current.as_ref().map(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.lock().current.as_ref().map(|s| s.token.clone())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, session: Option<Session>) {
        self.lock().publish(session);
    }

    /// Ends the session if `token` is still its credential. A rejection
    /// that arrives after a fresh sign-in leaves the new session alone.
    pub(crate) fn expire(&self, token: &str) -> bool {
        let mut shared = self.lock();
        if shared.current.as_ref().is_some_and(|s| s.token == token) {
            shared.publish(None);
            true
        } else {
            false
        }
    }

    /// Flips the one-shot flag. True only for the first caller.
    fn start(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn stop(&self) -> bool {
        self.started
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// `callback` runs right away with the current user (or `None`), then
    /// once per sign-in or sign-out, in order. Must be called inside a
    /// tokio runtime.
    pub fn subscribe<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(Option<&SessionUser>) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let initial = {
            let mut shared = self.lock();
            shared.listeners.push(tx);
            shared.current.as_ref().map(|s| s.user.clone())
        };
        callback(initial.as_ref());

        let task = tokio::spawn(async move {
            while let Some(user) = rx.recv().await {
                callback(user.as_ref());
            }
        });
        Subscription { task: Some(task) }
    }
}

/// Handle to a session listener. Dropping it unsubscribes.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ── Auth bridge ────────────────────────────────────────────────

/// Sign-up, sign-in and sign-out against the identity provider, with the
/// outcome published to `SessionState`.
pub struct AuthBridge<I> {
    identity: I,
    session: SessionState,
}

impl<I: IdentityClient> AuthBridge<I> {
    pub fn new(identity: I, session: SessionState) -> Self {
        AuthBridge { identity, session }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// Attach to the session state, publishing `restored` if given.
    /// Only the first call per `SessionState` does anything.
    pub fn start(&self, restored: Option<Session>) -> bool {
        if !self.session.start() {
            tracing::debug!("session listener already started");
            return false;
        }
        if let Some(session) = restored {
            tracing::debug!(uid = %session.user.uid, "session restored");
            self.session.set(Some(session));
        }
        true
    }

    /// Detach and clear the in-memory session. The credential itself is
    /// not revoked; use `sign_out` for that.
    pub fn shutdown(&self) {
        if self.session.stop() {
            self.session.set(None);
        }
    }

    /// Create the account, then register it with the backend. A failed
    /// backend registration is logged and ignored; the account stays.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> ClientResult<SessionUser> {
        let registration = Registration {
            email: email.trim().to_string(),
            password: password.to_string(),
            display_name: display_name.map(str::to_string),
        };
        check_credentials(&registration.email, password)?;

        let session = self.identity.sign_up(&registration).await?;
        let user = session.user.clone();
        self.session.set(Some(session));

        match self.identity.register(&registration).await {
            Ok(()) => {}
            Err(ClientError::Api { status: 400, error, .. }) if error == "Email already in use" => {
                tracing::debug!(uid = %user.uid, "backend already knows this account");
            }
            Err(error) => {
                tracing::warn!(%error, uid = %user.uid, "backend registration failed, keeping account");
            }
        }
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<SessionUser> {
        let session = self.identity.sign_in(email.trim(), password).await?;
        let user = session.user.clone();
        self.session.set(Some(session));
        Ok(user)
    }

    /// Revoke the current credential. The session is cleared once the
    /// provider confirms, or when it reports the credential as already
    /// invalid. Other failures keep the session.
    pub async fn sign_out(&self) -> ClientResult<()> {
        let token = self.session.token().ok_or(ClientError::Unauthenticated)?;
        match self.identity.sign_out(&token).await {
            Ok(()) => {}
            Err(ClientError::Api { status: 401, .. }) => {
                tracing::debug!("credential already expired or revoked, ending session locally");
            }
            Err(error) => return Err(error),
        }
        self.session.set(None);
        Ok(())
    }
}

fn check_credentials(email: &str, password: &str) -> ClientResult<()> {
    if !is_plausible_email(email) {
        return Err(ClientError::Auth(crate::identity::AuthErrorKind::InvalidEmail));
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(ClientError::Auth(crate::identity::AuthErrorKind::WeakPassword));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AuthErrorKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeIdentity {
        register_result: Mutex<Option<ClientError>>,
        registered: Mutex<Vec<String>>,
        fail_sign_out: bool,
        token_rejected: bool,
    }

    fn session_for(email: &str) -> Session {
        Session {
            token: format!("token-for-{email}"),
            user: SessionUser {
                uid: format!("uid-{email}"),
                email: email.to_string(),
                display_name: None,
                email_verified: false,
            },
        }
    }

    #[async_trait]
    impl IdentityClient for FakeIdentity {
        async fn sign_up(&self, registration: &Registration) -> ClientResult<Session> {
            if registration.email == "taken@example.com" {
                return Err(ClientError::Auth(AuthErrorKind::EmailAlreadyInUse));
            }
            Ok(session_for(&registration.email))
        }

        async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Session> {
            if password != "secret1" {
                return Err(ClientError::Auth(AuthErrorKind::WrongPassword));
            }
            Ok(session_for(email))
        }

        async fn sign_out(&self, _token: &str) -> ClientResult<()> {
            if self.fail_sign_out {
                return Err(ClientError::Transport("connection reset".into()));
            }
            if self.token_rejected {
                return Err(ClientError::Api {
                    status: 401,
                    error: "Invalid token".into(),
                    message: "Token verification failed".into(),
                });
            }
            Ok(())
        }

        async fn register(&self, registration: &Registration) -> ClientResult<()> {
            self.registered.lock().unwrap().push(registration.email.clone());
            match self.register_result.lock().unwrap().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn sign_up_publishes_session_and_registers() {
        let bridge = AuthBridge::new(FakeIdentity::default(), SessionState::new());
        let user = bridge.sign_up("ada@example.com", "secret1", Some("Ada")).await.unwrap();

        assert_eq!(user.email, "ada@example.com");
        assert_eq!(bridge.session().user(), Some(user));
        assert_eq!(*bridge.identity().registered.lock().unwrap(), vec!["ada@example.com"]);
    }

    #[tokio::test]
    async fn failed_backend_registration_keeps_the_account() {
        let identity = FakeIdentity {
            register_result: Mutex::new(Some(ClientError::Transport("down".into()))),
            ..FakeIdentity::default()
        };
        let bridge = AuthBridge::new(identity, SessionState::new());
        assert!(bridge.sign_up("ada@example.com", "secret1", None).await.is_ok());
        assert!(bridge.session().current().is_some());
    }

    #[tokio::test]
    async fn sign_up_rejects_bad_input_before_calling_out() {
        let bridge = AuthBridge::new(FakeIdentity::default(), SessionState::new());
        assert!(matches!(
            bridge.sign_up("nope", "secret1", None).await,
            Err(ClientError::Auth(AuthErrorKind::InvalidEmail))
        ));
        assert!(matches!(
            bridge.sign_up("ada@example.com", "123", None).await,
            Err(ClientError::Auth(AuthErrorKind::WeakPassword))
        ));
        assert!(bridge.identity().registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_errors_carry_fixed_messages() {
        let bridge = AuthBridge::new(FakeIdentity::default(), SessionState::new());
        let err = bridge.sign_up("taken@example.com", "secret1", None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "This email is already registered. Please use a different email or sign in."
        );
        let err = bridge.sign_in("ada@example.com", "wrong!").await.unwrap_err();
        assert_eq!(err.to_string(), "Incorrect password. Please try again.");
        assert!(bridge.session().current().is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_only_on_success() {
        let failing = FakeIdentity {
            fail_sign_out: true,
            ..FakeIdentity::default()
        };
        let bridge = AuthBridge::new(failing, SessionState::new());
        bridge.sign_in("ada@example.com", "secret1").await.unwrap();
        assert!(bridge.sign_out().await.is_err());
        assert!(bridge.session().current().is_some());

        let bridge = AuthBridge::new(FakeIdentity::default(), SessionState::new());
        assert!(matches!(bridge.sign_out().await, Err(ClientError::Unauthenticated)));
        bridge.sign_in("ada@example.com", "secret1").await.unwrap();
        bridge.sign_out().await.unwrap();
        assert!(bridge.session().current().is_none());
    }

    #[tokio::test]
    async fn sign_out_with_a_rejected_token_still_ends_the_session() {
        let expired = FakeIdentity {
            token_rejected: true,
            ..FakeIdentity::default()
        };
        let bridge = AuthBridge::new(expired, SessionState::new());
        bridge.sign_in("ada@example.com", "secret1").await.unwrap();

        bridge.sign_out().await.unwrap();
        assert!(bridge.session().current().is_none());
    }

    #[test]
    fn expire_only_ends_the_matching_session() {
        let state = SessionState::new();
        state.set(Some(session_for("ada@example.com")));

        assert!(!state.expire("token-for-someone-else"));
        assert!(state.current().is_some());

        assert!(state.expire("token-for-ada@example.com"));
        assert!(state.current().is_none());
        assert!(!state.expire("token-for-ada@example.com"));
    }

    #[tokio::test]
    async fn start_is_one_shot() {
        let state = SessionState::new();
        let bridge = AuthBridge::new(FakeIdentity::default(), state.clone());
        assert!(bridge.start(Some(session_for("ada@example.com"))));
        assert!(!bridge.start(None));
        assert!(state.is_started());
        assert_eq!(state.token().as_deref(), Some("token-for-ada@example.com"));

        bridge.shutdown();
        assert!(!state.is_started());
        assert!(state.current().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_current_value_then_changes() {
        let state = SessionState::new();
        let seen = Arc::new(Mutex::new(Vec::<Option<String>>::new()));
        let sink = seen.clone();
        let subscription = state.subscribe(move |user| {
            sink.lock().unwrap().push(user.map(|u| u.email.clone()));
        });
        assert_eq!(*seen.lock().unwrap(), vec![None]);

        state.set(Some(session_for("ada@example.com")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().unwrap().last().cloned(), Some(Some("ada@example.com".to_string())));

        subscription.unsubscribe();
        let count = seen.lock().unwrap().len();
        state.set(None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().unwrap().len(), count);
    }

    #[tokio::test]
    async fn back_to_back_changes_each_reach_subscribers() {
        let state = SessionState::new();
        let bridge = AuthBridge::new(FakeIdentity::default(), state.clone());
        let seen = Arc::new(Mutex::new(Vec::<Option<String>>::new()));
        let sink = seen.clone();
        let _subscription = state.subscribe(move |user| {
            sink.lock().unwrap().push(user.map(|u| u.email.clone()));
        });

        bridge.start(Some(session_for("ada@example.com")));
        bridge.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("ada@example.com".to_string()), None]
        );
    }
}
