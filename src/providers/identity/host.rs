//! Identity provider driven by the embedding host.
//!
//! [`HostIdentity`] is used when the identity SDK lives outside this process
//! (a webview shell, a test harness, or the CLI handing over a token). The host pushes session changes with [`HostIdentity::emit`]
//! and decides what interactive sign-in yields.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{AccessToken, AuthError, IdentityProvider, SessionHandler, TokenError};
use crate::domain::{Session, UserId};

#[derive(Default)]
struct HostState {
    /// `None` until the host has reported for the first time.
    reported: Option<Option<Session>>,
    token: Option<Result<AccessToken, TokenError>>,
    next_sign_in: Option<Result<Session, AuthError>>,
    sign_out_error: Option<AuthError>,
    handlers: Vec<std::sync::Arc<dyn Fn(Option<Session>) + Send + Sync>>,
    token_requests: usize,
}

/// Identity provider whose session is pushed by the host.
#[derive(Default)]
pub struct HostIdentity {
    state: Mutex<HostState>,
}

impl HostIdentity {
    /// Creates a provider that has not reported a session yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that already knows `session` and mints `token` for it.
    pub fn signed_in(session: Session, token: impl Into<String>) -> Self {
        let identity = Self::new();
        {
            let mut state = identity.lock();
            state.reported = Some(Some(session));
            state.token = Some(Ok(AccessToken::new(token)));
        }
        identity
    }

    /// Creates a provider that knows nobody is signed in.
    pub fn signed_out() -> Self {
        let identity = Self::new();
        identity.lock().reported = Some(None);
        identity
    }

    /// Session for an externally minted `token`; signed out without one.
    ///
    /// The user id defaults to the email address.
    pub fn from_token(
        token: Option<String>,
        user_id: Option<String>,
        email: Option<String>,
    ) -> Self {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                let email = email.unwrap_or_default();
                let user_id = user_id.unwrap_or_else(|| email.clone());
                let display = email.split('@').next().unwrap_or_default().to_string();
                Self::signed_in(Session::new(UserId::from(user_id), display, email), token)
            }
            None => Self::signed_out(),
        }
    }

    /// Reports a session change to every registered handler.
    pub fn emit(&self, session: Option<Session>) {
        let handlers = {
            let mut state = self.lock();
            state.reported = Some(session.clone());
            if session.is_none() {
                state.token = None;
            }
            state.handlers.clone()
        };
        for handler in handlers {
            handler(session.clone());
        }
    }

    /// Sets the token returned by [`IdentityProvider::access_token`].
    pub fn set_token(&self, token: Result<AccessToken, TokenError>) {
        self.lock().token = Some(token);
    }

    /// Stages the outcome of the next interactive sign-in.
    pub fn stage_sign_in(&self, outcome: Result<Session, AuthError>) {
        self.lock().next_sign_in = Some(outcome);
    }

    /// Makes the next sign-out fail remotely with `error`.
    pub fn fail_next_sign_out(&self, error: AuthError) {
        self.lock().sign_out_error = Some(error);
    }

    /// Number of tokens minted or refused so far.
    pub fn token_requests(&self) -> usize {
        self.lock().token_requests
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for HostIdentity {
    fn on_session_changed(&self, handler: SessionHandler) {
        let handler: std::sync::Arc<dyn Fn(Option<Session>) + Send + Sync> = handler.into();
        let current = {
            let mut state = self.lock();
            state.handlers.push(std::sync::Arc::clone(&handler));
            state.reported.clone()
        };
        if let Some(session) = current {
            handler(session);
        }
    }

    async fn sign_in(&self) -> Result<Session, AuthError> {
        let outcome = self.lock().next_sign_in.take().unwrap_or_else(|| {
            Err(AuthError::Provider(
                "interactive sign-in is handled by the host".to_string(),
            ))
        });
        if let Ok(session) = &outcome {
            {
                let mut state = self.lock();
                if !matches!(state.token, Some(Ok(_))) {
                    state.token = Some(Ok(AccessToken::new(format!("host-{}", session.user_id))));
                }
            }
            self.emit(Some(session.clone()));
        }
        outcome
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(error) = self.lock().sign_out_error.take() {
            return Err(error);
        }
        self.emit(None);
        Ok(())
    }

    async fn access_token(&self, session: &Session) -> Result<AccessToken, TokenError> {
        let mut state = self.lock();
        state.token_requests += 1;
        let current = state.reported.clone().flatten();
        match current {
            Some(active) if active.is_same_principal(session) => {
                state.token.clone().unwrap_or(Err(TokenError::NoSession))
            }
            _ => Err(TokenError::NoSession),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ada() -> Session {
        Session::new("uid-ada", "Ada", "ada@example.com")
    }

    #[test]
    fn handler_receives_current_value_on_registration() {
        let identity = HostIdentity::signed_in(ada(), "tok");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        identity.on_session_changed(Box::new(move |session| s.lock().unwrap().push(session)));

        assert_eq!(*seen.lock().unwrap(), vec![Some(ada())]);
    }

    #[test]
    fn unreported_provider_defers_first_call() {
        let identity = HostIdentity::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        identity.on_session_changed(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        identity.emit(None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_is_bound_to_current_principal() {
        let identity = HostIdentity::signed_in(ada(), "tok");
        assert_eq!(identity.access_token(&ada()).await.unwrap().as_str(), "tok");

        let other = Session::new("uid-bob", "Bob", "bob@example.com");
        assert_eq!(
            identity.access_token(&other).await,
            Err(TokenError::NoSession)
        );
        assert_eq!(identity.token_requests(), 2);
    }

    #[tokio::test]
    async fn unstaged_sign_in_fails() {
        let identity = HostIdentity::signed_out();
        assert!(matches!(
            identity.sign_in().await,
            Err(AuthError::Provider(_))
        ));

        identity.stage_sign_in(Ok(ada()));
        assert_eq!(identity.sign_in().await.unwrap(), ada());
        assert!(identity.access_token(&ada()).await.is_ok());
    }

    #[tokio::test]
    async fn from_token_builds_session() {
        let identity =
            HostIdentity::from_token(Some("tok".into()), None, Some("ada@example.com".into()));
        let session = identity.lock().reported.clone().flatten().unwrap();
        assert_eq!(session.user_id, UserId::from("ada@example.com".to_string()));
        assert_eq!(session.display_name, "ada");
        assert_eq!(identity.access_token(&session).await.unwrap().as_str(), "tok");

        let anonymous = HostIdentity::from_token(Some(String::new()), None, None);
        assert_eq!(anonymous.lock().reported, Some(None));
    }
}
