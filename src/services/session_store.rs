//! Session store over the identity provider.
//!
//! [`SessionStore`] owns the current [`SessionState`] and fans every change out
//! to listeners. It knows nothing about integrations.
//!
//! Updates are dispatched one at a time: listeners observe changes in the
//! order the store applied them, even when the identity provider reports from
//! several threads. Listeners must not report sessions back into the store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;

use crate::app::{AppEvent, EventBus, Notification};
use crate::domain::{Session, SessionState};
use crate::providers::identity::{AccessToken, AuthError, IdentityProvider, TokenError};

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    state: watch::Sender<SessionState>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    /// Held for the whole of a state write and its fan-out.
    dispatch: Mutex<()>,
    next_id: AtomicU64,
    events: EventBus,
}

impl Inner {
    /// Applies a session value reported by the identity provider or by a
    /// local sign-in/sign-out.
    fn apply(&self, session: Option<Session>) {
        let _dispatch = self.lock_dispatch();
        let next = SessionState::known(session);
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if !changed {
            return;
        }

        tracing::info!(
            user_id = next.session.as_ref().map(|s| s.user_id.to_string()).unwrap_or_default(),
            signed_in = next.is_signed_in(),
            "Session changed"
        );

        let listeners: Vec<Listener> = self.lock_listeners().values().cloned().collect();
        self.events.publish(AppEvent::SessionChanged {
            user_id: next.session.as_ref().map(|s| s.user_id.clone()),
        });
        for listener in listeners {
            listener(&next);
        }
    }

    fn lock_dispatch(&self) -> std::sync::MutexGuard<'_, ()> {
        self.dispatch.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owner of the current session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Creates a store and registers it with `identity`.
    ///
    /// The state stays `initializing` until the provider first reports.
    pub fn new(identity: Arc<dyn IdentityProvider>, events: EventBus) -> Self {
        let (state, _) = watch::channel(SessionState::initializing());
        let inner = Arc::new(Inner {
            identity,
            state,
            listeners: Mutex::new(BTreeMap::new()),
            dispatch: Mutex::new(()),
            next_id: AtomicU64::new(0),
            events,
        });

        let weak = Arc::downgrade(&inner);
        inner.identity.on_session_changed(Box::new(move |session| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(session);
            }
        }));

        Self { inner }
    }

    /// Registers `listener` for session changes.
    ///
    /// The listener is called right away with the current state, then on every
    /// change, until the returned subscription is dropped.
    pub fn listen<F>(&self, listener: F) -> SessionSubscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        let _dispatch = self.inner.lock_dispatch();
        self.inner
            .lock_listeners()
            .insert(id, Arc::clone(&listener));

        let current = self.state();
        listener(&current);

        SessionSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Receiver for the session state.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.state.borrow().session.clone()
    }

    /// Waits until the identity provider has reported, then returns the
    /// session (if any).
    pub async fn wait_until_initialized(&self) -> Option<Session> {
        let mut rx = self.watch();
        let session = match rx.wait_for(|state| !state.initializing).await {
            Ok(state) => state.session.clone(),
            Err(_) => None,
        };
        session
    }

    /// Runs the interactive sign-in flow.
    pub async fn sign_in(&self) -> Result<Session, AuthError> {
        match self.inner.identity.sign_in().await {
            Ok(session) => {
                tracing::info!(user_id = %session.user_id, "Signed in");
                self.inner.apply(Some(session.clone()));
                self.inner.events.notify(
                    Notification::success("Successfully logged in")
                        .with_body(format!("Welcome, {}!", session.display_name)),
                );
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in failed");
                self.inner
                    .events
                    .notify(Notification::error("Login failed").with_body(e.to_string()));
                Err(e)
            }
        }
    }

    /// Signs out.
    ///
    /// The local session is cleared even when the remote call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.inner.identity.sign_out().await;
        self.inner.apply(None);

        match &result {
            Ok(()) => {
                tracing::info!("Signed out");
                self.inner.events.notify(
                    Notification::info("Logged out")
                        .with_body("You have been successfully logged out"),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote sign-out failed, local session cleared");
                self.inner
                    .events
                    .notify(Notification::error("Logout failed").with_body(e.to_string()));
            }
        }
        result
    }

    /// Mints a bearer token for the current session.
    pub async fn access_token(&self) -> Result<AccessToken, TokenError> {
        let session = self.current_session().ok_or(TokenError::NoSession)?;
        self.inner.identity.access_token(&session).await
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

/// Listener registration; dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes the listener"]
pub struct SessionSubscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.lock_listeners().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSubscription").field("id", &self.id).finish()
    }
}
