//! Navigation gating on session state.
//!
//! Decisions depend on the session store only; integration statuses never
//! gate a route and nothing here touches the network.

use crate::app::Route;
use crate::domain::SessionState;

use super::SessionStore;

/// What the presentation layer should do for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not known yet; show a neutral pending indicator only.
    Pending,
    /// Go elsewhere instead.
    Redirect(Route),
    /// Render the requested content.
    Render,
}

/// Decision for a route that requires a session.
pub fn protected(state: &SessionState) -> GuardDecision {
    if state.initializing {
        GuardDecision::Pending
    } else if state.is_signed_in() {
        GuardDecision::Render
    } else {
        GuardDecision::Redirect(Route::SignIn)
    }
}

/// Decision for the sign-in page: signed-in users are sent home.
pub fn guest_only(state: &SessionState) -> GuardDecision {
    if state.initializing {
        GuardDecision::Pending
    } else if state.is_signed_in() {
        GuardDecision::Redirect(Route::Home)
    } else {
        GuardDecision::Render
    }
}

/// Route guard bound to a session store.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: SessionStore,
}

impl RouteGuard {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    /// Current decision for a protected route.
    pub fn check(&self) -> GuardDecision {
        protected(&self.session.state())
    }

    /// Current decision for the sign-in page.
    pub fn check_guest(&self) -> GuardDecision {
        guest_only(&self.session.state())
    }

    /// Waits out initialization, then decides for a protected route.
    pub async fn resolve(&self) -> GuardDecision {
        self.session.wait_until_initialized().await;
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::app::EventBus;
    use crate::domain::Session;
    use crate::providers::identity::HostIdentity;

    fn ada() -> Session {
        Session::new("uid-ada", "Ada", "ada@example.com")
    }

    #[test]
    fn protected_decisions() {
        assert_eq!(protected(&SessionState::initializing()), GuardDecision::Pending);
        assert_eq!(
            protected(&SessionState::known(None)),
            GuardDecision::Redirect(Route::SignIn)
        );
        assert_eq!(
            protected(&SessionState::known(Some(ada()))),
            GuardDecision::Render
        );
    }

    #[test]
    fn guest_only_decisions() {
        assert_eq!(guest_only(&SessionState::initializing()), GuardDecision::Pending);
        assert_eq!(guest_only(&SessionState::known(None)), GuardDecision::Render);
        assert_eq!(
            guest_only(&SessionState::known(Some(ada()))),
            GuardDecision::Redirect(Route::Home)
        );
    }

    #[tokio::test]
    async fn resolve_waits_for_first_report() {
        let identity = Arc::new(HostIdentity::new());
        let guard = RouteGuard::new(SessionStore::new(identity.clone(), EventBus::new()));
        assert_eq!(guard.check(), GuardDecision::Pending);

        let pending = tokio::spawn({
            let guard = guard.clone();
            async move { guard.resolve().await }
        });
        tokio::task::yield_now().await;
        identity.emit(None);

        assert_eq!(pending.await.unwrap(), GuardDecision::Redirect(Route::SignIn));
    }
}
