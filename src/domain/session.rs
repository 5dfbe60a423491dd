//! Session domain types.
//!
//! A [`Session`] is an immutable snapshot of the signed-in principal. It is
//! replaced wholesale on every auth event and never mutated in place.

use serde::{Deserialize, Serialize};

use super::UserId;

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable user identifier.
    pub user_id: UserId,
    /// Display name shown in greetings.
    pub display_name: String,
    /// Avatar image reference.
    pub avatar_url: Option<String>,
    /// Email address of the principal.
    pub email: String,
}

impl Session {
    pub fn new(
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_url: None,
            email: email.into(),
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Whether both snapshots describe the same principal.
    ///
    /// Token refreshes inside the identity SDK re-emit the session with the
    /// same user id; those are not session transitions.
    pub fn is_same_principal(&self, other: &Session) -> bool {
        self.user_id == other.user_id
    }
}

/// Observable state of the session store.
///
/// `initializing` stays `true` until the identity provider has reported for
/// the first time, so consumers can tell "not yet known" apart from
/// "known to be signed out".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub initializing: bool,
    pub session: Option<Session>,
}

impl SessionState {
    /// State before the identity provider has reported.
    pub fn initializing() -> Self {
        Self {
            initializing: true,
            session: None,
        }
    }

    /// State after the identity provider has reported `session`.
    pub fn known(session: Option<Session>) -> Self {
        Self {
            initializing: false,
            session,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initializing()
    }
}
