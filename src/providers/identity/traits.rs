//! Identity provider trait definition.
//!
//! The identity provider SDK (sign-in popup, session persistence, token
//! minting) is an external collaborator. The [`IdentityProvider`] trait is the
//! whole surface the connection core consumes.

use std::fmt;

use async_trait::async_trait;

use crate::domain::Session;

/// Callback invoked by the identity provider on every session change.
pub type SessionHandler = Box<dyn Fn(Option<Session>) + Send + Sync>;

/// Errors from interactive sign-in and sign-out.
///
/// These are user-recoverable and surface as transient notices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The user dismissed the consent flow.
    #[error("sign-in was cancelled")]
    Cancelled,

    /// The consent popup could not be opened.
    #[error("sign-in popup was blocked")]
    PopupBlocked,

    /// Network failure talking to the identity provider.
    #[error("network error: {0}")]
    Network(String),

    /// Any other provider-reported failure.
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Errors from minting an access token.
///
/// Callers treat every variant as equivalent to having no session; a token
/// error is never retried as a transient failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("no active session")]
    NoSession,

    /// The provider refused to mint a token (expired refresh credential).
    #[error("token refused: {0}")]
    Refused(String),
}

/// Bearer credential minted for the current session.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// The primary identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers `handler` for session changes.
    ///
    /// Once the provider knows the persisted session it calls the handler
    /// with the current value, then again on every change.
    fn on_session_changed(&self, handler: SessionHandler);

    /// Runs the interactive consent flow.
    async fn sign_in(&self) -> Result<Session, AuthError>;

    /// Ends the session remotely. Fails only on transport errors.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Mints a bearer token for `session`.
    async fn access_token(&self, session: &Session) -> Result<AccessToken, TokenError>;
}
