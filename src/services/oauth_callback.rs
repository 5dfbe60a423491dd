//! Resumption after the external consent flow.
//!
//! The provider redirects the browser back to the callback route. The code
//! exchange happens on the backend out of band; this side validates the
//! parameters against the pending connect record, shows a transient
//! indication, refreshes the relevant status and returns home. Every path is
//! bounded by the configured delays.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use url::Url;

use super::connection_coordinator::ConnectionCoordinator;
use super::integration_tracker::TrackerDeps;
use super::SessionStore;
use crate::app::{EventBus, Navigator, Notification, Route};
use crate::config::{CallbackSettings, Settings};
use crate::domain::{Provider, UnknownProvider};
use crate::storage::{PendingConnect, PendingConnectStore};

/// Why a callback counts as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The provider redirected back with `error`.
    #[error("{error}")]
    ProviderError {
        error: String,
        description: Option<String>,
    },

    #[error("Missing authentication code")]
    MissingCode,

    /// `state` (or the provider) does not match the pending connect record.
    #[error("Authentication response did not match the pending request")]
    StateMismatch,

    #[error(transparent)]
    UnknownProvider(#[from] UnknownProvider),
}

/// Parameters carried by the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    /// Provider discriminator from `?provider=` or a trailing path segment.
    pub provider: Option<String>,
}

impl CallbackParams {
    /// Reads the parameters from `url`. Empty values count as absent.
    pub fn from_url(url: &Url, callback_route: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                "provider" => params.provider = value,
                _ => {}
            }
        }

        if params.provider.is_none() {
            let prefix = callback_route.trim_end_matches('/');
            if let Some(rest) = url.path().strip_prefix(prefix) {
                let segment = rest.trim_matches('/');
                if !segment.is_empty() && !segment.contains('/') {
                    params.provider = Some(segment.to_string());
                }
            }
        }
        params
    }

    /// Validates the parameters against the pending record and resolves the
    /// provider being resumed.
    pub fn evaluate(
        &self,
        pending: Option<&PendingConnect>,
    ) -> Result<Option<Provider>, CallbackError> {
        if let Some(error) = &self.error {
            return Err(CallbackError::ProviderError {
                error: error.clone(),
                description: self.error_description.clone(),
            });
        }

        let provider = match &self.provider {
            Some(raw) => Some(raw.parse::<Provider>()?),
            None => pending.map(|p| p.provider),
        };

        if self.code.is_none() {
            return Err(CallbackError::MissingCode);
        }

        if let (Some(provider), Some(record)) = (provider, pending) {
            if provider != record.provider {
                return Err(CallbackError::StateMismatch);
            }
        }
        let expected = pending.and_then(|p| p.state.as_deref());
        if self.state.as_deref() != expected {
            return Err(CallbackError::StateMismatch);
        }

        Ok(provider)
    }
}

/// Result of a callback resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The provider granted access; `provider` is `None` when it could not be
    /// determined and every integration was refreshed.
    Connected { provider: Option<Provider> },
    Failed(CallbackError),
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Entry point for the callback route.
pub struct OAuthCallbackHandler {
    coordinator: Arc<ConnectionCoordinator>,
    session: SessionStore,
    pending: Arc<dyn PendingConnectStore>,
    navigator: Arc<dyn Navigator>,
    events: EventBus,
    timing: CallbackSettings,
    callback_route: String,
}

impl OAuthCallbackHandler {
    pub fn new(
        coordinator: Arc<ConnectionCoordinator>,
        session: SessionStore,
        deps: &TrackerDeps,
        settings: &Settings,
    ) -> Self {
        Self {
            coordinator,
            session,
            pending: Arc::clone(&deps.pending),
            navigator: Arc::clone(&deps.navigator),
            events: deps.events.clone(),
            timing: settings.callback.clone(),
            callback_route: settings.routes.callback.clone(),
        }
    }

    /// Handles the browser returning to `url`.
    pub async fn resume(&self, url: &Url) -> CallbackOutcome {
        let params = CallbackParams::from_url(url, &self.callback_route);
        self.resume_with(params).await
    }

    pub async fn resume_with(&self, params: CallbackParams) -> CallbackOutcome {
        let pending = self.take_pending().await;
        match params.evaluate(pending.as_ref()) {
            Ok(provider) => {
                self.succeed(provider).await;
                CallbackOutcome::Connected { provider }
            }
            Err(error) => {
                self.fail(&error).await;
                CallbackOutcome::Failed(error)
            }
        }
    }

    async fn take_pending(&self) -> Option<PendingConnect> {
        match self.pending.take().await {
            Ok(Some(record)) if record.is_expired(Utc::now(), self.timing.pending_ttl()) => {
                tracing::info!(provider = %record.provider, "Ignoring expired pending connect");
                None
            }
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read pending connect");
                None
            }
        }
    }

    async fn succeed(&self, provider: Option<Provider>) {
        tracing::info!(provider = ?provider, "OAuth callback succeeded");
        let body = match provider {
            Some(p) => format!("Your {} account has been connected successfully", p.display_name()),
            None => "Your account has been connected successfully".to_string(),
        };
        self.events
            .notify(Notification::success("Connection Successful").with_body(body));

        let refresh = async {
            self.session.wait_until_initialized().await;
            match provider {
                Some(p) => {
                    if let Err(e) = self.coordinator.refresh(p).await {
                        tracing::warn!(provider = %p, error = %e, "Post-callback refresh failed");
                    }
                }
                None => {
                    self.coordinator.refresh_all().await;
                }
            }
        };
        let bounded = async {
            if tokio::time::timeout(self.timing.refresh_timeout(), refresh)
                .await
                .is_err()
            {
                tracing::warn!("Post-callback refresh timed out");
            }
        };
        tokio::join!(bounded, tokio::time::sleep(self.timing.success_delay()));

        self.navigator.navigate(Route::Home);
    }

    async fn fail(&self, error: &CallbackError) {
        tracing::warn!(error = %error, "OAuth callback failed");
        self.events
            .notify(Notification::error("Authentication Failed").with_body(error.to_string()));
        tokio::time::sleep(self.timing.failure_delay()).await;
        self.navigator.navigate(Route::Home);
    }
}

impl std::fmt::Debug for OAuthCallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCallbackHandler")
            .field("callback_route", &self.callback_route)
            .finish()
    }
}
