//! Application context and lifecycle.
//!
//! [`AppContext`] is the explicit handle the presentation layer receives. It
//! owns the event bus and wires the session store, the backend gateway and
//! the connection services together.

mod events;
mod navigation;

pub use events::{AppEvent, EventBus, Notification, NotificationLevel, SubscriberId};
#[cfg(test)]
pub use navigation::MockNavigator;
pub use navigation::{BrowserNavigator, NavigationError, Navigator, Route};

use std::sync::Arc;

use crate::config::Settings;
use crate::domain::Provider;
use crate::providers::backend::{
    ApiClient, ApiError, AssistantApi, GmailBackend, SlackBackend,
};
use crate::providers::identity::IdentityProvider;
use crate::services::{
    AssistantService, ConnectionCoordinator, IntegrationTracker, OAuthCallbackHandler,
    RouteGuard, SessionStore, TrackerDeps,
};
use crate::storage::PendingConnectStore;

/// Everything the presentation layer talks to.
#[derive(Debug)]
pub struct AppContext {
    pub settings: Settings,
    pub events: EventBus,
    pub session: SessionStore,
    pub api: ApiClient,
    pub coordinator: Arc<ConnectionCoordinator>,
    pub route_guard: RouteGuard,
    pub callback: OAuthCallbackHandler,
    pub assistant: AssistantService,
}

impl AppContext {
    /// Wires every component around `events` and starts following the
    /// session.
    ///
    /// Must be called inside a tokio runtime: a session that is already known
    /// starts its first refresh cycle immediately.
    pub fn build(
        settings: Settings,
        events: EventBus,
        identity: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        pending: Arc<dyn PendingConnectStore>,
    ) -> Result<Self, ApiError> {
        let session = SessionStore::new(identity, events.clone());
        let api = ApiClient::new(&settings.backend, session.clone())?;

        let deps = TrackerDeps {
            navigator,
            pending,
            events: events.clone(),
        };
        let trackers = Provider::ALL.iter().map(|provider| match provider {
            Provider::Gmail => {
                IntegrationTracker::with_revoke(Arc::new(GmailBackend::new(api.clone())), deps.clone())
            }
            Provider::Slack => {
                IntegrationTracker::new(Arc::new(SlackBackend::new(api.clone())), deps.clone())
            }
        });

        let coordinator = ConnectionCoordinator::new(session.clone(), trackers, events.clone());
        coordinator.start();

        let callback =
            OAuthCallbackHandler::new(Arc::clone(&coordinator), session.clone(), &deps, &settings);
        let assistant =
            AssistantService::new(AssistantApi::new(api.clone()), Arc::clone(&coordinator));
        let route_guard = RouteGuard::new(session.clone());

        tracing::info!(backend = %api.base_url(), "Application context ready");

        Ok(Self {
            settings,
            events,
            session,
            api,
            coordinator,
            route_guard,
            callback,
            assistant,
        })
    }
}
