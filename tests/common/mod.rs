//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use url::Url;

use liaison::app::{AppEvent, EventBus, NavigationError, Navigator, Notification, Route};
use liaison::config::Settings;
use liaison::domain::{IntegrationStatus, Provider, Session};
use liaison::providers::backend::{
    ApiError, IntegrationBackend, RevocableBackend, RevokeOutcome, StatusReport,
};
use liaison::providers::identity::HostIdentity;
use liaison::services::{
    ConnectionCoordinator, IntegrationTracker, OAuthCallbackHandler, SessionStore, TrackerDeps,
};
use liaison::storage::MemoryPendingStore;

// ============================================================================
// Scripted backend
// ============================================================================

/// Backend whose responses are queued by the test.
///
/// When the queue is empty `fallback` is returned. With a gate, every status
/// call waits for a permit.
pub struct ScriptedBackend {
    provider: Provider,
    statuses: Mutex<VecDeque<Result<StatusReport, ApiError>>>,
    fallback: Mutex<Result<StatusReport, ApiError>>,
    auth_url: Mutex<Result<Option<String>, ApiError>>,
    revokes: Mutex<VecDeque<Result<RevokeOutcome, ApiError>>>,
    status_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedBackend {
    pub fn new(provider: Provider, fallback: StatusReport) -> Arc<Self> {
        Arc::new(Self {
            provider,
            statuses: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(fallback)),
            auth_url: Mutex::new(Ok(None)),
            revokes: Mutex::new(VecDeque::new()),
            status_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        })
    }

    pub fn push_status(&self, status: Result<StatusReport, ApiError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn set_fallback(&self, status: Result<StatusReport, ApiError>) {
        *self.fallback.lock().unwrap() = status;
    }

    pub fn set_auth_url(&self, url: Result<Option<String>, ApiError>) {
        *self.auth_url.lock().unwrap() = url;
    }

    pub fn push_revoke(&self, outcome: Result<RevokeOutcome, ApiError>) {
        self.revokes.lock().unwrap().push_back(outcome);
    }

    /// Makes every subsequent status call wait for a permit on the returned gate.
    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntegrationBackend for ScriptedBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch_status(&self) -> Result<StatusReport, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        let queued = self.statuses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    async fn initiate_connect(&self) -> Result<Option<String>, ApiError> {
        self.auth_url.lock().unwrap().clone()
    }
}

#[async_trait]
impl RevocableBackend for ScriptedBackend {
    async fn revoke(&self) -> Result<RevokeOutcome, ApiError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revokes.lock().unwrap().pop_front().unwrap_or(Ok(RevokeOutcome {
            revoked: true,
            message: None,
        }))
    }
}

// ============================================================================
// Recording navigator
// ============================================================================

#[derive(Default)]
pub struct RecordingNavigator {
    external: Mutex<Vec<Url>>,
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn external(&self) -> Vec<Url> {
        self.external.lock().unwrap().clone()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn open_external(&self, url: &Url) -> Result<(), NavigationError> {
        self.external.lock().unwrap().push(url.clone());
        Ok(())
    }

    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn ada() -> Session {
    Session::new("uid-ada", "Ada Lovelace", "a@b.com")
}

pub fn bob() -> Session {
    Session::new("uid-bob", "Bob", "bob@example.com")
}

pub fn connected(identifier: &str) -> StatusReport {
    StatusReport::Connected {
        identifier: identifier.to_string(),
        expires_at: None,
    }
}

pub fn disconnected() -> StatusReport {
    StatusReport::Disconnected { reason: None }
}

/// Full connection core over scripted backends.
pub struct Harness {
    pub identity: Arc<HostIdentity>,
    pub events: EventBus,
    pub session: SessionStore,
    pub gmail: Arc<ScriptedBackend>,
    pub slack: Arc<ScriptedBackend>,
    pub navigator: Arc<RecordingNavigator>,
    pub pending: Arc<MemoryPendingStore>,
    pub coordinator: Arc<ConnectionCoordinator>,
    pub callback: OAuthCallbackHandler,
    recorded: Arc<Mutex<Vec<AppEvent>>>,
}

impl Harness {
    /// Mail answers connected as `a@b.com`, messaging answers disconnected.
    pub fn new(identity: HostIdentity) -> Self {
        Self::with_backends(
            identity,
            ScriptedBackend::new(Provider::Gmail, connected("a@b.com")),
            ScriptedBackend::new(Provider::Slack, disconnected()),
        )
    }

    pub fn with_backends(
        identity: HostIdentity,
        gmail: Arc<ScriptedBackend>,
        slack: Arc<ScriptedBackend>,
    ) -> Self {
        let identity = Arc::new(identity);
        let events = EventBus::new();
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);
        events.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        let session = SessionStore::new(identity.clone(), events.clone());
        let navigator = Arc::new(RecordingNavigator::default());
        let pending = Arc::new(MemoryPendingStore::new());
        let deps = TrackerDeps {
            navigator: navigator.clone(),
            pending: pending.clone(),
            events: events.clone(),
        };

        let trackers = vec![
            IntegrationTracker::with_revoke(gmail.clone(), deps.clone()),
            IntegrationTracker::new(slack.clone(), deps.clone()),
        ];
        let coordinator = ConnectionCoordinator::new(session.clone(), trackers, events.clone());
        coordinator.start();

        let callback = OAuthCallbackHandler::new(
            coordinator.clone(),
            session.clone(),
            &deps,
            &Settings::default(),
        );

        Self {
            identity,
            events,
            session,
            gmail,
            slack,
            navigator,
            pending,
            coordinator,
            callback,
            recorded,
        }
    }

    /// Waits until no integration is unknown or checking.
    pub async fn settled(&self) {
        let mut rx = self.coordinator.watch();
        rx.wait_for(|state| !state.is_settling()).await.unwrap();
    }

    /// Status events published for `provider`, in order.
    pub fn status_events(&self, provider: Provider) -> Vec<IntegrationStatus> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                AppEvent::IntegrationStatusChanged { provider: p, status } if *p == provider => {
                    Some(status.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                AppEvent::ShowNotification(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        self.recorded.lock().unwrap().clear();
    }

    pub fn total_status_calls(&self) -> usize {
        self.gmail.status_calls() + self.slack.status_calls()
    }
}
