//! Per-integration connection status tracker.
//!
//! One [`IntegrationTracker`] per provider owns that provider's
//! [`IntegrationStatus`] and the refresh, connect and revoke operations.
//!
//! # Refresh cycles
//!
//! Every refresh bumps a cycle counter and records the in-flight request as a
//! shared future. Further refresh calls join that future instead of issuing a
//! second request. [`IntegrationTracker::reset`] bumps the cycle as well, so a
//! response that arrives after a reset is dropped instead of applied.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use url::Url;

use crate::app::{AppEvent, EventBus, NavigationError, Navigator, Notification};
use crate::domain::{IntegrationStatus, Provider};
use crate::providers::backend::{ApiError, IntegrationBackend, RevocableBackend};
use crate::storage::{PendingConnect, PendingConnectStore, PendingStoreError};

/// Errors from starting a connect flow. The tracked status is never changed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no integration registered for {0}")]
    NotRegistered(Provider),

    #[error("connect request failed: {0}")]
    Api(#[from] ApiError),

    #[error("backend did not return an authorization url")]
    MissingAuthUrl,

    #[error("invalid authorization url '{url}': {reason}")]
    InvalidAuthUrl { url: String, reason: String },

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("failed to record pending connect: {0}")]
    Storage(#[from] PendingStoreError),
}

/// Errors from revoking access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevokeError {
    #[error("no integration registered for {0}")]
    NotRegistered(Provider),

    #[error("{0} does not support revoking access")]
    Unsupported(Provider),

    /// The backend answered but refused; carries its message.
    #[error("{message}")]
    Rejected { message: String },

    #[error("revoke request failed: {0}")]
    Api(#[from] ApiError),
}

/// Collaborators shared by every tracker.
#[derive(Clone)]
pub struct TrackerDeps {
    pub navigator: Arc<dyn Navigator>,
    pub pending: Arc<dyn PendingConnectStore>,
    pub events: EventBus,
}

type RefreshFuture = Shared<BoxFuture<'static, IntegrationStatus>>;

#[derive(Default)]
struct TrackerState {
    status: IntegrationStatus,
    /// Bumped on every refresh start and every reset.
    cycle: u64,
    /// Bumped on reset only.
    generation: u64,
    in_flight: Option<RefreshFuture>,
    connecting: bool,
    revoking: bool,
}

struct Inner {
    provider: Provider,
    backend: Arc<dyn IntegrationBackend>,
    revoker: Option<Arc<dyn RevocableBackend>>,
    deps: TrackerDeps,
    state: Mutex<TrackerState>,
}

#[derive(Clone, Copy)]
enum Action {
    Connect,
    Revoke,
}

/// Owns one provider's connection status.
#[derive(Clone)]
pub struct IntegrationTracker {
    inner: Arc<Inner>,
}

impl IntegrationTracker {
    /// Tracker for a provider without revoke support.
    pub fn new(backend: Arc<dyn IntegrationBackend>, deps: TrackerDeps) -> Self {
        Self::build(backend, None, deps)
    }

    /// Tracker for a provider that can also revoke.
    pub fn with_revoke<B>(backend: Arc<B>, deps: TrackerDeps) -> Self
    where
        B: IntegrationBackend + RevocableBackend + 'static,
    {
        let revoker: Arc<dyn RevocableBackend> = backend.clone();
        Self::build(backend, Some(revoker), deps)
    }

    fn build(
        backend: Arc<dyn IntegrationBackend>,
        revoker: Option<Arc<dyn RevocableBackend>>,
        deps: TrackerDeps,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider: backend.provider(),
                backend,
                revoker,
                deps,
                state: Mutex::new(TrackerState::default()),
            }),
        }
    }

    pub fn provider(&self) -> Provider {
        self.inner.provider
    }

    pub fn status(&self) -> IntegrationStatus {
        self.lock().status.clone()
    }

    pub fn supports_revoke(&self) -> bool {
        self.inner.revoker.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.lock().connecting
    }

    pub fn is_revoking(&self) -> bool {
        self.lock().revoking
    }

    /// Whether a connect or revoke is being awaited.
    pub fn is_busy(&self) -> bool {
        let state = self.lock();
        state.connecting || state.revoking
    }

    /// Starts a refresh, or joins the one already in flight.
    ///
    /// The returned future resolves to the status after the cycle; when the
    /// response was discarded as stale it resolves to whatever is current.
    pub fn start_refresh(&self) -> RefreshFuture {
        let provider = self.inner.provider;
        let (refresh, cycle) = {
            let mut state = self.lock();
            if let Some(in_flight) = &state.in_flight {
                tracing::debug!(provider = %provider, "Joining in-flight refresh");
                return in_flight.clone();
            }
            state.cycle += 1;
            let cycle = state.cycle;
            state.status = IntegrationStatus::Checking;

            let tracker = self.clone();
            let refresh = async move { tracker.run_refresh(cycle).await }
                .boxed()
                .shared();
            state.in_flight = Some(refresh.clone());
            (refresh, cycle)
        };

        tracing::debug!(provider = %provider, cycle, "Refreshing status");
        self.publish(IntegrationStatus::Checking);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(refresh.clone());
            }
            Err(_) => {
                tracing::warn!(provider = %provider, "No runtime, refresh runs when awaited");
            }
        }
        refresh
    }

    /// Refreshes the status and waits for the outcome.
    pub async fn refresh(&self) -> IntegrationStatus {
        self.start_refresh().await
    }

    async fn run_refresh(self, cycle: u64) -> IntegrationStatus {
        let provider = self.inner.provider;
        let fetched = match self.inner.backend.fetch_status().await {
            Ok(report) => IntegrationStatus::from(report),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Status refresh failed");
                IntegrationStatus::error(e.to_string())
            }
        };

        {
            let mut state = self.lock();
            if state.cycle != cycle {
                tracing::debug!(
                    provider = %provider,
                    cycle,
                    current = state.cycle,
                    "Discarding stale status response"
                );
                return state.status.clone();
            }
            state.status = fetched.clone();
            state.in_flight = None;
        }

        tracing::info!(provider = %provider, status = fetched.label(), "Status refreshed");
        self.publish(fetched.clone());
        fetched
    }

    /// Forces `status` and invalidates any refresh in flight.
    pub fn reset(&self, status: IntegrationStatus) {
        let changed = {
            let mut state = self.lock();
            state.cycle += 1;
            state.generation += 1;
            if state.in_flight.take().is_some() {
                tracing::debug!(provider = %self.inner.provider, "Abandoning in-flight refresh");
            }
            let changed = state.status != status;
            state.status = status.clone();
            changed
        };
        if changed {
            self.publish(status);
        }
    }

    /// Asks the backend for an authorization URL and hands the browser to it.
    ///
    /// On success the consent page owns the flow; it resumes through the OAuth
    /// callback. On failure the status is left untouched.
    pub async fn begin_connect(&self) -> Result<Url, ConnectError> {
        let _busy = self.mark_busy(Action::Connect);
        let provider = self.inner.provider;

        let result = self.connect().await;
        match &result {
            Ok(url) => {
                tracing::info!(
                    provider = %provider,
                    host = url.host_str().unwrap_or_default(),
                    "Handed off to consent page"
                );
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Connect failed");
                self.inner.deps.events.notify(
                    Notification::error("Connection Error").with_body(format!(
                        "Failed to connect {}: {e}",
                        provider.display_name()
                    )),
                );
            }
        }
        result
    }

    async fn connect(&self) -> Result<Url, ConnectError> {
        let provider = self.inner.provider;
        let raw = self
            .inner
            .backend
            .initiate_connect()
            .await?
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(ConnectError::MissingAuthUrl)?;

        let url = Url::parse(&raw).map_err(|e| ConnectError::InvalidAuthUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConnectError::InvalidAuthUrl {
                url: raw,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let state = url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned());
        let deps = &self.inner.deps;
        deps.pending
            .save(&PendingConnect::new(provider, state))
            .await?;

        if let Err(e) = deps.navigator.open_external(&url) {
            if let Err(cleanup) = deps.pending.take().await {
                tracing::debug!(provider = %provider, error = %cleanup, "Failed to drop pending connect");
            }
            return Err(e.into());
        }
        Ok(url)
    }

    /// Revokes the grant and refreshes on confirmation.
    ///
    /// A backend refusal surfaces the server message and leaves the status as
    /// it was.
    pub async fn revoke(&self) -> Result<IntegrationStatus, RevokeError> {
        let provider = self.inner.provider;
        let revoker = self
            .inner
            .revoker
            .clone()
            .ok_or(RevokeError::Unsupported(provider))?;
        let _busy = self.mark_busy(Action::Revoke);
        let generation = self.lock().generation;
        let events = &self.inner.deps.events;

        let outcome = match revoker.revoke().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Revoke request failed");
                events.notify(Notification::error("Revocation Error").with_body(e.to_string()));
                return Err(e.into());
            }
        };

        if !outcome.revoked {
            let message = outcome
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("Failed to revoke {} access", provider.display_name()));
            tracing::warn!(provider = %provider, %message, "Revoke rejected");
            events.notify(Notification::error("Revocation Error").with_body(message.clone()));
            return Err(RevokeError::Rejected { message });
        }

        tracing::info!(provider = %provider, "Access revoked");
        events.notify(
            Notification::success(format!("{} Disconnected", provider.display_name())).with_body(
                format!(
                    "Your {} account has been disconnected",
                    provider.display_name()
                ),
            ),
        );

        // A refresh started before the revocation would report the old grant.
        let earlier = {
            let state = self.lock();
            if state.generation != generation {
                return Ok(state.status.clone());
            }
            state.in_flight.clone()
        };
        if let Some(earlier) = earlier {
            earlier.await;
        }
        let current_generation = self.lock().generation;
        if current_generation != generation {
            return Ok(self.status());
        }
        Ok(self.refresh().await)
    }

    fn mark_busy(&self, action: Action) -> BusyGuard<'_> {
        self.set_busy(action, true);
        BusyGuard {
            tracker: self,
            action,
        }
    }

    fn set_busy(&self, action: Action, busy: bool) {
        let mut state = self.lock();
        match action {
            Action::Connect => state.connecting = busy,
            Action::Revoke => state.revoking = busy,
        }
    }

    fn publish(&self, status: IntegrationStatus) {
        self.inner
            .deps
            .events
            .publish(AppEvent::IntegrationStatusChanged {
                provider: self.inner.provider,
                status,
            });
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for IntegrationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationTracker")
            .field("provider", &self.inner.provider)
            .field("status", &self.status())
            .field("supports_revoke", &self.supports_revoke())
            .finish()
    }
}

/// Clears the busy flag for an action when dropped.
struct BusyGuard<'a> {
    tracker: &'a IntegrationTracker,
    action: Action,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.tracker.set_busy(self.action, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use crate::app::{MockNavigator, NotificationLevel};
    use crate::providers::backend::{RevokeOutcome, StatusReport};
    use crate::storage::MemoryPendingStore;

    // ========================================================================
    // Mock backend
    // ========================================================================

    struct MockBackend {
        provider: Provider,
        statuses: Mutex<VecDeque<Result<StatusReport, ApiError>>>,
        auth_url: Mutex<Result<Option<String>, ApiError>>,
        revokes: Mutex<VecDeque<Result<RevokeOutcome, ApiError>>>,
        status_calls: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockBackend {
        fn new(provider: Provider) -> Self {
            Self {
                provider,
                statuses: Mutex::new(VecDeque::new()),
                auth_url: Mutex::new(Ok(None)),
                revokes: Mutex::new(VecDeque::new()),
                status_calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(provider: Provider, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(provider)
            }
        }

        fn push_status(&self, status: Result<StatusReport, ApiError>) {
            self.statuses.lock().unwrap().push_back(status);
        }

        fn calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IntegrationBackend for MockBackend {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn fetch_status(&self) -> Result<StatusReport, ApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(StatusReport::Disconnected { reason: None }))
        }

        async fn initiate_connect(&self) -> Result<Option<String>, ApiError> {
            self.auth_url.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RevocableBackend for MockBackend {
        async fn revoke(&self) -> Result<RevokeOutcome, ApiError> {
            self.revokes.lock().unwrap().pop_front().unwrap_or(Ok(RevokeOutcome {
                revoked: true,
                message: None,
            }))
        }
    }

    fn connected(identifier: &str) -> StatusReport {
        StatusReport::Connected {
            identifier: identifier.into(),
            expires_at: None,
        }
    }

    fn deps(navigator: MockNavigator, events: EventBus) -> (TrackerDeps, Arc<MemoryPendingStore>) {
        let pending = Arc::new(MemoryPendingStore::new());
        let deps = TrackerDeps {
            navigator: Arc::new(navigator),
            pending: pending.clone(),
            events,
        };
        (deps, pending)
    }

    fn idle_navigator() -> MockNavigator {
        let mut navigator = MockNavigator::new();
        navigator.expect_open_external().never();
        navigator
    }

    fn recorded(events: &EventBus) -> Arc<Mutex<Vec<AppEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        events.subscribe(move |event| s.lock().unwrap().push(event.clone()));
        seen
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    #[tokio::test]
    async fn refresh_moves_through_checking() {
        let backend = Arc::new(MockBackend::new(Provider::Gmail));
        backend.push_status(Ok(connected("a@b.com")));
        let events = EventBus::new();
        let seen = recorded(&events);
        let (deps, _) = deps(idle_navigator(), events);
        let tracker = IntegrationTracker::with_revoke(backend.clone(), deps);

        let status = tracker.refresh().await;

        assert_eq!(status, IntegrationStatus::connected("a@b.com"));
        assert_eq!(tracker.status(), status);
        let statuses: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                AppEvent::IntegrationStatusChanged { status, .. } => Some(status.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![IntegrationStatus::Checking, status]);
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_request() {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(MockBackend::gated(Provider::Slack, gate.clone()));
        backend.push_status(Ok(connected("acme")));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::new(backend.clone(), deps);

        let first = tracker.start_refresh();
        let second = tracker.start_refresh();
        assert!(tracker.status().is_checking());

        gate.add_permits(1);
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a, b);
        assert_eq!(a, IntegrationStatus::connected("acme"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_maps_to_error() {
        let backend = Arc::new(MockBackend::new(Provider::Gmail));
        backend.push_status(Err(ApiError::Transport("connection refused".into())));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::new(backend, deps);

        match tracker.refresh().await {
            IntegrationStatus::Error { message } => assert!(message.contains("connection refused")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_discards_late_response() {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(MockBackend::gated(Provider::Gmail, gate.clone()));
        backend.push_status(Ok(connected("a@b.com")));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::new(backend.clone(), deps);

        let pending = tracker.start_refresh();
        tracker.reset(IntegrationStatus::signed_out());
        gate.add_permits(1);

        assert_eq!(pending.await, IntegrationStatus::signed_out());
        assert_eq!(tracker.status(), IntegrationStatus::signed_out());
    }

    #[tokio::test]
    async fn refresh_after_reset_issues_new_request() {
        let backend = Arc::new(MockBackend::new(Provider::Gmail));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::new(backend.clone(), deps);

        tracker.refresh().await;
        tracker.reset(IntegrationStatus::Unknown);
        tracker.refresh().await;

        assert_eq!(backend.calls(), 2);
    }

    // ========================================================================
    // Connect
    // ========================================================================

    #[tokio::test]
    async fn connect_records_state_and_opens_browser() {
        let backend = Arc::new(MockBackend::new(Provider::Gmail));
        *backend.auth_url.lock().unwrap() =
            Ok(Some("https://accounts.example.com/o/oauth2/auth?client_id=1&state=abc".into()));

        let mut navigator = MockNavigator::new();
        navigator
            .expect_open_external()
            .withf(|url| url.host_str() == Some("accounts.example.com"))
            .times(1)
            .returning(|_| Ok(()));
        let (deps, pending) = deps(navigator, EventBus::new());
        let tracker = IntegrationTracker::new(backend, deps);

        let url = tracker.begin_connect().await.unwrap();

        assert_eq!(url.query_pairs().count(), 2);
        let record = pending.peek().unwrap();
        assert_eq!(record.provider, Provider::Gmail);
        assert_eq!(record.state.as_deref(), Some("abc"));
        assert_eq!(tracker.status(), IntegrationStatus::Unknown);
        assert!(!tracker.is_busy());
    }

    #[tokio::test]
    async fn missing_auth_url_leaves_status_and_does_not_navigate() {
        let backend = Arc::new(MockBackend::new(Provider::Gmail));
        backend.push_status(Ok(connected("a@b.com")));
        let events = EventBus::new();
        let seen = recorded(&events);
        let (deps, pending) = deps(idle_navigator(), events);
        let tracker = IntegrationTracker::new(backend, deps);
        tracker.refresh().await;

        let result = tracker.begin_connect().await;

        assert!(matches!(result, Err(ConnectError::MissingAuthUrl)));
        assert_eq!(tracker.status(), IntegrationStatus::connected("a@b.com"));
        assert!(pending.peek().is_none());
        let toasts: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                AppEvent::ShowNotification(n) => Some(n.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].title, "Connection Error");
        assert_eq!(toasts[0].level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn non_http_auth_url_is_rejected() {
        let backend = Arc::new(MockBackend::new(Provider::Slack));
        *backend.auth_url.lock().unwrap() = Ok(Some("javascript:alert(1)".into()));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::new(backend, deps);

        assert!(matches!(
            tracker.begin_connect().await,
            Err(ConnectError::InvalidAuthUrl { .. })
        ));
    }

    #[tokio::test]
    async fn navigation_failure_drops_pending_record() {
        let backend = Arc::new(MockBackend::new(Provider::Slack));
        *backend.auth_url.lock().unwrap() = Ok(Some("https://slack.example.com/oauth".into()));
        let mut navigator = MockNavigator::new();
        navigator.expect_open_external().returning(|_| {
            Err(NavigationError::Browser(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no browser",
            )))
        });
        let (deps, pending) = deps(navigator, EventBus::new());
        let tracker = IntegrationTracker::new(backend, deps);

        assert!(matches!(
            tracker.begin_connect().await,
            Err(ConnectError::Navigation(_))
        ));
        assert!(pending.peek().is_none());
    }

    // ========================================================================
    // Revoke
    // ========================================================================

    #[tokio::test]
    async fn revoke_unsupported_without_capability() {
        let backend = Arc::new(MockBackend::new(Provider::Slack));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::new(backend, deps);

        assert!(!tracker.supports_revoke());
        assert_eq!(
            tracker.revoke().await,
            Err(RevokeError::Unsupported(Provider::Slack))
        );
    }

    #[tokio::test]
    async fn confirmed_revoke_refreshes() {
        let backend = Arc::new(MockBackend::new(Provider::Gmail));
        backend.push_status(Ok(connected("a@b.com")));
        backend.push_status(Ok(StatusReport::Disconnected { reason: None }));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::with_revoke(backend.clone(), deps);
        tracker.refresh().await;

        let status = tracker.revoke().await.unwrap();

        assert_eq!(status, IntegrationStatus::disconnected(None));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn rejected_revoke_keeps_status() {
        let backend = Arc::new(MockBackend::new(Provider::Gmail));
        backend.push_status(Ok(connected("a@b.com")));
        backend.revokes.lock().unwrap().push_back(Ok(RevokeOutcome {
            revoked: false,
            message: Some("grant still in use".into()),
        }));
        let (deps, _) = deps(idle_navigator(), EventBus::new());
        let tracker = IntegrationTracker::with_revoke(backend.clone(), deps);
        tracker.refresh().await;

        let result = tracker.revoke().await;

        assert_eq!(
            result,
            Err(RevokeError::Rejected {
                message: "grant still in use".into()
            })
        );
        assert_eq!(tracker.status(), IntegrationStatus::connected("a@b.com"));
        assert_eq!(backend.calls(), 1);
        assert!(!tracker.is_revoking());
    }
}
