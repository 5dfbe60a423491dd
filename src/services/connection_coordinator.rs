//! Connection coordinator.
//!
//! Composes one [`IntegrationTracker`] per provider and keeps all of them in
//! step with the session:
//!
//! - session absent: every tracker is reset to signed out, no network calls
//! - new session (from absent, or a different user): reset to unknown, then
//!   refresh every tracker concurrently
//! - same principal re-emitted: snapshot only, no refresh
//!
//! The merged [`CoordinatorState`] is exposed through a `watch` channel and
//! individual status changes through a `broadcast` stream.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use url::Url;

use super::integration_tracker::{ConnectError, IntegrationTracker, RevokeError};
use super::session_store::{SessionStore, SessionSubscription};
use crate::app::{AppEvent, EventBus, SubscriberId};
use crate::domain::{CoordinatorState, IntegrationStatus, Provider, Session, SessionState};

/// Errors from coordinator pass-through operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("no integration registered for {0}")]
    NotRegistered(Provider),
}

/// A single provider status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub provider: Provider,
    pub status: IntegrationStatus,
}

enum SessionAction {
    SignedOut,
    Resync,
    Snapshot,
}

/// Single read/action surface over every integration.
pub struct ConnectionCoordinator {
    session: SessionStore,
    trackers: BTreeMap<Provider, IntegrationTracker>,
    /// Last session acted upon.
    current: Mutex<Option<Session>>,
    subscription: Mutex<Option<SessionSubscription>>,
    bus_subscription: Mutex<Option<SubscriberId>>,
    snapshot: watch::Sender<CoordinatorState>,
    changes: broadcast::Sender<StatusChange>,
    events: EventBus,
}

impl ConnectionCoordinator {
    /// Creates a coordinator over `trackers`. Call [`start`](Self::start) to
    /// begin following the session.
    pub fn new(
        session: SessionStore,
        trackers: impl IntoIterator<Item = IntegrationTracker>,
        events: EventBus,
    ) -> Arc<Self> {
        let trackers: BTreeMap<Provider, IntegrationTracker> = trackers
            .into_iter()
            .map(|tracker| (tracker.provider(), tracker))
            .collect();
        let initial = CoordinatorState {
            session: None,
            statuses: trackers
                .iter()
                .map(|(provider, tracker)| (*provider, tracker.status()))
                .collect(),
        };
        let (snapshot, _) = watch::channel(initial);
        let (changes, _) = broadcast::channel(64);

        Arc::new(Self {
            session,
            trackers,
            current: Mutex::new(None),
            subscription: Mutex::new(None),
            bus_subscription: Mutex::new(None),
            snapshot,
            changes,
            events,
        })
    }

    /// Subscribes to status events and to the session store.
    ///
    /// The session listener fires immediately with the current state, so a
    /// session known at startup triggers the first refresh cycle right away.
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let bus_id = self.events.subscribe(move |event| {
            if let AppEvent::IntegrationStatusChanged { provider, .. } = event {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.on_status_changed(*provider);
                }
            }
        });
        if let Some(previous) = lock(&self.bus_subscription).replace(bus_id) {
            self.events.unsubscribe(previous);
        }

        let weak = Arc::downgrade(self);
        let subscription = self.session.listen(move |state| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.on_session_state(state);
            }
        });
        *lock(&self.subscription) = Some(subscription);
        tracing::debug!(providers = self.trackers.len(), "Connection coordinator started");
    }

    fn on_session_state(&self, state: &SessionState) {
        if state.initializing {
            return;
        }

        let action = {
            let mut current = lock(&self.current);
            let action = match (current.as_ref(), state.session.as_ref()) {
                (_, None) => SessionAction::SignedOut,
                (Some(previous), Some(next)) if previous.is_same_principal(next) => {
                    SessionAction::Snapshot
                }
                (_, Some(_)) => SessionAction::Resync,
            };
            *current = state.session.clone();
            action
        };

        self.snapshot.send_modify(|snapshot| {
            snapshot.session = state.session.clone();
        });

        match action {
            SessionAction::SignedOut => {
                tracing::info!("No session, marking integrations signed out");
                for tracker in self.trackers.values() {
                    tracker.reset(IntegrationStatus::signed_out());
                }
            }
            SessionAction::Resync => {
                tracing::info!(
                    user_id = %state.session.as_ref().map(|s| s.user_id.to_string()).unwrap_or_default(),
                    "New session, refreshing integrations"
                );
                for tracker in self.trackers.values() {
                    tracker.reset(IntegrationStatus::Unknown);
                }
                for tracker in self.trackers.values() {
                    // Driven by a spawned task; the handle is not needed here.
                    let _ = tracker.start_refresh();
                }
            }
            SessionAction::Snapshot => {
                tracing::debug!("Same principal re-emitted, statuses kept");
            }
        }
    }

    fn on_status_changed(&self, provider: Provider) {
        let Some(tracker) = self.trackers.get(&provider) else {
            return;
        };
        // Read back from the tracker: events from different tasks may be
        // delivered out of order, the tracker is authoritative.
        let current = tracker.status();
        let changed = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.statuses.get(&provider) == Some(&current) {
                false
            } else {
                snapshot.statuses.insert(provider, current.clone());
                true
            }
        });
        if changed {
            let _ = self.changes.send(StatusChange {
                provider,
                status: current,
            });
        }
    }

    /// Merged view of the session and every integration.
    pub fn state(&self) -> CoordinatorState {
        CoordinatorState {
            session: lock(&self.current).clone(),
            statuses: self
                .trackers
                .iter()
                .map(|(provider, tracker)| (*provider, tracker.status()))
                .collect(),
        }
    }

    pub fn status(&self, provider: Provider) -> IntegrationStatus {
        self.trackers
            .get(&provider)
            .map(IntegrationTracker::status)
            .unwrap_or_default()
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.trackers.keys().copied().collect()
    }

    pub fn tracker(&self, provider: Provider) -> Option<&IntegrationTracker> {
        self.trackers.get(&provider)
    }

    /// Refreshes one provider. Without a session nothing is sent and the
    /// current status is returned.
    pub async fn refresh(&self, provider: Provider) -> Result<IntegrationStatus, CoordinatorError> {
        let tracker = self
            .trackers
            .get(&provider)
            .ok_or(CoordinatorError::NotRegistered(provider))?;
        if self.session.current_session().is_none() {
            tracing::debug!(provider = %provider, "Refresh skipped, not signed in");
            return Ok(tracker.status());
        }
        Ok(tracker.refresh().await)
    }

    /// Refreshes every provider concurrently.
    pub async fn refresh_all(&self) -> Vec<(Provider, IntegrationStatus)> {
        if self.session.current_session().is_none() {
            return self
                .trackers
                .iter()
                .map(|(provider, tracker)| (*provider, tracker.status()))
                .collect();
        }
        let refreshes = self.trackers.iter().map(|(provider, tracker)| {
            let provider = *provider;
            async move { (provider, tracker.refresh().await) }
        });
        join_all(refreshes).await
    }

    pub async fn begin_connect(&self, provider: Provider) -> Result<Url, ConnectError> {
        self.trackers
            .get(&provider)
            .ok_or(ConnectError::NotRegistered(provider))?
            .begin_connect()
            .await
    }

    pub async fn revoke(&self, provider: Provider) -> Result<IntegrationStatus, RevokeError> {
        self.trackers
            .get(&provider)
            .ok_or(RevokeError::NotRegistered(provider))?
            .revoke()
            .await
    }

    pub fn supports_revoke(&self, provider: Provider) -> bool {
        self.trackers
            .get(&provider)
            .is_some_and(IntegrationTracker::supports_revoke)
    }

    /// Whether a connect or revoke for `provider` is being awaited.
    pub fn is_busy(&self, provider: Provider) -> bool {
        self.trackers
            .get(&provider)
            .is_some_and(IntegrationTracker::is_busy)
    }

    pub fn watch(&self) -> watch::Receiver<CoordinatorState> {
        self.snapshot.subscribe()
    }

    /// Stream of individual status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }
}

impl Drop for ConnectionCoordinator {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.bus_subscription).take() {
            self.events.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for ConnectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
