//! Event bus for cross-component communication.
//!
//! The session store, integration trackers and callback handler publish
//! [`AppEvent`]s; the presentation layer subscribes to render toasts, status
//! badges and navigation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::Route;
use crate::domain::{IntegrationStatus, Provider, UserId};

/// Domain events for cross-component communication.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The session store reported a new session value.
    SessionChanged {
        /// The signed-in user, or `None` after sign-out.
        user_id: Option<UserId>,
    },
    /// An integration moved to a new status.
    IntegrationStatusChanged {
        provider: Provider,
        status: IntegrationStatus,
    },
    /// Show a transient notice.
    ShowNotification(Notification),
    /// Navigate within the application.
    NavigateTo(Route),
}

/// A user notification (toast).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Unique ID for this notification.
    pub id: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: Option<String>,
    /// Notification severity level.
    pub level: NotificationLevel,
    /// Auto-dismiss after duration (milliseconds).
    pub auto_dismiss_ms: Option<u64>,
}

/// Notification severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Notification {
    fn with_level(title: impl Into<String>, level: NotificationLevel, dismiss: Option<u64>) -> Self {
        Self {
            id: format!("notif-{}", uuid::Uuid::new_v4()),
            title: title.into(),
            body: None,
            level,
            auto_dismiss_ms: dismiss,
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::with_level(title, NotificationLevel::Info, Some(5000))
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::with_level(title, NotificationLevel::Success, Some(3000))
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::with_level(title, NotificationLevel::Warning, Some(8000))
    }

    /// Error notices are dismissed automatically too; nothing in the
    /// connection core is fatal.
    pub fn error(title: impl Into<String>) -> Self {
        Self::with_level(title, NotificationLevel::Error, Some(8000))
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Subscriber ID for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type EventHandler = Arc<dyn Fn(&AppEvent) + Send + Sync>;

/// Publish-subscribe bus shared by every component of an [`AppContext`](super::AppContext).
///
/// Handlers run synchronously on the publishing task, outside of any internal
/// lock, so a handler may publish or subscribe itself.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<u64, EventHandler>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all events.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&AppEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::new(handler));
        SubscriberId(id)
    }

    /// Subscribe through a channel, for consumers living on their own task.
    ///
    /// The subscription ends when the receiver is dropped and the next event
    /// fails to deliver.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<AppEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = self.clone();
        let id = Arc::new(Mutex::new(None::<SubscriberId>));
        let slot = Arc::clone(&id);
        let sub = self.subscribe(move |event| {
            if tx.send(event.clone()).is_err() {
                if let Some(own) = slot.lock().ok().and_then(|mut s| s.take()) {
                    bus.unsubscribe(own);
                }
            }
        });
        if let Ok(mut slot) = id.lock() {
            *slot = Some(sub);
        }
        rx
    }

    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.lock().remove(&subscriber_id.0);
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AppEvent) {
        let handlers: Vec<EventHandler> = self.lock().values().cloned().collect();
        for handler in handlers {
            handler(&event);
        }
    }

    /// Shorthand for publishing a [`AppEvent::ShowNotification`].
    pub fn notify(&self, notification: Notification) {
        tracing::debug!(title = %notification.title, level = ?notification.level, "Notification");
        self.publish(AppEvent::ShowNotification(notification));
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, EventHandler>> {
        // A panicking handler never runs under this lock, so poisoning only
        // means a panic elsewhere; the map itself is still consistent.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
