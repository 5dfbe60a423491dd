//! Session and connection services.
//!
//! # Architecture
//!
//! ```text
//! Identity provider -> SessionStore -> ConnectionCoordinator -> IntegrationTracker (per provider)
//!                          |                                          |
//!                          +------------> ApiClient <-----------------+
//! ```
//!
//! - [`SessionStore`]: owns the current session
//! - [`IntegrationTracker`]: one provider's status with refresh, connect and revoke
//! - [`ConnectionCoordinator`]: keeps every tracker in step with the session
//! - [`RouteGuard`]: gates navigation on the session
//! - [`OAuthCallbackHandler`]: resumes after the external consent flow
//! - [`AssistantService`]: business operations gated on integration state

mod assistant_service;
mod connection_coordinator;
mod integration_tracker;
mod oauth_callback;
mod route_guard;
mod session_store;

pub use assistant_service::{AssistantError, AssistantResult, AssistantService};
pub use connection_coordinator::{ConnectionCoordinator, CoordinatorError, StatusChange};
pub use integration_tracker::{ConnectError, IntegrationTracker, RevokeError, TrackerDeps};
pub use oauth_callback::{CallbackError, CallbackOutcome, CallbackParams, OAuthCallbackHandler};
pub use route_guard::{guest_only, protected, GuardDecision, RouteGuard};
pub use session_store::{SessionStore, SessionSubscription};
