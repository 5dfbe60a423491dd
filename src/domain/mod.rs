//! Domain layer types for the liaison client core.
//!
//! Sessions, provider identifiers and integration connection statuses.

mod integration;
mod session;
mod types;

pub use integration::{CoordinatorState, IntegrationStatus, SIGNED_OUT_REASON};
pub use session::{Session, SessionState};
pub use types::{Provider, UnknownProvider, UserId};
