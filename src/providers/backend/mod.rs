//! Backend REST surface.
//!
//! - [`ApiClient`] - the authenticated request gateway
//! - [`GmailBackend`], [`SlackBackend`] - per-integration status, connect and revoke calls
//! - [`AssistantApi`] - typed business endpoints

mod assistant;
mod client;
mod gmail;
mod slack;
mod traits;

pub use assistant::{AssistantApi, ProcessSummary, ProcessedEmail, UserSettings};
pub use client::{ApiClient, ApiError, Result};
pub use gmail::GmailBackend;
pub use slack::SlackBackend;
pub use traits::{IntegrationBackend, RevocableBackend, RevokeOutcome, StatusReport};
