//! Integration backend traits.
//!
//! Providers differ in what they support: every integration can report its
//! status and start a connect flow, only some can revoke. Revocation is a
//! separate trait so a provider never has to stub it out.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::Result;
use crate::domain::{IntegrationStatus, Provider};

/// Status reported by a provider's status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// The backend holds an active grant.
    Connected {
        identifier: String,
        expires_at: Option<DateTime<Utc>>,
    },
    /// The backend confirmed there is no active grant.
    Disconnected { reason: Option<String> },
}

impl From<StatusReport> for IntegrationStatus {
    fn from(report: StatusReport) -> Self {
        match report {
            StatusReport::Connected {
                identifier,
                expires_at,
            } => IntegrationStatus::Connected {
                identifier,
                expires_at,
            },
            StatusReport::Disconnected { reason } => IntegrationStatus::Disconnected { reason },
        }
    }
}

/// Result of a revoke call that reached the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevokeOutcome {
    pub revoked: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Status and connect operations every integration supports.
#[async_trait]
pub trait IntegrationBackend: Send + Sync {
    fn provider(&self) -> Provider;

    /// Asks the backend whether it holds a grant for this provider.
    async fn fetch_status(&self) -> Result<StatusReport>;

    /// Starts a connect flow, returning the authorization URL if the backend
    /// produced one.
    async fn initiate_connect(&self) -> Result<Option<String>>;
}

/// Optional revoke capability.
#[async_trait]
pub trait RevocableBackend: Send + Sync {
    async fn revoke(&self) -> Result<RevokeOutcome>;
}

/// Response of every `connect-*` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ConnectResponse {
    #[serde(default)]
    pub auth_url: Option<String>,
}

/// Parses a backend expiry timestamp.
///
/// Accepts RFC 3339 and naive ISO-8601 (read as UTC). Anything else is
/// dropped with a warning rather than failing the whole status.
pub(crate) fn parse_expiry(provider: Provider, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    tracing::warn!(provider = %provider, expires_at = raw, "Ignoring unparseable expiry");
    None
}
