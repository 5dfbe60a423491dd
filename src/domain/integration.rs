//! Integration connection status types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Provider, Session};

/// Reason recorded on every integration when the session ends.
pub const SIGNED_OUT_REASON: &str = "signed out";

/// Latest known connection status of one integration.
///
/// Exactly one variant is active per provider. A refresh cycle always moves
/// through [`IntegrationStatus::Checking`] and ends in `Connected`,
/// `Disconnected` or `Error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntegrationStatus {
    /// Not yet checked.
    #[default]
    Unknown,
    /// A refresh is in flight.
    Checking,
    /// The backend holds an active grant.
    Connected {
        /// Provider-specific account identifier (email address, workspace name).
        identifier: String,
        /// When the grant expires, if the provider reports it.
        expires_at: Option<DateTime<Utc>>,
    },
    /// The backend confirmed there is no active grant.
    Disconnected {
        /// Why the integration is disconnected, if known.
        reason: Option<String>,
    },
    /// The refresh itself failed; the grant state is unknown.
    Error {
        /// Transport or parse failure description.
        message: String,
    },
}

impl IntegrationStatus {
    pub fn connected(identifier: impl Into<String>) -> Self {
        Self::Connected {
            identifier: identifier.into(),
            expires_at: None,
        }
    }

    pub fn disconnected(reason: Option<String>) -> Self {
        Self::Disconnected { reason }
    }

    /// Status applied to every integration when nobody is signed in.
    pub fn signed_out() -> Self {
        Self::Disconnected {
            reason: Some(SIGNED_OUT_REASON.to_string()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_checking(&self) -> bool {
        matches!(self, Self::Checking)
    }

    /// Account identifier when connected.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Connected { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    /// Short label for logs and the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Checking => "checking",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Error { .. } => "error",
        }
    }
}

/// Merged view handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorState {
    /// The current session, if any.
    pub session: Option<Session>,
    /// Status of every registered integration.
    pub statuses: BTreeMap<Provider, IntegrationStatus>,
}

impl CoordinatorState {
    pub fn status(&self, provider: Provider) -> IntegrationStatus {
        self.statuses.get(&provider).cloned().unwrap_or_default()
    }

    /// Whether any integration still has a refresh in flight.
    pub fn is_settling(&self) -> bool {
        self.statuses
            .values()
            .any(|s| matches!(s, IntegrationStatus::Checking | IntegrationStatus::Unknown))
    }
}
