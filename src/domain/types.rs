//! Core identifier types for domain entities.
//!
//! These newtype wrappers provide type safety for identifiers, preventing
//! accidental mixing of user ids with provider names or free-form strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of the signed-in principal, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A third-party integration the application can connect to via OAuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// The mail provider (Gmail).
    Gmail,
    /// The messaging provider (Slack).
    Slack,
}

impl Provider {
    /// Every provider known to the application, in display order.
    pub const ALL: [Provider; 2] = [Provider::Gmail, Provider::Slack];

    /// Wire and route name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Slack => "slack",
        }
    }

    /// Human-readable name for notifications.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Gmail => "Gmail",
            Provider::Slack => "Slack",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" | "mail" | "google" => Ok(Provider::Gmail),
            "slack" | "messaging" => Ok(Provider::Slack),
            _ => Err(UnknownProvider(s.to_owned())),
        }
    }
}
