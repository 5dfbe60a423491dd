//! Mail integration backend (Gmail).
//!
//! Endpoints:
//! - `GET /oauth/gmail-status`
//! - `GET /oauth/connect-gmail`
//! - `POST /oauth/revoke-gmail`

use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{parse_expiry, ConnectResponse};
use super::{ApiClient, IntegrationBackend, Result, RevocableBackend, RevokeOutcome, StatusReport};
use crate::domain::Provider;

const STATUS_PATH: &str = "oauth/gmail-status";
const CONNECT_PATH: &str = "oauth/connect-gmail";
const REVOKE_PATH: &str = "oauth/revoke-gmail";

#[derive(Debug, Deserialize)]
struct GmailStatusResponse {
    authenticated: bool,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Gmail status, connect and revoke calls.
#[derive(Debug, Clone)]
pub struct GmailBackend {
    client: ApiClient,
}

impl GmailBackend {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntegrationBackend for GmailBackend {
    fn provider(&self) -> Provider {
        Provider::Gmail
    }

    async fn fetch_status(&self) -> Result<StatusReport> {
        let response: GmailStatusResponse = self.client.get(STATUS_PATH).await?;
        if response.authenticated {
            Ok(StatusReport::Connected {
                identifier: response.email.unwrap_or_default(),
                expires_at: parse_expiry(Provider::Gmail, response.expires_at.as_deref()),
            })
        } else {
            Ok(StatusReport::Disconnected {
                reason: response.reason,
            })
        }
    }

    async fn initiate_connect(&self) -> Result<Option<String>> {
        let response: ConnectResponse = self.client.get(CONNECT_PATH).await?;
        Ok(response.auth_url)
    }
}

#[async_trait]
impl RevocableBackend for GmailBackend {
    async fn revoke(&self) -> Result<RevokeOutcome> {
        let outcome: RevokeOutcome = self.client.post(REVOKE_PATH).await?;
        tracing::info!(revoked = outcome.revoked, "Gmail revoke response");
        Ok(outcome)
    }
}
