//! Messaging integration backend (Slack).
//!
//! Slack has no revoke endpoint; only status and connect are implemented.

use async_trait::async_trait;
use serde::Deserialize;

use super::traits::ConnectResponse;
use super::{ApiClient, IntegrationBackend, Result, StatusReport};
use crate::domain::Provider;

const STATUS_PATH: &str = "oauth/slack-status";
const CONNECT_PATH: &str = "oauth/connect-slack";

#[derive(Debug, Deserialize)]
struct SlackStatusResponse {
    connected: bool,
    #[serde(default)]
    workspace: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SlackBackend {
    client: ApiClient,
}

impl SlackBackend {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntegrationBackend for SlackBackend {
    fn provider(&self) -> Provider {
        Provider::Slack
    }

    async fn fetch_status(&self) -> Result<StatusReport> {
        let response: SlackStatusResponse = self.client.get(STATUS_PATH).await?;
        if response.connected {
            Ok(StatusReport::Connected {
                identifier: response.workspace.unwrap_or_default(),
                expires_at: None,
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
