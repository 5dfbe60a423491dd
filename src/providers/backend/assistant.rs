//! Typed client for the assistant business endpoints.
//!
//! Processing itself happens on the backend; this module only carries the
//! request and response contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiClient, Result};

/// Summary returned by a batch processing run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessSummary {
    #[serde(default)]
    pub processed: u32,
}

/// One entry of the processing history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEmail {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub processed_at: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    emails: Vec<ProcessedEmail>,
}

/// Per-user assistant preferences.
///
/// Missing fields in a backend response fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub auto_reply: bool,
    pub auto_reply_prefix: String,
    pub slack_notifications: bool,
    pub slack_channel: String,
    pub use_web_search: bool,
    pub max_emails_per_batch: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            auto_reply: false,
            auto_reply_prefix: "[AI Assistant]".to_string(),
            slack_notifications: false,
            slack_channel: "#email-notifications".to_string(),
            use_web_search: true,
            max_emails_per_batch: 10,
        }
    }
}

/// Business endpoints reached through the authenticated gateway.
#[derive(Debug, Clone)]
pub struct AssistantApi {
    client: ApiClient,
}

impl AssistantApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `POST /emails/process`
    pub async fn process_emails(&self, max_emails: Option<u32>) -> Result<ProcessSummary> {
        let path = match max_emails {
            Some(max) => format!("emails/process?max_emails={max}"),
            None => "emails/process".to_string(),
        };
        self.client.post(&path).await
    }

    /// `GET /emails/history`
    pub async fn email_history(&self, limit: Option<u32>) -> Result<Vec<ProcessedEmail>> {
        let path = match limit {
            Some(limit) => format!("emails/history?limit={limit}"),
            None => "emails/history".to_string(),
        };
        let response: HistoryResponse = self.client.get(&path).await?;
        Ok(response.emails)
    }

    /// `POST /emails/{id}/process`
    pub async fn process_email(&self, email_id: &str) -> Result<serde_json::Value> {
        let path = format!("emails/{}/process", urlencoding::encode(email_id));
        self.client.post(&path).await
    }

    /// `GET /user/settings`
    pub async fn user_settings(&self) -> Result<UserSettings> {
        self.client.get("user/settings").await
    }

    /// `PUT /user/settings`
    pub async fn update_user_settings(&self, settings: &UserSettings) -> Result<serde_json::Value> {
        self.client.put("user/settings", settings).await
    }
}
