//! Assistant operations gated on integration state.

use std::sync::Arc;

use thiserror::Error;

use super::ConnectionCoordinator;
use crate::domain::Provider;
use crate::providers::backend::{
    ApiError, AssistantApi, ProcessSummary, ProcessedEmail, UserSettings,
};

/// Errors from assistant operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistantError {
    /// Processing needs a connected mail integration.
    #[error("connect Gmail before processing emails")]
    MailNotConnected,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type for assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;

/// Email processing and user settings.
#[derive(Debug, Clone)]
pub struct AssistantService {
    api: AssistantApi,
    coordinator: Arc<ConnectionCoordinator>,
}

impl AssistantService {
    pub fn new(api: AssistantApi, coordinator: Arc<ConnectionCoordinator>) -> Self {
        Self { api, coordinator }
    }

    /// Runs a processing batch. Refused unless mail is connected.
    pub async fn process_emails(&self, max_emails: Option<u32>) -> AssistantResult<ProcessSummary> {
        if !self.coordinator.status(Provider::Gmail).is_connected() {
            return Err(AssistantError::MailNotConnected);
        }
        let summary = self.api.process_emails(max_emails).await?;
        tracing::info!(processed = summary.processed, "Processed emails");
        Ok(summary)
    }

    pub async fn history(&self, limit: Option<u32>) -> AssistantResult<Vec<ProcessedEmail>> {
        Ok(self.api.email_history(limit).await?)
    }

    pub async fn process_email(&self, email_id: &str) -> AssistantResult<serde_json::Value> {
        if !self.coordinator.status(Provider::Gmail).is_connected() {
            return Err(AssistantError::MailNotConnected);
        }
        Ok(self.api.process_email(email_id).await?)
    }

    pub async fn settings(&self) -> AssistantResult<UserSettings> {
        Ok(self.api.user_settings().await?)
    }

    pub async fn update_settings(&self, settings: &UserSettings) -> AssistantResult<()> {
        self.api.update_user_settings(settings).await?;
        tracing::info!("User settings saved");
        Ok(())
    }
}
