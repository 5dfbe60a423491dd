//! Authenticated request gateway.
//!
//! Every outbound backend call goes through [`ApiClient`]. When a session
//! exists a fresh bearer token is minted for the request; when minting fails
//! the request is still sent without a credential so the backend produces a
//! uniform 401 instead of a client-side error. There is no retry here.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::BackendSettings;
use crate::providers::identity::TokenError;
use crate::services::SessionStore;

/// Errors returned by the backend gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The backend rejected the request as unauthenticated (HTTP 401).
    #[error("not authenticated")]
    Unauthenticated,

    /// Any other non-success response.
    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the expected contract.
    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// HTTP client for the backend REST surface.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionStore,
}

impl ApiClient {
    /// Creates a client for the configured backend.
    pub fn new(settings: &BackendSettings, session: SessionStore) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        Self::with_base_url(base_url, settings.request_timeout(), session)
    }

    /// Creates a client for an explicit base URL.
    pub fn with_base_url(mut base_url: Url, timeout: Duration, session: SessionStore) -> Result<Self> {
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.http.get(self.url(path)?);
        let response = self.send(request).await?;
        Self::handle_response(response).await
    }

    /// POST to `path` without a body and decode the JSON response.
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.http.post(self.url(path)?);
        let response = self.send(request).await?;
        Self::handle_response(response).await
    }

    /// PUT a JSON body to `path` and decode the JSON response.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.http.put(self.url(path)?).json(body);
        let response = self.send(request).await?;
        Self::handle_response(response).await
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorize(request)
            .await
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.access_token().await {
            Ok(token) => request.bearer_auth(token.as_str()),
            Err(TokenError::NoSession) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Token mint failed, sending request without credential");
                request
            }
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body, status);
            tracing::debug!(status = status.as_u16(), %message, "Backend request failed");
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

/// Extracts a human-readable message from an error body.
///
/// FastAPI style `{"detail": ..}` and `{"message": ..}` bodies are
/// unwrapped; anything else falls back to the raw text or the status reason.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message"] {
            if let Some(text) = json.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}
