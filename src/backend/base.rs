use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::User;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("error sending request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected the request with status {status}")]
    Rejected {
        status: StatusCode,
        /// `toastMessage` from the error body, when the backend sent one.
        message: Option<String>,
    },
    #[error("profile response did not contain a user")]
    MissingUser,
    #[error("error parsing response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BackendError {
    /// Human-readable message supplied by the backend, if any.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            BackendError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Anything that can turn a bearer token into the user it belongs to.
///
/// Observers only see this trait, so tests can swap the HTTP client out.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, token: &str) -> Result<User, BackendError>;
}
