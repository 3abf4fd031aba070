use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::base::{BackendError, ProfileFetcher};
use crate::config::BackendConfig;
use crate::models::auth_response::{AuthResponse, ProfileResponse};
use crate::models::User;

/// Credentials for `POST /api/auth/login`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Form body for `POST /api/auth/register`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub password: String,
}

/// HTTP client for the account backend.
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        info!(
            "Creating backend client for '{}' (timeout {} ms)",
            config.base_url, config.timeout_in_ms
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_in_ms))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, BackendError> {
        self.post_json("/api/auth/login", credentials).await
    }

    pub async fn google_login(&self, id_token: &str) -> Result<AuthResponse, BackendError> {
        self.post_json("/api/auth/google-login", &json!({ "idToken": id_token }))
            .await
    }

    pub async fn register(&self, form: &RegisterRequest) -> Result<AuthResponse, BackendError> {
        self.post_json("/api/auth/register", form).await
    }

    pub async fn google_register(&self, id_token: &str) -> Result<AuthResponse, BackendError> {
        self.post_json("/api/auth/google-auth", &json!({ "idToken": id_token }))
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<AuthResponse, BackendError> {
        self.post_json("/api/auth/forgot-password", &json!({ "email": email }))
            .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
    ) -> Result<AuthResponse, BackendError> {
        self.post_json(
            "/api/auth/reset-password",
            &json!({ "token": token, "password": password }),
        )
        .await
    }

    pub async fn verify_email(&self, token: &str) -> Result<AuthResponse, BackendError> {
        let request = self
            .http
            .get(self.url("/api/auth/verify-email"))
            .query(&[("token", token)]);
        read_auth_response(send(request, "/api/auth/verify-email").await?).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, BackendError> {
        let request = self.http.post(self.url(path)).json(body);
        read_auth_response(send(request, path).await?).await
    }
}

#[async_trait]
impl ProfileFetcher for BackendClient {
    async fn fetch_profile(&self, token: &str) -> Result<User, BackendError> {
        let path = "/api/auth/profile";
        let request = self.http.get(self.url(path)).bearer_auth(token);
        let response = send(request, path).await?;
        let body = response.bytes().await?;
        let profile: ProfileResponse = serde_json::from_slice(&body)?;
        profile.user.ok_or(BackendError::MissingUser)
    }
}

/// Sends the request and turns any non-2xx status into `BackendError::Rejected`.
async fn send(request: RequestBuilder, path: &str) -> Result<Response, BackendError> {
    let response = request.send().await?;
    let status = response.status();
    debug!("Backend {} answered {}", path, status);
    if status.is_success() {
        return Ok(response);
    }

    // Error bodies usually carry a toastMessage; anything else is ignored.
    let message = response
        .bytes()
        .await
        .ok()
        .and_then(|body| serde_json::from_slice::<AuthResponse>(&body).ok())
        .and_then(|body| body.toast_message);
    Err(BackendError::Rejected { status, message })
}

async fn read_auth_response(response: Response) -> Result<AuthResponse, BackendError> {
    let body = response.bytes().await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AuthResponse::default());
    }
    Ok(serde_json::from_slice(&body)?)
}
