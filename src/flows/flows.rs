use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendClient, BackendError, LoginRequest, ProfileFetcher, RegisterRequest};
use crate::models::AuthResponse;
use crate::session::SessionStore;

use super::password::is_strong_password;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("password is too weak")]
    WeakPassword,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl FlowError {
    /// Message for the user: the backend's own text when it sent one, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            FlowError::WeakPassword => "Password is too weak".to_string(),
            FlowError::Backend(e) => e.backend_message().unwrap_or(fallback).to_string(),
        }
    }
}

/// What a successful flow reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    pub message: String,
    pub logged_in: bool,
}

/// Account actions (login, registration, password recovery) wired to the session.
pub struct AuthFlows {
    session: Arc<SessionStore>,
    backend: Arc<BackendClient>,
}

impl AuthFlows {
    pub fn new(session: Arc<SessionStore>, backend: Arc<BackendClient>) -> Self {
        Self { session, backend }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<FlowOutcome, FlowError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.backend.login(&request).await?;
        Ok(self.establish(response, "Login successful!").await)
    }

    pub async fn google_login(&self, id_token: &str) -> Result<FlowOutcome, FlowError> {
        let response = self.backend.google_login(id_token).await?;
        Ok(self.establish(response, "Google login successful!").await)
    }

    pub async fn google_register(&self, id_token: &str) -> Result<FlowOutcome, FlowError> {
        let response = self.backend.google_register(id_token).await?;
        Ok(self
            .establish(response, "Google registration successful!")
            .await)
    }

    /// Creates the account. The user still has to verify the email and log in.
    pub async fn register(&self, form: &RegisterRequest) -> Result<FlowOutcome, FlowError> {
        let response = self.backend.register(form).await?;
        info!("Registration accepted for '{}'", form.email);
        Ok(self.outcome(response, "Registration successful!"))
    }

    pub async fn forgot_password(&self, email: &str) -> Result<FlowOutcome, FlowError> {
        let response = self.backend.forgot_password(email).await?;
        Ok(self.outcome(response, "Password reset initiated"))
    }

    pub async fn reset_password(
        &self,
        reset_token: &str,
        password: &str,
    ) -> Result<FlowOutcome, FlowError> {
        if !is_strong_password(password) {
            return Err(FlowError::WeakPassword);
        }
        let response = self.backend.reset_password(reset_token, password).await?;
        Ok(self.outcome(response, "Password reset successful"))
    }

    pub async fn verify_email(&self, verification_token: &str) -> Result<FlowOutcome, FlowError> {
        let response = self.backend.verify_email(verification_token).await?;
        Ok(self.outcome(response, "Email verified"))
    }

    pub fn logout(&self) {
        self.session.clear_auth();
    }

    /// Stores whatever credentials the response carries. A token without a
    /// user is completed with a profile fetch so both values land together.
    async fn establish(&self, response: AuthResponse, default_message: &str) -> FlowOutcome {
        let token = response.token().map(str::to_string);
        let mut user = response.user.clone();

        if user.is_none() {
            if let Some(token) = token.as_deref() {
                match self.backend.fetch_profile(token).await {
                    Ok(profile) => user = Some(profile),
                    Err(e) => warn!("Could not load profile after login: {}", e),
                }
            }
        }

        if token.is_some() || user.is_some() {
            self.session.set_auth(token.as_deref(), user.as_ref());
        }
        self.outcome(response, default_message)
    }

    fn outcome(&self, response: AuthResponse, default_message: &str) -> FlowOutcome {
        FlowOutcome {
            message: response
                .toast_message
                .unwrap_or_else(|| default_message.to_string()),
            logged_in: self.session.is_logged_in(),
        }
    }
}
