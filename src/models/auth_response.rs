use serde::{Deserialize, Serialize};

use super::User;

/// Body returned by the login/register/google endpoints, and by their error responses.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub toast_message: Option<String>,
}

impl AuthResponse {
    /// Token, ignoring the empty string some endpoints send instead of null.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Body of `GET /api/auth/profile`.
#[derive(Deserialize, Debug)]
pub struct ProfileResponse {
    #[serde(default)]
    pub user: Option<User>,
}
