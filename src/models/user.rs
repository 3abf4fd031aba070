use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The User struct is the profile record handed out by the account backend.
///
/// Every field is optional on the wire. Fields we do not model are kept in
/// `extra` so a cached user reads back exactly as it was written.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub verified: bool,
    /// Creation timestamp as sent by the backend (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Construct a User carrying only a display name.
    pub fn named(name: impl Into<String>) -> Self {
        User {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Name to show in a header or banner: name, else email, else a generic label.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or("Account")
    }

    /// Parsed creation time, if the backend sent a valid RFC 3339 timestamp.
    pub fn created_at_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.created_at
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
    }
}
