use serde::{Deserialize, Serialize};

use super::User;

/// Published once per session mutation. Not stored or replayed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub logged_in: bool,
}

impl ChangeNotification {
    /// Notification for a `set_auth` call: logged in iff a user is present.
    pub fn from_user(user: Option<User>) -> Self {
        ChangeNotification {
            logged_in: user.is_some(),
            user,
        }
    }

    /// Notification for a `clear_auth` call.
    pub fn logged_out() -> Self {
        ChangeNotification {
            user: None,
            logged_in: false,
        }
    }
}
