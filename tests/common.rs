#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use authsync::config::{parse_config, ConfigV1};
use authsync::models::ChangeNotification;
use authsync::session::Subscription;
use authsync::startup::build_state;
use authsync::state::AppState;

/// Inline config pointing the backend at `base_url` and keeping the session in memory.
pub fn test_config(base_url: &str) -> ConfigV1 {
    let yaml = format!(
        r#"
version: "1.0.0"
backend:
  base_url: "{base_url}"
  timeout_in_ms: 2000
storage:
  enabled: true
  type: memory
logging:
  level: "debug"
  format: "json"
"#
    );
    parse_config(&yaml).expect("Failed to parse test config YAML")
}

pub fn build_app(base_url: &str) -> AppState {
    build_state(test_config(base_url)).expect("state should build")
}

/// Records every notification the session publishes.
pub fn record_notifications(state: &AppState) -> (Arc<Mutex<Vec<ChangeNotification>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let seen = seen.clone();
        state
            .session
            .subscribe(move |n| seen.lock().unwrap().push(n.clone()))
    };
    (seen, sub)
}
