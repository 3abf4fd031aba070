use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    suppressed: u64,
}

static WINDOWS: OnceLock<Mutex<HashMap<String, Window>>> = OnceLock::new();

/// Returns `Some(suppressed_count)` when a log for `key` should be emitted,
/// otherwise `None` and the event is counted against the open window.
pub fn should_emit(key: &str, interval: Duration) -> Option<u64> {
    let mut windows = WINDOWS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let now = Instant::now();

    let Some(window) = windows.get_mut(key) else {
        windows.insert(
            key.to_string(),
            Window {
                opened_at: now,
                suppressed: 0,
            },
        );
        return Some(0);
    };

    if now.duration_since(window.opened_at) < interval {
        window.suppressed += 1;
        return None;
    }
    let suppressed = std::mem::take(&mut window.suppressed);
    window.opened_at = now;
    Some(suppressed)
}
