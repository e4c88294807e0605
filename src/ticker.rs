use std::time::Duration;

/// Default tick interval in milliseconds
pub const DEFAULT_TICK_MS: u64 = 200;

/// Get tick duration
pub fn tick_duration() -> Duration {
    Duration::from_millis(DEFAULT_TICK_MS)
}

/// How long to wait for input before the next tick.
///
/// Shortened when a deadline (such as an undo window closing) falls inside
/// the regular tick.
pub fn poll_timeout(next_deadline: Option<Duration>) -> Duration {
    match next_deadline {
        Some(remaining) => remaining.min(tick_duration()).max(Duration::from_millis(10)),
        None => tick_duration(),
    }
}
