use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// Poll timestamps and countdowns are all expressed in this unit. A clock
/// set before the epoch reads as 0 rather than failing.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis().min(u64::MAX as u128) as u64)
}
