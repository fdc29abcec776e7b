//! Books version stamps and the millisecond clock behind them.
//!
//! The books version is a millisecond timestamp that only moves forward. Any
//! successful book mutation writes [`next_version`] in the same write as the
//! mutation itself.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

static LAST_TICK: AtomicI64 = AtomicI64::new(0);

/// Current wall-clock time truncated to whole milliseconds.
///
/// Stored timestamps carry millisecond precision, so values read back from
/// either engine compare equal to the ones returned at write time.
#[must_use]
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Wall-clock milliseconds since the epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A process-wide millisecond tick that never repeats.
///
/// Follows the wall clock but returns at least one more than the previous
/// tick, so ids derived from it stay unique within the process.
#[must_use]
pub fn unique_millis() -> i64 {
    let now = now_millis();
    let previous = LAST_TICK
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    now.max(previous.saturating_add(1))
}

/// The version to store after a book mutation.
///
/// Strictly greater than `current` even when two mutations land in the same
/// millisecond or the clock steps backwards.
#[must_use]
pub const fn next_version(current: i64, now_ms: i64) -> i64 {
    let bumped = current.saturating_add(1);
    if now_ms > bumped { now_ms } else { bumped }
}

/// Interpret a stored version, treating garbage and non-positive values as 0.
#[must_use]
pub fn parse_stored(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(0)
}
