//! Tick-based timing for media positions
//!
//! A tick is 100 nanoseconds (the glossary's unit), so `TICKS_PER_SECOND`
//! is 10,000,000 and `TICKS_PER_MS` is 10,000. Positions and run-times flow
//! through the coordinator as ticks; the HTTP surface speaks milliseconds.

/// Ticks per second (1 tick = 100 ns)
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks per millisecond
pub const TICKS_PER_MS: i64 = 10_000;

/// Convert milliseconds to ticks
pub fn ms_to_ticks(milliseconds: i64) -> i64 {
    milliseconds * TICKS_PER_MS
}

/// Convert ticks to milliseconds (truncating division)
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks / TICKS_PER_MS
}

/// Clamp `value` into `[0, max]`
pub fn clamp_ticks(value: i64, max: i64) -> i64 {
    value.clamp(0, max.max(0))
}
