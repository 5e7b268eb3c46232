use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// A calendar-aware time span with the same three components the server
/// keeps: months and days are not normalized into microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    pub const fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }

    /// Converts a fixed-length duration. Returns `None` when the duration
    /// does not fit in microseconds.
    pub fn from_time_delta(delta: TimeDelta) -> Option<Self> {
        delta
            .num_microseconds()
            .map(|microseconds| Self::new(0, 0, microseconds))
    }
}
