//! CLI command implementations.

pub mod channels;
pub mod forget;
pub mod messages;
pub mod status;

use chrono::{DateTime, FixedOffset, Utc};

/// Format a timestamp in the display offset, minute precision.
pub fn format_timestamp(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string()
}
