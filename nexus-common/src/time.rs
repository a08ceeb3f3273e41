//! Timestamp utilities

use chrono::{DateTime, Local, Utc};

/// Render a timestamp as a local wall-clock `HH:MM`, as shown in the recent scans list
pub fn format_clock(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M").to_string()
}
