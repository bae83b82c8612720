//! Clock helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time as fractional seconds
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
