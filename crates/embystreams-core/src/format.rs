//! Human-readable formatting for ticks and bitrates.

/// Ticks per second. One tick is 100 nanoseconds.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Format a tick count as `H:MM:SS`, or `M:SS` when under an hour.
/// Negative input is treated as zero.
pub fn format_ticks(ticks: i64) -> String {
    let seconds = ticks.max(0) / TICKS_PER_SECOND;
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Format a bitrate in bits per second.
pub fn format_bitrate(bps: u64) -> String {
    if bps >= 1_000_000 {
        format!("{} Mbps", round1(bps as f64 / 1_000_000.0))
    } else if bps >= 1_000 {
        format!("{} Kbps", (bps as f64 / 1_000.0).round() as u64)
    } else {
        format!("{bps} bps")
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
