//! Time formatting
//!
//! Two renderings are needed: the simulated time a plate took to reach
//! equilibrium, which goes into the report, and wall-clock durations for
//! the JSON summary.

use chrono::{DateTime, Datelike, Timelike};
use std::time::Duration;

/// Render simulated seconds as `YYYY/MM/DD\thh:mm:ss`
///
/// The value is a duration, not a date: years, months and days all count
/// from zero, so one day and one hour is `0000/00/01\t01:00:00`. Months are
/// the calendar months counted from the Unix epoch (January has 31 days,
/// February 28 and so on).
///
/// # Examples
///
/// ```
/// use heatplate::util::time::format_simulated_time;
///
/// assert_eq!(format_simulated_time(0), "0000/00/00\t00:00:00");
/// assert_eq!(format_simulated_time(90_000), "0000/00/01\t01:00:00");
/// ```
pub fn format_simulated_time(seconds: u64) -> String {
    let instant = i64::try_from(seconds)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    match instant {
        Some(t) => format!(
            "{:04}/{:02}/{:02}\t{:02}:{:02}:{:02}",
            t.year() - 1970,
            t.month0(),
            t.day0(),
            t.hour(),
            t.minute(),
            t.second()
        ),
        // Beyond the calendar's range
        None => format!("{}s", seconds),
    }
}

/// Format a duration in human-readable form
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use heatplate::util::time::format_duration;
///
/// assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(5)), "5.00s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();

    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.2}us", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos as f64 / 1_000_000_000.0)
    }
}
