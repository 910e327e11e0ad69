//! Utility functions for time windows and batching

use chrono::{DateTime, Duration, DurationRound, Utc};

/// Period of the routine utilization sample and of the utilization alarm
pub const SAMPLE_PERIOD_SECONDS: u32 = 300;

/// Seconds in one hour
pub const SECONDS_PER_HOUR: u32 = 3600;

/// Truncate to the most recent 5-minute boundary (seconds and sub-seconds dropped)
pub fn floor_to_five_minutes(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::minutes(5)).unwrap_or(now)
}

/// Truncate to the top of the hour
pub fn floor_to_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::hours(1)).unwrap_or(now)
}

/// The 5-minute window ending on the most recent 5-minute boundary
pub fn five_minute_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = floor_to_five_minutes(now);
    (end - Duration::seconds(i64::from(SAMPLE_PERIOD_SECONDS)), end)
}

/// Get current time
pub fn current_time() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_minute_window_snaps_back() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 14, 27, 41).unwrap();
        let (start, end) = five_minute_window(now);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 3, 14, 25, 0).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 3, 14, 20, 0).unwrap());
    }

    #[test]
    fn test_window_on_boundary_is_stable() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let (start, end) = five_minute_window(now);
        assert_eq!(end, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 2, 23, 55, 0).unwrap());
    }

    #[test]
    fn test_floor_to_hour() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 9, 59, 59).unwrap();
        assert_eq!(floor_to_hour(now), Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap());
        assert!(current_time() > now);
    }
}
