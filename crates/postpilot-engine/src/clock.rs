//! Fire-time computation for daily "HH:MM" slots.
//! The runner only needs minute matching; `next_fire` backs status views.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

fn slot_time(time_str: &str) -> Option<NaiveTime> {
    let (h, m) = time_str.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Next instant a slot fires strictly after `after`. None for a malformed
/// slot string.
pub fn next_fire(time_str: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let at = slot_time(time_str)?;
    let candidate = after.date_naive().and_time(at).and_utc();
    if candidate > after {
        Some(candidate)
    } else {
        Some(candidate + Duration::days(1))
    }
}

/// Whether `now` falls inside the slot's minute.
pub fn matches_minute(time_str: &str, now: DateTime<Utc>) -> bool {
    match slot_time(time_str) {
        Some(at) => now.hour() == at.hour() && now.minute() == at.minute(),
        None => false,
    }
}

/// Dedup key so a slot fires at most once per wall-clock minute even when
/// several runner ticks land inside it.
pub fn minute_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_fire_same_day() {
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let next = next_fire("09:30", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_next_fire_rolls_over() {
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 30).unwrap();
        let next = next_fire("23:59", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 23, 59, 0).unwrap());
    }

    #[test]
    fn test_next_fire_exact_boundary_goes_tomorrow() {
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let next = next_fire("09:00", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_matches_minute() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 45).unwrap();
        assert!(matches_minute("09:30", now));
        assert!(!matches_minute("09:31", now));
        assert!(!matches_minute("bad", now));
    }

    #[test]
    fn test_minute_key_changes_per_minute() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 1).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2026, 3, 1, 9, 31, 0).unwrap();
        assert_eq!(minute_key(a), minute_key(b));
        assert_ne!(minute_key(a), minute_key(c));
    }
}
