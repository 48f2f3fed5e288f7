//! Age, recency and due-date arithmetic (pure, no I/O).

use chrono::{NaiveDateTime, Timelike};

use crate::constants::{BUSINESS_DAY_END_HOUR, BUSINESS_DAY_START_HOUR, MISSING_RECEIVED_AGE_DAYS};

/// Whole days between `received` and `now`. Missing timestamps count as
/// a year old.
pub fn age_days(received: Option<NaiveDateTime>, now: NaiveDateTime) -> i64 {
    match received {
        Some(ts) => (now - ts).num_days(),
        None => MISSING_RECEIVED_AGE_DAYS,
    }
}

/// Stepped recency: fresh mail scores high, then a linear decay after a
/// month with a floor of 0.1.
pub fn recency_score(age_days: i64) -> f64 {
    match age_days {
        i64::MIN..=1 => 0.95,
        2..=3 => 0.85,
        4..=7 => 0.75,
        8..=14 => 0.65,
        15..=30 => 0.5,
        days => (0.5 - days as f64 / 365.0).max(0.1),
    }
}

/// Received before the business day starts or at/after it ends.
pub fn is_off_hours(received: NaiveDateTime) -> bool {
    let hour = received.hour();
    !(BUSINESS_DAY_START_HOUR..BUSINESS_DAY_END_HOUR).contains(&hour)
}

/// Calendar days from today until `due`. Zero or less means due today or
/// overdue.
pub fn days_until_due(due: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (due.date() - now.date()).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_recency_steps() {
        assert!((recency_score(0) - 0.95).abs() < 1e-9);
        assert!((recency_score(1) - 0.95).abs() < 1e-9);
        assert!((recency_score(3) - 0.85).abs() < 1e-9);
        assert!((recency_score(7) - 0.75).abs() < 1e-9);
        assert!((recency_score(14) - 0.65).abs() < 1e-9);
        assert!((recency_score(30) - 0.5).abs() < 1e-9);
        assert!((recency_score(73) - (0.5 - 73.0 / 365.0)).abs() < 1e-9);
        assert!((recency_score(365) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_age_days() {
        assert_eq!(age_days(Some(at(1, 9)), at(3, 8)), 1);
        assert_eq!(age_days(None, at(3, 8)), 365);
    }

    #[test]
    fn test_off_hours_boundaries() {
        assert!(is_off_hours(at(1, 7)));
        assert!(!is_off_hours(at(1, 8)));
        assert!(!is_off_hours(at(1, 17)));
        assert!(is_off_hours(at(1, 18)));
    }

    #[test]
    fn test_days_until_due_ignores_time_of_day() {
        assert_eq!(days_until_due(at(5, 1), at(5, 23)), 0);
        assert_eq!(days_until_due(at(4, 23), at(5, 1)), -1);
        assert_eq!(days_until_due(at(7, 0), at(5, 23)), 2);
    }
}
