//! Calendar utility
//!
//! One leap-year rule and one cumulative month-day table shared by every
//! caller that needs a day-of-year or an elapsed-day count.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Days elapsed before the first of each month in a common year
pub const CUMULATIVE_DAYS: [u16; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Gregorian leap-year rule
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `year`
pub fn days_in_year(year: i32) -> u16 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

/// Day of year (1-based) for a civil date
///
/// `month` is 1..=12 and `day` 1..=31; out-of-range months are clamped.
pub fn day_of_year(year: i32, month: u32, day: u32) -> u16 {
    let month_index = month.clamp(1, 12) as usize - 1;
    let leap_shift = u16::from(month_index >= 2 && is_leap_year(year));
    CUMULATIVE_DAYS[month_index] + leap_shift + day as u16
}

/// Days from the proleptic Gregorian origin to Jan 1 of `year`
fn days_before_year(year: i32) -> i64 {
    let y = i64::from(year) - 1;
    y * 365 + y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400)
}

/// A calendar day identified by year and day-of-year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i32,
    /// Day of year, 1..=366
    pub ordinal: u16,
}

impl CalendarDate {
    pub fn new(year: i32, ordinal: u16) -> Self {
        Self { year, ordinal }
    }

    /// Build from a civil date through the shared table
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            ordinal: day_of_year(year, month, day),
        }
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self::from_ymd(date.year(), date.month(), date.day())
    }

    /// Serial day number; consecutive days differ by one across year boundaries
    fn serial(&self) -> i64 {
        days_before_year(self.year) + i64::from(self.ordinal)
    }

    /// Signed number of calendar days from `earlier` to `self`
    pub fn days_since(&self, earlier: &CalendarDate) -> i64 {
        self.serial() - earlier.serial()
    }

    /// Month (1..=12) and day of month
    pub fn month_day(&self) -> (u32, u32) {
        let leap = is_leap_year(self.year);
        let mut month = 12;
        for (index, start) in CUMULATIVE_DAYS.iter().enumerate().rev() {
            let start = start + u16::from(index >= 2 && leap);
            if self.ordinal > start {
                month = index + 1;
                let day = self.ordinal - start;
                return (month as u32, u32::from(day));
            }
        }
        (month as u32, u32::from(self.ordinal))
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (month, day) = self.month_day();
        write!(f, "{:04}-{:02}-{:02}", self.year, month, day)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_leap_years() {
        assert!(is_leap_year(2024));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2026));
        assert_eq!(days_in_year(2024), 366);
        assert_eq!(days_in_year(2026), 365);
    }

    #[test]
    fn test_day_of_year_matches_chrono() {
        for year in [2023, 2024, 2100] {
            let mut date = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
            while date.year() == year {
                let ours = CalendarDate::from_naive(date);
                assert_eq!(u32::from(ours.ordinal), date.ordinal(), "{}", date);
                assert_eq!(ours.month_day(), (date.month(), date.day()));
                date = date.succ_opt().unwrap();
            }
        }
    }

    #[test]
    fn test_year_boundaries() {
        assert_eq!(day_of_year(2024, 12, 31), 366);
        assert_eq!(day_of_year(2025, 12, 31), 365);
        assert_eq!(day_of_year(2025, 1, 1), 1);
        assert_eq!(day_of_year(2025, 3, 22), 81);
    }

    #[test]
    fn test_days_since_across_new_year() {
        let dec31 = CalendarDate::from_ymd(2025, 12, 31);
        let jan2 = CalendarDate::from_ymd(2026, 1, 2);
        assert_eq!(jan2.days_since(&dec31), 2);
        assert_eq!(dec31.days_since(&jan2), -2);

        let leap_end = CalendarDate::from_ymd(2024, 12, 31);
        let next = CalendarDate::from_ymd(2025, 1, 1);
        assert_eq!(next.days_since(&leap_end), 1);

        let a = NaiveDate::from_ymd_opt(2019, 6, 15).unwrap();
        let b = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            CalendarDate::from_naive(b).days_since(&CalendarDate::from_naive(a)),
            b.signed_duration_since(a).num_days()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(CalendarDate::from_ymd(2024, 2, 29).to_string(), "2024-02-29");
        assert_eq!(CalendarDate::new(2026, 291).to_string(), "2026-10-18");
    }
}
