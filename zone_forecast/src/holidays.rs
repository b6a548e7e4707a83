//! National holiday calendar
//!
//! Fixed-date holidays that land on a weekend are observed on the nearest
//! workday: Saturday moves back to Friday, Sunday forward to Monday. Easter
//! based holidays are never shifted.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Fixed-date holidays as (month, day)
const FIXED_HOLIDAYS: [(u32, u32); 5] = [
    (1, 1),   // New Year's Day
    (5, 1),   // Labour Day
    (5, 17),  // Constitution Day
    (12, 25), // Christmas Day
    (12, 26), // Second Christmas Day
];

/// Holiday calendar with the nearest-workday observance rule
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar;

impl HolidayCalendar {
    /// Create the calendar
    pub fn new() -> Self {
        Self
    }

    /// Observed holidays in one year
    pub fn holidays_in_year(&self, year: i32) -> Vec<NaiveDate> {
        let mut days = BTreeSet::new();

        for (month, day) in FIXED_HOLIDAYS {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                days.insert(nearest_workday(date));
            }
        }

        if let Some(easter) = easter_sunday(year) {
            days.insert(easter - Duration::days(2)); // Good Friday
            days.insert(easter + Duration::days(1)); // Easter Monday
        }

        days.into_iter().collect()
    }

    /// Observed holidays between two dates, inclusive
    pub fn holidays_between(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        // Observance can move a holiday across a year boundary
        (start.year() - 1..=end.year() + 1)
            .flat_map(|year| self.holidays_in_year(year))
            .filter(|d| *d >= start && *d <= end)
            .collect()
    }

    /// Whether `date` is an observed holiday
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays_between(date, date).contains(&date)
    }
}

/// Saturday moves to Friday, Sunday to Monday
pub fn nearest_workday(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm)
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
