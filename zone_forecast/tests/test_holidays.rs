use chrono::NaiveDate;
use rstest::rstest;
use zone_forecast::holidays::{easter_sunday, nearest_workday};
use zone_forecast::HolidayCalendar;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[rstest]
#[case(2000, date(2000, 4, 23))]
#[case(2019, date(2019, 4, 21))]
#[case(2024, date(2024, 3, 31))]
#[case(2025, date(2025, 4, 20))]
#[case(2038, date(2038, 4, 25))]
fn test_easter_sunday(#[case] year: i32, #[case] expected: NaiveDate) {
    assert_eq!(easter_sunday(year), Some(expected));
}

#[test]
fn test_easter_holidays_2024() {
    let calendar = HolidayCalendar::new();
    assert!(calendar.is_holiday(date(2024, 3, 29)));
    assert!(calendar.is_holiday(date(2024, 4, 1)));
    assert!(!calendar.is_holiday(date(2024, 3, 31)));
}

#[test]
fn test_weekend_holidays_move_to_nearest_workday() {
    let calendar = HolidayCalendar::new();

    // Constitution Day 2026 is a Sunday
    assert!(!calendar.is_holiday(date(2026, 5, 17)));
    assert!(calendar.is_holiday(date(2026, 5, 18)));

    // New Year's Day 2022 is a Saturday, observed the Friday before
    assert!(calendar.is_holiday(date(2021, 12, 31)));
    assert!(!calendar.is_holiday(date(2022, 1, 1)));
}

#[test]
fn test_fixed_holidays_on_weekdays_stay() {
    let calendar = HolidayCalendar::new();
    let days = calendar.holidays_in_year(2024);

    for expected in [
        date(2024, 1, 1),
        date(2024, 5, 1),
        date(2024, 5, 17),
        date(2024, 12, 25),
        date(2024, 12, 26),
    ] {
        assert!(days.contains(&expected), "missing {}", expected);
    }
    assert_eq!(days.len(), 7);
}

#[test]
fn test_ordinary_days_are_not_holidays() {
    let calendar = HolidayCalendar::new();
    assert!(!calendar.is_holiday(date(2024, 7, 15)));
    assert!(!calendar.is_holiday(date(2024, 12, 24)));
}

#[test]
fn test_holidays_between_is_inclusive() {
    let calendar = HolidayCalendar::new();
    let days = calendar.holidays_between(date(2024, 12, 25), date(2025, 1, 1));

    assert_eq!(
        days.into_iter().collect::<Vec<_>>(),
        vec![date(2024, 12, 25), date(2024, 12, 26), date(2025, 1, 1)]
    );
}

#[rstest]
#[case(date(2024, 6, 1), date(2024, 5, 31))]
#[case(date(2024, 6, 2), date(2024, 6, 3))]
#[case(date(2024, 6, 3), date(2024, 6, 3))]
fn test_nearest_workday(#[case] input: NaiveDate, #[case] expected: NaiveDate) {
    assert_eq!(nearest_workday(input), expected);
}
