use std::ops::Range;
use std::path::Path;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Deserialize;
use crate::config::ComfortHours;
use crate::errors::CalendarError;

/// The two kinds of days the planner distinguishes between
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DayKind {
    Workday,
    AtHome,
}

/// Comfort hour ranges for one day. The end of a range is the hour
/// comfort is held until, so it still counts as a comfort hour.
#[derive(Clone, Debug)]
pub struct ComfortWindow {
    pub first: Range<u32>,
    pub second: Option<Range<u32>>,
    pub last_hour: u32,
}

impl ComfortWindow {
    /// All hours with a comfort demand, range ends included
    pub fn comfort_hours(&self) -> impl Iterator<Item = u32> + '_ {
        (self.first.start..=self.first.end)
            .chain(self.second.clone().map(|r| r.start..=r.end).into_iter().flatten())
    }
}

/// A manual at-home period, both ends inclusive
#[derive(Deserialize, Clone, Copy, Debug)]
pub struct OverridePeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Deserialize)]
struct OverrideFile {
    periods: Vec<OverridePeriod>,
}

/// Reads manual at-home periods from file. A missing file simply means
/// no overrides.
///
/// # Arguments
///
/// * 'override_file' - path to the json file holding at-home periods
pub fn load_overrides(override_file: &str) -> Result<Vec<OverridePeriod>, CalendarError> {
    let path = Path::new(override_file);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let json = std::fs::read_to_string(path)?;
    let file: OverrideFile = serde_json::from_str(&json)?;

    Ok(file.periods)
}

/// Determines the kind of day: manual override periods win, then public
/// holidays and the configured at-home weekdays, everything else is a
/// workday
///
/// # Arguments
///
/// * 'date' - the date to classify
/// * 'at_home_weekdays' - ISO weekdays (1-7) spent at home
/// * 'overrides' - manual at-home periods
pub fn day_kind(date: NaiveDate, at_home_weekdays: &[u32], overrides: &[OverridePeriod]) -> DayKind {
    if overrides.iter().any(|p| p.from <= date && date <= p.to) {
        return DayKind::AtHome;
    }
    if is_public_holiday(date) {
        return DayKind::AtHome;
    }
    if at_home_weekdays.contains(&date.weekday().number_from_monday()) {
        return DayKind::AtHome;
    }

    DayKind::Workday
}

/// Builds the comfort window for a day kind
///
/// # Arguments
///
/// * 'kind' - the kind of day
/// * 'hours' - configured comfort hours
pub fn comfort_window(kind: DayKind, hours: &ComfortHours) -> ComfortWindow {
    match kind {
        DayKind::Workday => ComfortWindow {
            first: hours.workday_morning_start..hours.workday_morning_end,
            second: Some(hours.workday_afternoon_start..hours.workday_last),
            last_hour: hours.workday_last,
        },
        DayKind::AtHome => ComfortWindow {
            first: hours.dayoff_morning_start..hours.dayoff_last,
            second: None,
            last_hour: hours.dayoff_last,
        },
    }
}

/// True if the date is a Swedish public holiday
///
/// # Arguments
///
/// * 'date' - the date to check
pub fn is_public_holiday(date: NaiveDate) -> bool {
    let year = date.year();

    let fixed = [(1, 1), (1, 6), (5, 1), (6, 6), (12, 25), (12, 26)];
    if fixed.contains(&(date.month(), date.day())) {
        return true;
    }

    let easter = easter_sunday(year);
    let movable = [
        easter - Days::new(2),  // Good Friday
        easter,
        easter + Days::new(1),  // Easter Monday
        easter + Days::new(39), // Ascension Day
        easter + Days::new(49), // Pentecost
    ];
    if movable.contains(&date) {
        return true;
    }

    // Midsummer Day: the Saturday between June 20 and 26
    if date.month() == 6 && (20..=26).contains(&date.day()) && date.weekday() == Weekday::Sat {
        return true;
    }
    // All Saints' Day: the Saturday between October 31 and November 6
    let in_span = (date.month() == 10 && date.day() == 31) || (date.month() == 11 && date.day() <= 6);
    if in_span && date.weekday() == Weekday::Sat {
        return true;
    }

    false
}

/// Easter Sunday for a year, anonymous Gregorian computus
///
/// # Arguments
///
/// * 'year' - the year to compute Easter for
pub fn easter_sunday(year: i32) -> NaiveDate {
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

    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours() -> ComfortHours {
        ComfortHours {
            workday_morning_start: 6,
            workday_morning_end: 8,
            workday_morning_end_minute: 30,
            workday_afternoon_start: 16,
            workday_last: 22,
            dayoff_morning_start: 8,
            dayoff_last: 23,
            dinner_hour: 17,
            earliest_afternoon_preheat: 11,
            latest_afternoon_preheat: 14,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn computes_easter_sunday() {
        assert_eq!(easter_sunday(2024), date(2024, 3, 31));
        assert_eq!(easter_sunday(2025), date(2025, 4, 20));
        assert_eq!(easter_sunday(2026), date(2026, 4, 5));
    }

    #[test]
    fn recognizes_swedish_holidays() {
        assert!(is_public_holiday(date(2026, 1, 1)));
        assert!(is_public_holiday(date(2026, 4, 3)));  // Good Friday
        assert!(is_public_holiday(date(2026, 4, 6)));  // Easter Monday
        assert!(is_public_holiday(date(2026, 5, 14))); // Ascension Day
        assert!(is_public_holiday(date(2026, 6, 20))); // Midsummer Day (Saturday)
        assert!(is_public_holiday(date(2026, 10, 31))); // All Saints' Day (Saturday)
        assert!(is_public_holiday(date(2026, 12, 25)));

        assert!(!is_public_holiday(date(2026, 6, 22)));
        assert!(!is_public_holiday(date(2026, 11, 2)));
    }

    #[test]
    fn weekday_partition_and_holiday_precedence() {
        // 2026-08-26 is a Wednesday
        assert_eq!(day_kind(date(2026, 8, 26), &[6, 7], &[]), DayKind::Workday);
        // 2026-08-29 is a Saturday
        assert_eq!(day_kind(date(2026, 8, 29), &[6, 7], &[]), DayKind::AtHome);
        // Midsummer falls on a would-be workday list, holiday wins
        assert_eq!(day_kind(date(2026, 6, 20), &[], &[]), DayKind::AtHome);
    }

    #[test]
    fn override_period_takes_precedence() {
        let periods = [OverridePeriod { from: date(2026, 8, 24), to: date(2026, 8, 28) }];
        assert_eq!(day_kind(date(2026, 8, 26), &[6, 7], &periods), DayKind::AtHome);
        assert_eq!(day_kind(date(2026, 8, 31), &[6, 7], &periods), DayKind::Workday);
    }

    #[test]
    fn window_shapes_per_day_kind() {
        let workday = comfort_window(DayKind::Workday, &hours());
        assert_eq!(workday.first, 6..8);
        assert_eq!(workday.second, Some(16..22));
        assert_eq!(workday.last_hour, 22);

        let dayoff = comfort_window(DayKind::AtHome, &hours());
        assert_eq!(dayoff.first, 8..23);
        assert!(dayoff.second.is_none());

        let hours: Vec<u32> = workday.comfort_hours().collect();
        assert!(hours.contains(&8));
        assert!(hours.contains(&22));
        assert!(!hours.contains(&12));
    }
}
