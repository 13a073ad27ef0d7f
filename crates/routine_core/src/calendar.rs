use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Calendar unit used by all period arithmetic. Weeks start on Monday.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CalendarUnit {
    Day,
    Week,
    Month,
    Year,
}

impl CalendarUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            CalendarUnit::Day => "day",
            CalendarUnit::Week => "week",
            CalendarUnit::Month => "month",
            CalendarUnit::Year => "year",
        }
    }
}

/// Floors `date` to the first day of the unit period containing it.
pub fn period_start(date: NaiveDate, unit: CalendarUnit) -> NaiveDate {
    match unit {
        CalendarUnit::Day => date,
        CalendarUnit::Week => {
            let offset = date.weekday().num_days_from_monday();
            date - Duration::days(i64::from(offset))
        }
        CalendarUnit::Month => date.with_day(1).unwrap_or(date),
        CalendarUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
    }
}

/// Signed number of whole calendar units from `anchor` to `cursor`.
///
/// Counts calendar boundaries rather than elapsed time: Jan 31 to Feb 1 is
/// one month, Sunday to the following Monday is one week.
pub fn elapsed_units(anchor: NaiveDate, cursor: NaiveDate, unit: CalendarUnit) -> i64 {
    match unit {
        CalendarUnit::Day => cursor.signed_duration_since(anchor).num_days(),
        CalendarUnit::Week => {
            let from = period_start(anchor, CalendarUnit::Week);
            let to = period_start(cursor, CalendarUnit::Week);
            to.signed_duration_since(from).num_days().div_euclid(7)
        }
        CalendarUnit::Month => months_between(anchor, cursor),
        CalendarUnit::Year => i64::from(cursor.year()) - i64::from(anchor.year()),
    }
}

/// Adds `amount` whole units to `date`.
///
/// Month and year additions clamp to the last valid day of the target
/// month, so Jan 31 + 1 month is Feb 28 (or 29) and Feb 29 + 1 year is
/// Feb 28. Returns `None` when the result leaves chrono's date range.
pub fn add_units(date: NaiveDate, amount: i64, unit: CalendarUnit) -> Option<NaiveDate> {
    match unit {
        CalendarUnit::Day => date.checked_add_signed(Duration::try_days(amount)?),
        CalendarUnit::Week => date.checked_add_signed(Duration::try_weeks(amount)?),
        CalendarUnit::Month => add_months(date, amount),
        CalendarUnit::Year => add_years(date, amount),
    }
}

/// Human label for a period of `interval` units: "week", "3-day period".
pub fn unit_label(unit: CalendarUnit, interval: u32) -> String {
    if interval <= 1 {
        unit.as_str().to_string()
    } else {
        format!("{}-{} period", interval, unit.as_str())
    }
}

/// First instant of `date` in `tz`.
///
/// Ambiguous midnights resolve to the earliest mapping; a midnight that
/// falls into a DST gap moves forward one hour.
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Local midnight of the calendar day `at` falls on, in `at`'s own zone.
pub fn start_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(&at.timezone(), at.date_naive())
}

/// `yyyy-MM-dd` key of a local calendar day.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let total_months = i64::from(date.year()) * 12 + i64::from(date.month0()) + months;
    let target_year = i32::try_from(total_months.div_euclid(12)).ok()?;
    let target_month = (total_months.rem_euclid(12) + 1) as u32;
    let day = date.day().min(days_in_month(target_year, target_month));
    NaiveDate::from_ymd_opt(target_year, target_month, day)
}

fn add_years(date: NaiveDate, years: i64) -> Option<NaiveDate> {
    let target_year = i32::try_from(i64::from(date.year()).checked_add(years)?).ok()?;
    let target_month = date.month();
    let target_day = date.day().min(days_in_month(target_year, target_month));
    NaiveDate::from_ymd_opt(target_year, target_month, target_day)
}

fn months_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (i64::from(end.year()) - i64::from(start.year())) * 12
        + (i64::from(end.month()) - i64::from(start.month()))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
