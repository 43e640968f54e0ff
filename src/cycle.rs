//! Billing cycle calendar.
//!
//! A cycle starts on `reset_day` of some month and ends the day before
//! `reset_day` of the following month. Reset days past the end of a short
//! month fall on that month's last day (31 -> Feb 28/29, Apr 30).

use chrono::{Datelike, NaiveDate};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// The reset date falling in `year`/`month`.
pub fn reset_date_in(year: i32, month: u32, reset_day: u32) -> NaiveDate {
    let day = reset_day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Most recent reset date on or before `today`.
pub fn last_reset_on_or_before(today: NaiveDate, reset_day: u32) -> NaiveDate {
    let this_month = reset_date_in(today.year(), today.month(), reset_day);
    if this_month <= today {
        this_month
    } else {
        let (year, month) = previous_month(today.year(), today.month());
        reset_date_in(year, month, reset_day)
    }
}

/// Reset date ending the cycle that started on `cycle_start`.
pub fn next_reset_date(cycle_start: NaiveDate, reset_day: u32) -> NaiveDate {
    let (year, month) = next_month(cycle_start.year(), cycle_start.month());
    reset_date_in(year, month, reset_day)
}

/// First reset date strictly after `today`.
pub fn upcoming_reset(today: NaiveDate, reset_day: u32) -> NaiveDate {
    next_reset_date(last_reset_on_or_before(today, reset_day), reset_day)
}

/// New cycle start if the cycle beginning on `cycle_start` is over by `today`.
///
/// Several missed cycles collapse into one rollover landing on the latest
/// reset date.
pub fn rollover_due(cycle_start: NaiveDate, reset_day: u32, today: NaiveDate) -> Option<NaiveDate> {
    if today >= next_reset_date(cycle_start, reset_day) {
        Some(last_reset_on_or_before(today, reset_day))
    } else {
        None
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reset_day_clamped_to_month_length() {
        assert_eq!(reset_date_in(2025, 2, 31), date(2025, 2, 28));
        assert_eq!(reset_date_in(2024, 2, 31), date(2024, 2, 29));
        assert_eq!(reset_date_in(2025, 4, 31), date(2025, 4, 30));
        assert_eq!(reset_date_in(2025, 1, 31), date(2025, 1, 31));
    }

    #[test]
    fn test_last_reset_on_or_before() {
        assert_eq!(last_reset_on_or_before(date(2025, 3, 20), 15), date(2025, 3, 15));
        assert_eq!(last_reset_on_or_before(date(2025, 3, 15), 15), date(2025, 3, 15));
        assert_eq!(last_reset_on_or_before(date(2025, 3, 10), 15), date(2025, 2, 15));
        assert_eq!(last_reset_on_or_before(date(2025, 1, 5), 15), date(2024, 12, 15));
    }

    #[test]
    fn test_next_reset_crosses_year() {
        assert_eq!(next_reset_date(date(2024, 12, 1), 1), date(2025, 1, 1));
        assert_eq!(next_reset_date(date(2025, 1, 31), 31), date(2025, 2, 28));
    }

    #[test]
    fn test_upcoming_reset() {
        assert_eq!(upcoming_reset(date(2025, 3, 20), 15), date(2025, 4, 15));
        assert_eq!(upcoming_reset(date(2025, 3, 15), 15), date(2025, 4, 15));
        assert_eq!(upcoming_reset(date(2025, 3, 14), 15), date(2025, 3, 15));
    }

    #[test]
    fn test_rollover_due() {
        let start = date(2025, 3, 1);
        assert_eq!(rollover_due(start, 1, date(2025, 3, 31)), None);
        assert_eq!(rollover_due(start, 1, date(2025, 4, 1)), Some(date(2025, 4, 1)));
        // two cycles missed
        assert_eq!(rollover_due(start, 1, date(2025, 5, 20)), Some(date(2025, 5, 1)));
    }

    #[test]
    fn test_parse_and_format() {
        let d = date(2025, 7, 4);
        assert_eq!(parse_date(&format_date(d)), Some(d));
        assert_eq!(parse_date("07/04/2025"), None);
    }
}
