use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::ScheduleError;

/// Days searched ahead for the next matching local date; covers a full year
/// plus the longest month.
const SEARCH_HORIZON_DAYS: i64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Daily,
    Weekly(Weekday),
    /// Day of month, clamped to the last day of shorter months.
    Monthly(u32),
}

impl Recurrence {
    fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Recurrence::Daily => true,
            Recurrence::Weekly(day) => date.weekday() == *day,
            Recurrence::Monthly(day) => date.day() == (*day).min(days_in_month(date)),
        }
    }
}

/// Nightly window during which scheduled sends are suppressed. Local times,
/// `[start, end)`, may wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            return false;
        }
        if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

pub fn parse_time(value: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ScheduleError::InvalidTime(value.to_string()))
}

pub fn parse_timezone(value: &str) -> Result<Tz, ScheduleError> {
    value
        .parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(value.to_string()))
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// UTC instant of `time` on `date` in `tz`. A wall time skipped by a DST
/// change moves forward by an hour; an ambiguous one takes the earlier instant.
fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
}

/// First occurrence of `time` (local to `tz`) on a date matching `recurrence`
/// that is strictly later than `after`.
pub fn next_occurrence(tz: Tz, time: NaiveTime, recurrence: Recurrence, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let start = after.with_timezone(&tz).date_naive();

    (0..SEARCH_HORIZON_DAYS)
        .filter_map(|offset| start.checked_add_signed(Duration::days(offset)))
        .filter(|date| recurrence.matches(*date))
        .filter_map(|date| local_instant(tz, date, time))
        .find(|instant| *instant > after)
}

/// Local wall-clock time of `at` in `tz`.
pub fn local_time(tz: Tz, at: DateTime<Utc>) -> NaiveTime {
    at.with_timezone(&tz).time()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_daily_later_today() {
        let next = next_occurrence(Tz::UTC, hm(20, 0), Recurrence::Daily, utc(2026, 10, 14, 14, 0));
        assert_eq!(next, Some(utc(2026, 10, 14, 20, 0)));
    }

    #[test]
    fn test_daily_rolls_to_tomorrow_when_time_has_passed() {
        let next = next_occurrence(Tz::UTC, hm(8, 0), Recurrence::Daily, utc(2026, 10, 14, 14, 0));
        assert_eq!(next, Some(utc(2026, 10, 15, 8, 0)));
    }

    #[test]
    fn test_exact_fire_time_is_not_repeated() {
        let next = next_occurrence(Tz::UTC, hm(8, 0), Recurrence::Daily, utc(2026, 10, 15, 8, 0));
        assert_eq!(next, Some(utc(2026, 10, 16, 8, 0)));
    }

    #[test]
    fn test_local_time_is_converted_from_patient_timezone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 08:00 EDT is 12:00 UTC.
        let next = next_occurrence(tz, hm(8, 0), Recurrence::Daily, utc(2026, 10, 14, 11, 0));
        assert_eq!(next, Some(utc(2026, 10, 14, 12, 0)));
    }

    #[test]
    fn test_weekly_picks_the_named_day() {
        // 2026-10-14 is a Wednesday.
        let next = next_occurrence(Tz::UTC, hm(9, 0), Recurrence::Weekly(Weekday::Mon), utc(2026, 10, 14, 14, 0));
        assert_eq!(next, Some(utc(2026, 10, 19, 9, 0)));
    }

    #[test]
    fn test_monthly_clamps_to_short_months() {
        let next = next_occurrence(Tz::UTC, hm(9, 0), Recurrence::Monthly(31), utc(2026, 2, 10, 0, 0));
        assert_eq!(next, Some(utc(2026, 2, 28, 9, 0)));
    }

    #[test]
    fn test_spring_forward_gap_moves_an_hour_later() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 02:30 does not exist on 2026-03-08; 03:30 EDT is 07:30 UTC.
        let next = next_occurrence(tz, hm(2, 30), Recurrence::Daily, utc(2026, 3, 8, 5, 0));
        assert_eq!(next, Some(utc(2026, 3, 8, 7, 30)));
    }

    #[test]
    fn test_quiet_window_wraps_midnight() {
        let window = QuietWindow {
            start: hm(22, 0),
            end: hm(7, 0),
        };
        assert!(window.contains(hm(22, 0)));
        assert!(window.contains(hm(3, 15)));
        assert!(!window.contains(hm(7, 0)));
        assert!(!window.contains(hm(12, 0)));
    }

    #[test]
    fn test_quiet_window_same_day_and_empty() {
        let lunch = QuietWindow {
            start: hm(12, 0),
            end: hm(13, 0),
        };
        assert!(lunch.contains(hm(12, 30)));
        assert!(!lunch.contains(hm(13, 0)));

        let empty = QuietWindow {
            start: hm(9, 0),
            end: hm(9, 0),
        };
        assert!(!empty.contains(hm(9, 0)));
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert_eq!(parse_time("07:30").unwrap(), hm(7, 30));
        assert!(matches!(parse_time("7am"), Err(ScheduleError::InvalidTime(_))));
        assert!(matches!(parse_time("25:00"), Err(ScheduleError::InvalidTime(_))));
    }
}
