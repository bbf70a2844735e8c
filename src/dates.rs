use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

// Backend wall times are America/Sao_Paulo, fixed UTC-03:00 since 2019.
pub const SAO_PAULO_UTC_OFFSET_SECS: i64 = -3 * 3600;

const INVALID: &str = "Invalid Date";

const WEEKDAYS_PT: [&str; 7] = ["seg.", "ter.", "qua.", "qui.", "sex.", "sáb.", "dom."];

const MONTHS_PT: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho",
    "julho", "agosto", "setembro", "outubro", "novembro", "dezembro",
];

#[derive(Error, Debug, Clone, PartialEq)]
#[error("'{input}' is not a yyyy-MM-dd or yyyy-MM-dd HH:mm:ss date")]
pub struct DateError {
    pub input: String,
}

/// Display fields for a backend date string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateObject {
    pub day_name: String,
    pub day_number: u32,
    pub month_name: String,
    pub hour: String,
    pub valid: bool,
}

impl DateObject {
    fn invalid() -> Self {
        Self {
            day_name: INVALID.to_string(),
            day_number: 0,
            month_name: INVALID.to_string(),
            hour: INVALID.to_string(),
            valid: false,
        }
    }

    fn from_date_time(value: NaiveDateTime) -> Self {
        Self {
            day_name: weekday_name(value.weekday()).to_string(),
            day_number: value.day(),
            month_name: MONTHS_PT[value.month0() as usize].to_string(),
            hour: format!("{:02}:{:02}", value.hour(), value.minute()),
            valid: true,
        }
    }
}

fn time_component() -> &'static Regex {
    static TIME: OnceLock<Regex> = OnceLock::new();
    TIME.get_or_init(|| Regex::new(r"\s\d{2}:\d{2}:\d{2}$").expect("time component pattern"))
}

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS_PT[day.num_days_from_monday() as usize]
}

/// Parses either backend format. Date-only values land on midnight.
pub fn parse_date_time(value: &str) -> Result<NaiveDateTime, DateError> {
    let trimmed = value.trim();
    let err = || DateError {
        input: value.to_string(),
    };

    if time_component().is_match(trimmed) {
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").map_err(|_| err())
    } else {
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(err)
    }
}

/// Date part of either backend format.
pub fn parse_date(value: &str) -> Result<NaiveDate, DateError> {
    parse_date_time(value).map(|dt| dt.date())
}

/// Checked variant of [`get_date_object`].
pub fn parse_date_object(value: &str) -> Result<DateObject, DateError> {
    parse_date_time(value).map(DateObject::from_date_time)
}

/// Never fails: malformed input yields the "Invalid Date" display.
pub fn get_date_object(value: &str) -> DateObject {
    parse_date_object(value).unwrap_or_else(|_| DateObject::invalid())
}

/// Current wall time in America/Sao_Paulo.
pub fn sao_paulo_now() -> NaiveDateTime {
    to_sao_paulo(Utc::now())
}

pub fn to_sao_paulo(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.naive_utc() + Duration::seconds(SAO_PAULO_UTC_OFFSET_SECS)
}

pub fn sao_paulo_today() -> NaiveDate {
    sao_paulo_now().date()
}

/// True only for dates before yesterday: yesterday itself still counts as
/// bookable. Unparseable input is never "before today".
pub fn date_is_before_today(date: &str) -> bool {
    date_is_before_today_at(date, sao_paulo_today())
}

pub fn date_is_before_today_at(date: &str, today: NaiveDate) -> bool {
    let Ok(date) = parse_date(date) else {
        return false;
    };
    match today.pred_opt() {
        Some(yesterday) => date < yesterday,
        None => false,
    }
}

/// True when `date_time` starts less than one hour from now.
pub fn is_date_time_one_hour_before(date_time: &str) -> bool {
    is_date_time_one_hour_before_at(date_time, Utc::now())
}

pub fn is_date_time_one_hour_before_at(date_time: &str, now: DateTime<Utc>) -> bool {
    match parse_date_time(date_time) {
        Ok(target) => target < to_sao_paulo(now) + Duration::hours(1),
        Err(_) => false,
    }
}

/// Last day on which an activity ending at `end` may still be edited: the
/// following Monday, or the Tuesday after next when `end` is a Monday.
pub fn edit_deadline(end: NaiveDate) -> NaiveDate {
    let days_to_monday = (7 - end.weekday().num_days_from_monday()) % 7;
    let offset = if days_to_monday == 0 { 8 } else { days_to_monday };
    end + Duration::days(offset as i64)
}

pub fn is_date_within_edit_period(start: &str, end: &str) -> bool {
    is_date_within_edit_period_at(start, end, sao_paulo_now())
}

/// `now` is a Sao Paulo wall time. The deadline day is inclusive.
pub fn is_date_within_edit_period_at(start: &str, end: &str, now: NaiveDateTime) -> bool {
    let (Ok(start), Ok(end)) = (parse_date_time(start), parse_date(end)) else {
        return false;
    };
    let Some(closes) = edit_deadline(end).succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) else {
        return false;
    };
    start <= now && now < closes
}

pub fn check_if_any_date_is_after_today<S: AsRef<str>>(dates: &[S]) -> bool {
    check_if_any_date_is_after_today_at(dates, sao_paulo_today())
}

pub fn check_if_any_date_is_after_today_at<S: AsRef<str>>(dates: &[S], today: NaiveDate) -> bool {
    dates
        .iter()
        .filter_map(|d| parse_date(d.as_ref()).ok())
        .any(|d| d > today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn wall(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn date_only_strings_keep_their_day_number() {
        for (input, expected) in [("2025-08-01", 1), ("2025-08-18", 18), ("2024-02-29", 29), ("2025-12-31", 31)] {
            assert_eq!(get_date_object(input).day_number, expected, "{}", input);
        }
    }

    #[test]
    fn date_time_strings_expose_the_hour() {
        let obj = get_date_object("2025-08-18 14:00:00");
        assert_eq!(
            obj,
            DateObject {
                day_name: "seg.".to_string(),
                day_number: 18,
                month_name: "agosto".to_string(),
                hour: "14:00".to_string(),
                valid: true,
            }
        );
    }

    #[test]
    fn date_only_strings_report_midnight() {
        let obj = get_date_object("2025-09-01");
        assert_eq!(obj.month_name, "setembro");
        assert_eq!(obj.hour, "00:00");
    }

    #[test]
    fn malformed_input_renders_invalid_instead_of_failing() {
        for input in ["", "18/08/2025", "2025-13-01", "2025-08-18 25:00:00", "2025-08-18T14:00:00"] {
            let obj = get_date_object(input);
            assert!(!obj.valid, "{}", input);
            assert_eq!(obj.day_name, "Invalid Date");
            assert!(parse_date_object(input).is_err());
        }
    }

    #[test]
    fn before_today_threshold_is_yesterday() {
        let today = day("2025-08-20");
        assert!(!date_is_before_today_at("2025-08-20", today));
        assert!(!date_is_before_today_at("2025-08-19", today));
        assert!(date_is_before_today_at("2025-08-18", today));
        assert!(!date_is_before_today_at("2025-08-21", today));
        assert!(!date_is_before_today_at("garbage", today));
    }

    #[test]
    fn before_today_threshold_against_the_real_clock() {
        let today = sao_paulo_today();
        let yesterday = (today - Duration::days(1)).format("%Y-%m-%d").to_string();
        let two_days_ago = (today - Duration::days(2)).format("%Y-%m-%d").to_string();
        assert!(!date_is_before_today(&yesterday));
        assert!(date_is_before_today(&two_days_ago));
    }

    #[test]
    fn one_hour_window_uses_sao_paulo_wall_time() {
        // 12:00 UTC is 09:00 in Sao Paulo
        let now = Utc.with_ymd_and_hms(2025, 8, 18, 12, 0, 0).unwrap();
        assert!(is_date_time_one_hour_before_at("2025-08-18 09:30:00", now));
        assert!(is_date_time_one_hour_before_at("2025-08-18 08:00:00", now));
        assert!(!is_date_time_one_hour_before_at("2025-08-18 10:30:00", now));
        assert!(!is_date_time_one_hour_before_at("2025-08-18 10:00:00", now));
    }

    #[test]
    fn one_hour_window_against_the_real_clock() {
        let now = sao_paulo_now();
        let soon = (now + Duration::minutes(30)).format("%Y-%m-%d %H:%M:%S").to_string();
        let later = (now + Duration::minutes(90)).format("%Y-%m-%d %H:%M:%S").to_string();
        assert!(is_date_time_one_hour_before(&soon));
        assert!(!is_date_time_one_hour_before(&later));
    }

    #[test]
    fn edit_deadline_is_next_monday() {
        // 2025-08-20 is a Wednesday
        assert_eq!(edit_deadline(day("2025-08-20")), day("2025-08-25"));
        // Sunday rolls to the next day
        assert_eq!(edit_deadline(day("2025-08-24")), day("2025-08-25"));
        // Monday skips to the Tuesday after next
        assert_eq!(edit_deadline(day("2025-08-18")), day("2025-08-26"));
    }

    #[test]
    fn edit_period_spans_start_to_deadline_inclusive() {
        let (start, end) = ("2025-08-11", "2025-08-20");
        assert!(!is_date_within_edit_period_at(start, end, wall("2025-08-10 23:59:59")));
        assert!(is_date_within_edit_period_at(start, end, wall("2025-08-11 00:00:00")));
        assert!(is_date_within_edit_period_at(start, end, wall("2025-08-25 23:59:59")));
        assert!(!is_date_within_edit_period_at(start, end, wall("2025-08-26 00:00:00")));
        assert!(!is_date_within_edit_period_at("nope", end, wall("2025-08-15 10:00:00")));
    }

    #[test]
    fn edit_period_is_stable_for_the_same_instant() {
        let now = wall("2025-08-15 10:00:00");
        let first = is_date_within_edit_period_at("2025-08-11", "2025-08-20", now);
        for _ in 0..5 {
            assert_eq!(is_date_within_edit_period_at("2025-08-11", "2025-08-20", now), first);
        }
    }

    #[test]
    fn any_date_after_today_ignores_time_of_day() {
        let today = day("2025-08-20");
        assert!(!check_if_any_date_is_after_today_at(&["2020-01-01"], today));
        assert!(!check_if_any_date_is_after_today_at(&["2025-08-20 23:00:00"], today));
        assert!(check_if_any_date_is_after_today_at(&["2020-01-01", "2025-08-21"], today));
        assert!(!check_if_any_date_is_after_today_at::<&str>(&[], today));
    }

    #[test]
    fn any_date_after_today_against_the_real_clock() {
        let tomorrow = (sao_paulo_today() + Duration::days(1)).format("%Y-%m-%d").to_string();
        assert!(!check_if_any_date_is_after_today(&["2020-01-01"]));
        assert!(check_if_any_date_is_after_today(&[tomorrow]));
    }
}
