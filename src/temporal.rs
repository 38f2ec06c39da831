/*
Temporal resolution for natural-language dates.
Turns partial date components (as extracted from free text) into one
local wall-clock timestamp. No timezone conversion happens anywhere here.
*/

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

// Time used when the input names a day but no time of day.
pub const DEFAULT_HOUR: u32 = 9;
pub const DEFAULT_MINUTE: u32 = 0;

const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A local wall-clock timestamp without offset information.
///
/// Serialized as `YYYY-MM-DDTHH:MM:SS`. Parsing also accepts the shorter
/// `YYYY-MM-DDTHH:MM` form, a bare `YYYY-MM-DD` (midnight) and RFC 3339
/// strings, whose offset is dropped and wall time kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalDateTime(NaiveDateTime);

impl LocalDateTime {
    pub const fn new(value: NaiveDateTime) -> Self {
        Self(value)
    }

    pub const fn naive(self) -> NaiveDateTime {
        self.0
    }

    pub fn date(self) -> NaiveDate {
        self.0.date()
    }

    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Self(dt));
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Self(dt.naive_local()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(|d| Self(start_of_day(d)))
    }
}

impl From<NaiveDateTime> for LocalDateTime {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

impl fmt::Display for LocalDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(OUTPUT_FORMAT))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid local timestamp: {0}")]
pub struct ParseLocalDateTimeError(String);

impl FromStr for LocalDateTime {
    type Err = ParseLocalDateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ParseLocalDateTimeError(s.to_string()))
    }
}

impl Serialize for LocalDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Raw date fields as returned by the extraction service.
///
/// Every field is optional; `0` is treated the same as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateComponents {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub day: Option<u32>,
    #[serde(default)]
    pub time: Option<String>, // "HH:mm", 24h
}

impl DateComponents {
    fn year(&self) -> Option<i32> {
        self.year.filter(|y| *y != 0)
    }

    fn month(&self) -> Option<u32> {
        self.month.filter(|m| *m != 0)
    }

    fn day(&self) -> Option<u32> {
        self.day.filter(|d| *d != 0)
    }

    /// Whether there is enough here to resolve at all (a day or a month).
    pub fn has_date(&self) -> bool {
        self.day().is_some() || self.month().is_some()
    }
}

/// Resolve partial components against the reference `now`.
///
/// - missing year / month / day fall back to the reference date
/// - missing or unreadable time falls back to 09:00
/// - without an explicit year, a date that ended before today rolls to next year
///
/// Out-of-range days and months overflow into the following month / year
/// (Feb 30 becomes Mar 1 or 2), so any input yields a timestamp.
pub fn resolve(components: &DateComponents, now: NaiveDateTime) -> LocalDateTime {
    let today = now.date();
    let explicit_year = components.year();

    let mut year = explicit_year.unwrap_or_else(|| today.year());
    let month = components.month().unwrap_or_else(|| today.month());
    let day = components.day().unwrap_or_else(|| today.day());

    let time = components
        .time
        .as_deref()
        .and_then(|raw| {
            let parsed = NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok();
            if parsed.is_none() {
                debug!(time = raw, "unreadable time component, using default");
            }
            parsed
        })
        .or_else(|| NaiveTime::from_hms_opt(DEFAULT_HOUR, DEFAULT_MINUTE, 0))
        .unwrap_or_default();

    if explicit_year.is_none() {
        if let Some(trial) = overflowing_date(year, month, day) {
            let trial_end = start_of_day(trial) + Duration::seconds(86_399);
            if trial_end < start_of_day(today) {
                year += 1;
            }
        }
    }

    let date = overflowing_date(year, month, day).unwrap_or_else(|| {
        debug!(year, month, day, "date components out of range, using reference date");
        today
    });

    LocalDateTime::new(date.and_time(time))
}

// Build a date the way a lenient calendar would: month 13 is January of the
// next year, day 32 spills into the next month.
fn overflowing_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let months_from_jan = i64::from(month) - 1;
    let year = year.checked_add(i32::try_from(months_from_jan.div_euclid(12)).ok()?)?;
    let month = u32::try_from(months_from_jan.rem_euclid(12)).ok()? + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    first.checked_add_signed(Duration::days(i64::from(day) - 1))
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

// Local -> FixedOffset (current system offset)
pub fn now_fixed_offset() -> DateTime<FixedOffset> {
    chrono::Local::now().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .unwrap_or_else(|| panic!("valid test timestamp {y}-{m}-{d} {h}:{min}"))
    }

    fn components(year: Option<i32>, month: Option<u32>, day: Option<u32>, time: Option<&str>) -> DateComponents {
        DateComponents {
            year,
            month,
            day,
            time: time.map(str::to_string),
        }
    }

    #[test]
    fn past_date_without_year_rolls_to_next_year() {
        let now = at(2024, 7, 1, 14, 30);
        let resolved = resolve(&components(None, Some(6), Some(5), None), now);
        assert_eq!(resolved.naive(), at(2025, 6, 5, 9, 0));
    }

    #[test]
    fn future_date_without_year_stays_in_current_year() {
        let now = at(2024, 7, 1, 14, 30);
        let resolved = resolve(&components(None, Some(12), Some(25), None), now);
        assert_eq!(resolved.naive(), at(2024, 12, 25, 9, 0));
    }

    #[test]
    fn explicit_year_is_never_adjusted() {
        let now = at(2024, 7, 1, 14, 30);
        let resolved = resolve(&components(Some(2020), Some(6), Some(5), None), now);
        assert_eq!(resolved.naive(), at(2020, 6, 5, 9, 0));
    }

    #[test]
    fn today_does_not_roll_over_even_after_default_time() {
        let now = at(2024, 7, 1, 23, 0);
        let resolved = resolve(&components(None, Some(7), Some(1), None), now);
        assert_eq!(resolved.naive(), at(2024, 7, 1, 9, 0));
    }

    #[test]
    fn yesterday_without_year_rolls_over() {
        let now = at(2024, 7, 1, 0, 5);
        let resolved = resolve(&components(None, Some(6), Some(30), Some("18:00")), now);
        assert_eq!(resolved.naive(), at(2025, 6, 30, 18, 0));
    }

    #[test]
    fn explicit_time_is_used() {
        let now = at(2024, 7, 1, 8, 0);
        let resolved = resolve(&components(None, Some(7), Some(2), Some("17:05")), now);
        assert_eq!(resolved.naive(), at(2024, 7, 2, 17, 5));
    }

    #[test]
    fn unreadable_time_falls_back_to_nine() {
        let now = at(2024, 7, 1, 8, 0);
        for raw in ["5pm", "25:00", "12:60", ""] {
            let resolved = resolve(&components(None, Some(7), Some(2), Some(raw)), now);
            assert_eq!(resolved.naive(), at(2024, 7, 2, 9, 0), "time {raw:?}");
        }
    }

    #[test]
    fn stated_time_tolerates_padding_and_single_digit_hours() {
        let now = at(2024, 7, 1, 8, 0);
        let resolved = resolve(&components(None, Some(7), Some(2), Some(" 18:30 ")), now);
        assert_eq!(resolved.naive(), at(2024, 7, 2, 18, 30));

        let resolved = resolve(&components(None, Some(7), Some(2), Some("7:05")), now);
        assert_eq!(resolved.naive(), at(2024, 7, 2, 7, 5));
    }

    #[test]
    fn day_only_uses_reference_month() {
        let now = at(2024, 7, 1, 8, 0);
        let resolved = resolve(&components(None, None, Some(20), None), now);
        assert_eq!(resolved.naive(), at(2024, 7, 20, 9, 0));
    }

    #[test]
    fn month_only_uses_reference_day() {
        let now = at(2024, 7, 10, 8, 0);
        let resolved = resolve(&components(None, Some(9), None, None), now);
        assert_eq!(resolved.naive(), at(2024, 9, 10, 9, 0));

        let resolved = resolve(&components(None, Some(3), None, None), now);
        assert_eq!(resolved.naive(), at(2025, 3, 10, 9, 0));
    }

    #[test]
    fn zero_components_count_as_missing() {
        let comps = components(Some(0), Some(0), Some(0), None);
        assert!(!comps.has_date());
        assert!(components(None, None, Some(3), None).has_date());
        assert!(components(None, Some(3), None, None).has_date());
        assert!(!DateComponents::default().has_date());
    }

    #[test]
    fn overflowing_days_spill_into_next_month() {
        let now = at(2023, 1, 10, 8, 0);
        let resolved = resolve(&components(None, Some(2), Some(30), None), now);
        assert_eq!(resolved.naive(), at(2023, 3, 2, 9, 0));
    }

    #[test]
    fn leap_day_rolled_into_common_year_overflows() {
        // 2024-02-29 is already past on 2024-03-10, so the year becomes 2025,
        // which has no Feb 29.
        let now = at(2024, 3, 10, 8, 0);
        let resolved = resolve(&components(None, Some(2), Some(29), None), now);
        assert_eq!(resolved.naive(), at(2025, 3, 1, 9, 0));
    }

    #[test]
    fn local_datetime_accepts_common_shapes() {
        let expected = at(2024, 1, 2, 3, 4);
        for raw in [
            "2024-01-02T03:04",
            "2024-01-02T03:04:00",
            "2024-01-02 03:04",
            "2024-01-02T03:04:00+09:00",
            "2024-01-02T03:04:00Z",
        ] {
            assert_eq!(LocalDateTime::parse(raw).map(LocalDateTime::naive), Some(expected), "{raw}");
        }
        assert_eq!(
            LocalDateTime::parse("2024-01-02").map(LocalDateTime::naive),
            Some(at(2024, 1, 2, 0, 0))
        );
        assert!(LocalDateTime::parse("next tuesday").is_none());
    }

    #[test]
    fn local_datetime_serializes_without_offset() {
        let value = LocalDateTime::new(at(2024, 12, 25, 9, 0));
        let json = serde_json::to_string(&value).unwrap_or_else(|err| panic!("serialize: {err}"));
        assert_eq!(json, "\"2024-12-25T09:00:00\"");
        let back: LocalDateTime =
            serde_json::from_str(&json).unwrap_or_else(|err| panic!("deserialize: {err}"));
        assert_eq!(back, value);
    }
}
