use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("clock pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("no clock time found in `{0}`")]
    NoTimePattern(String),
    #[error("clock time {hour}:{minute:02} is out of range")]
    OutOfRange { hour: u32, minute: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("window start {start} is after window end {end}")]
    Inverted { start: TimeOfDay, end: TimeOfDay },
    #[error(transparent)]
    Bound(#[from] TimeParseError),
}

/// A wall-clock time with minute resolution, always in 24-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, TimeParseError> {
        if hour > 23 || minute > 59 {
            return Err(TimeParseError::OutOfRange { hour, minute });
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(&self) -> u32 {
        u32::from(self.hour)
    }

    pub fn minute(&self) -> u32 {
        u32::from(self.minute)
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour() * 60 + self.minute()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time(s)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_time(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Parse the first `H:MM`/`HH:MM` occurrence in `raw`, honouring an `AM`/`PM`
/// marker found anywhere in the string. Seconds are ignored.
pub fn parse_time(raw: &str) -> Result<TimeOfDay, TimeParseError> {
    let caps = CLOCK_RE
        .captures(raw)
        .ok_or_else(|| TimeParseError::NoTimePattern(raw.to_string()))?;
    let mut hour: u32 = caps[1]
        .parse()
        .map_err(|_| TimeParseError::NoTimePattern(raw.to_string()))?;
    let minute: u32 = caps[2]
        .parse()
        .map_err(|_| TimeParseError::NoTimePattern(raw.to_string()))?;

    let upper = raw.to_ascii_uppercase();
    if upper.contains("PM") && hour < 12 {
        hour += 12;
    } else if upper.contains("AM") && hour == 12 {
        hour = 0;
    }
    TimeOfDay::new(hour, minute)
}

/// Inclusive clock-time range. Windows never wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl TimeWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    pub fn contains(&self, time: TimeOfDay) -> bool {
        let minutes = time.minutes_since_midnight();
        self.start.minutes_since_midnight() <= minutes
            && minutes <= self.end.minutes_since_midnight()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The textual forms a reservation date is recognised by: ISO, US and
/// day-first, with unpadded month and day in the slash forms.
pub fn date_representations(date: NaiveDate) -> [String; 3] {
    [
        date.format("%Y-%m-%d").to_string(),
        format!("{}/{}/{}", date.month(), date.day(), date.year()),
        format!("{}/{}/{}", date.day(), date.month(), date.year()),
    ]
}

/// Durable identity of a notified slot, e.g. `2024-03-15_19:30`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifiedKey(String);

impl NotifiedKey {
    pub fn new(date: NaiveDate, time: TimeOfDay) -> Self {
        Self(format!("{}_{}", date.format("%Y-%m-%d"), time))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> String {
        parse_time(raw).unwrap().to_string()
    }

    #[test]
    fn normalizes_common_forms() {
        assert_eq!(t("19:30"), "19:30");
        assert_eq!(t("19:30:00"), "19:30");
        assert_eq!(t("7:30 PM"), "19:30");
        assert_eq!(t("7:30pm"), "19:30");
        assert_eq!(t("12:15 AM"), "00:15");
        assert_eq!(t("12:15 PM"), "12:15");
        assert_eq!(t("9:05"), "09:05");
        assert_eq!(t("2024-03-15T08:05:00"), "08:05");
    }

    #[test]
    fn rejects_missing_or_out_of_range() {
        assert!(matches!(
            parse_time("tomorrow evening"),
            Err(TimeParseError::NoTimePattern(_))
        ));
        assert_eq!(
            parse_time("25:10"),
            Err(TimeParseError::OutOfRange {
                hour: 25,
                minute: 10
            })
        );
        assert!(parse_time("10:75").is_err());
        assert!(TimeOfDay::new(24, 0).is_err());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = TimeWindow::parse("18:00", "21:00").unwrap();
        assert!(window.contains(t_of("18:00")));
        assert!(window.contains(t_of("21:00")));
        assert!(window.contains(t_of("19:30")));
        assert!(!window.contains(t_of("17:59")));
        assert!(!window.contains(t_of("21:01")));
    }

    #[test]
    fn inverted_window_is_rejected() {
        assert!(matches!(
            TimeWindow::parse("22:00", "01:00"),
            Err(WindowError::Inverted { .. })
        ));
    }

    #[test]
    fn dates_render_in_three_forms() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            date_representations(date),
            ["2024-03-05".to_string(), "3/5/2024".into(), "5/3/2024".into()]
        );
    }

    #[test]
    fn notified_key_joins_date_and_time() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let key = NotifiedKey::new(date, t_of("7:30 PM"));
        assert_eq!(key.as_str(), "2024-03-15_19:30");
    }

    #[test]
    fn time_serializes_as_canonical_string() {
        let json = serde_json::to_string(&t_of("8:05")).unwrap();
        assert_eq!(json, "\"08:05\"");
        let back: TimeOfDay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t_of("08:05"));
    }

    fn t_of(raw: &str) -> TimeOfDay {
        raw.parse().unwrap()
    }
}
