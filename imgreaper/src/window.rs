//! Calendar gate restricting collection passes to permitted days and hours.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{ReaperError, Result};

/// Timezone the window is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowZone {
    Local,
    /// Named IANA zone, follows daylight saving changes
    Named(Tz),
    Fixed(FixedOffset),
}

impl WindowZone {
    fn localize(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            WindowZone::Local => instant.with_timezone(&Local).naive_local(),
            WindowZone::Named(tz) => instant.with_timezone(tz).naive_local(),
            WindowZone::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }
}

impl FromStr for WindowZone {
    type Err = ReaperError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            return Ok(WindowZone::Local);
        }
        if s.eq_ignore_ascii_case("utc") {
            return Ok(WindowZone::Named(Tz::UTC));
        }

        let invalid = || ReaperError::Config(format!("unsupported timezone {s:?}"));
        let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
            (1, rest)
        } else if let Some(rest) = s.strip_prefix('-') {
            (-1, rest)
        } else {
            return s.parse::<Tz>().map(WindowZone::Named).map_err(|_| invalid());
        };
        let (hours, minutes) = parse_clock(rest)
            .filter(|&(_, minutes)| minutes < 60)
            .ok_or_else(invalid)?;
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60) as i32)
            .map(WindowZone::Fixed)
            .ok_or_else(invalid)
    }
}

/// Days and daily hours during which collection is allowed.
///
/// When `end` is before `start` the window spans midnight, and the hours
/// after midnight belong to the window that opened the previous day.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    days: HashSet<Weekday>,
    start: NaiveTime,
    end: NaiveTime,
    zone: WindowZone,
}

impl TimeWindow {
    pub fn new(
        days: HashSet<Weekday>,
        start: NaiveTime,
        end: NaiveTime,
        zone: WindowZone,
    ) -> Result<Self> {
        if days.is_empty() {
            return Err(ReaperError::Config("cleanup days must not be empty".to_string()));
        }
        if start == end {
            return Err(ReaperError::Config(format!(
                "cleanup window start and end are both {}",
                start.format("%H:%M")
            )));
        }
        Ok(Self {
            days,
            start,
            end,
            zone,
        })
    }

    /// Build a window from textual day names, `H:MM` times and a timezone name.
    pub fn from_settings<S: AsRef<str>>(days: &[S], start: &str, end: &str, zone: &str) -> Result<Self> {
        let days = days
            .iter()
            .map(|day| {
                let day = day.as_ref().trim();
                day.parse::<Weekday>()
                    .map_err(|_| ReaperError::Config(format!("unknown weekday {day:?}")))
            })
            .collect::<Result<HashSet<_>>>()?;

        Self::new(days, parse_time(start)?, parse_time(end)?, zone.parse()?)
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let local = self.zone.localize(instant);
        let time = local.time();
        let day = local.date().weekday();

        if self.wraps_midnight() {
            if time >= self.start {
                self.days.contains(&day)
            } else if time < self.end {
                self.days.contains(&day.pred())
            } else {
                false
            }
        } else {
            time >= self.start && time < self.end && self.days.contains(&day)
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut days: Vec<Weekday> = self.days.iter().copied().collect();
        days.sort_by_key(|d| d.num_days_from_monday());
        let days: Vec<String> = days.iter().map(|d| d.to_string()).collect();
        write!(
            f,
            "{} {}-{} ({:?})",
            days.join(","),
            self.start.format("%H:%M"),
            self.end.format("%H:%M"),
            self.zone
        )
    }
}

fn parse_clock(s: &str) -> Option<(u32, u32)> {
    let (hours, minutes) = s.split_once(':')?;
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 || !digits(hours) || !digits(minutes) {
        return None;
    }
    Some((hours.parse().ok()?, minutes.parse().ok()?))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    parse_clock(s)
        .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .ok_or_else(|| ReaperError::Config(format!("invalid time of day {s:?}, expected HH:MM")))
}
