//! Source configuration and schedule types.
//!
//! A source's schedule is a time of day plus a set of weekdays. Schedules are
//! rendered as six-field cron expressions (`sec min hour dom month dow`) in
//! the format `tokio-cron-scheduler` accepts, evaluated in UTC.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Digest send time used when the `digest_time` setting is absent.
pub const DEFAULT_DIGEST_TIME: &str = "15:30";

/// Minutes after the digest at which retention cleanup runs.
const CLEANUP_OFFSET_MINUTES: i64 = 5;
/// Minutes after the digest at which daily run statistics are reset.
const RESET_OFFSET_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    /// Three-letter lowercase name, as stored in `sources.schedule_days`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Mon => "mon",
            Weekday::Tue => "tue",
            Weekday::Wed => "wed",
            Weekday::Thu => "thu",
            Weekday::Fri => "fri",
            Weekday::Sat => "sat",
            Weekday::Sun => "sun",
        }
    }

    fn cron_name(self) -> &'static str {
        match self {
            Weekday::Mon => "MON",
            Weekday::Tue => "TUE",
            Weekday::Wed => "WED",
            Weekday::Thu => "THU",
            Weekday::Fri => "FRI",
            Weekday::Sat => "SAT",
            Weekday::Sun => "SUN",
        }
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mon" | "monday" => Ok(Weekday::Mon),
            "tue" | "tues" | "tuesday" => Ok(Weekday::Tue),
            "wed" | "wednesday" => Ok(Weekday::Wed),
            "thu" | "thur" | "thurs" | "thursday" => Ok(Weekday::Thu),
            "fri" | "friday" => Ok(Weekday::Fri),
            "sat" | "saturday" => Ok(Weekday::Sat),
            "sun" | "sunday" => Ok(Weekday::Sun),
            other => Err(ConfigError::InvalidSchedule(format!(
                "unknown weekday '{other}'"
            ))),
        }
    }
}

/// Parse an `HH:MM` time of day.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSchedule`] if the value is not a valid
/// 24-hour `HH:MM` time.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| ConfigError::InvalidSchedule(format!("invalid time '{raw}': {e}")))
}

/// When a source runs: a UTC time of day on a set of weekdays.
///
/// An empty weekday set means every day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub time: NaiveTime,
    pub days: BTreeSet<Weekday>,
}

impl Schedule {
    /// Build a schedule from its stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSchedule`] for a malformed time or an
    /// unknown weekday name.
    pub fn parse<S: AsRef<str>>(time: &str, days: &[S]) -> Result<Self, ConfigError> {
        let time = parse_time_of_day(time)?;
        let days = days
            .iter()
            .map(AsRef::as_ref)
            .filter(|d| !d.trim().is_empty())
            .map(str::parse)
            .collect::<Result<BTreeSet<Weekday>, _>>()?;
        Ok(Self { time, days })
    }

    /// Six-field cron expression for this schedule.
    #[must_use]
    pub fn cron_expression(&self) -> String {
        let dow = if self.days.is_empty() {
            "*".to_string()
        } else {
            self.days
                .iter()
                .map(|d| d.cron_name())
                .collect::<Vec<_>>()
                .join(",")
        };
        format!("0 {} {} * * {dow}", self.time.minute(), self.time.hour())
    }

    /// `HH:MM` rendering of the time of day.
    #[must_use]
    pub fn time_string(&self) -> String {
        self.time.format("%H:%M").to_string()
    }

    /// Weekday names in storage form.
    #[must_use]
    pub fn day_names(&self) -> Vec<String> {
        self.days.iter().map(|d| d.as_str().to_string()).collect()
    }
}

/// Six-field cron expression that fires every day at `time`.
#[must_use]
pub fn daily_cron(time: NaiveTime) -> String {
    format!("0 {} {} * * *", time.minute(), time.hour())
}

/// A configured job-listing source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub schedule: Schedule,
    pub keywords: Vec<String>,
}

/// The digest trigger and the two system triggers derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestTriggerTimes {
    pub digest: NaiveTime,
    pub cleanup: NaiveTime,
    pub reset: NaiveTime,
}

impl DigestTriggerTimes {
    #[must_use]
    pub fn digest_cron(&self) -> String {
        daily_cron(self.digest)
    }

    #[must_use]
    pub fn cleanup_cron(&self) -> String {
        daily_cron(self.cleanup)
    }

    #[must_use]
    pub fn reset_cron(&self) -> String {
        daily_cron(self.reset)
    }
}

/// Derive cleanup and reset times from the digest time, wrapping at midnight.
#[must_use]
pub fn digest_trigger_times(digest: NaiveTime) -> DigestTriggerTimes {
    let (cleanup, _) = digest.overflowing_add_signed(TimeDelta::minutes(CLEANUP_OFFSET_MINUTES));
    let (reset, _) = digest.overflowing_add_signed(TimeDelta::minutes(RESET_OFFSET_MINUTES));
    DigestTriggerTimes {
        digest,
        cleanup,
        reset,
    }
}
