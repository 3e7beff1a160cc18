//! Daily trigger time.
//!
//! The hosted job fires from a cron expression; the same expression drives
//! `segtrack schedule` and the local daemon loop so both agree on when the
//! next run happens. Only the daily `M H * * *` form is accepted.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 09:15 UTC every day.
pub const DEFAULT_CRON: &str = "15 9 * * *";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("cron expression needs 5 fields, got {0}")]
    FieldCount(usize),

    #[error("only daily schedules are supported; field '{field}' must be '*', got '{value}'")]
    NotDaily { field: &'static str, value: String },

    #[error("invalid minute '{0}' (expected 0-59)")]
    Minute(String),

    #[error("invalid hour '{0}' (expected 0-23)")]
    Hour(String),
}

/// Fires once a day at `hour:minute` UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    hour: u32,
    minute: u32,
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self { hour: 9, minute: 15 }
    }
}

impl DailySchedule {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        if hour > 23 {
            return Err(ScheduleError::Hour(hour.to_string()));
        }
        if minute > 59 {
            return Err(ScheduleError::Minute(minute.to_string()));
        }
        Ok(Self { hour, minute })
    }

    pub fn from_cron(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }
        for (field, value) in ["day-of-month", "month", "day-of-week"]
            .into_iter()
            .zip(&fields[2..])
        {
            if *value != "*" {
                return Err(ScheduleError::NotDaily {
                    field,
                    value: value.to_string(),
                });
            }
        }
        let minute = fields[0]
            .parse::<u32>()
            .ok()
            .filter(|m| *m <= 59)
            .ok_or_else(|| ScheduleError::Minute(fields[0].to_string()))?;
        let hour = fields[1]
            .parse::<u32>()
            .ok()
            .filter(|h| *h <= 23)
            .ok_or_else(|| ScheduleError::Hour(fields[1].to_string()))?;
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// The cron form of this schedule.
    pub fn to_cron(&self) -> String {
        format!("{} {} * * *", self.minute, self.hour)
    }

    fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// First trigger strictly after `t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let today = t.date_naive().and_time(self.time()).and_utc();
        if today > t {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// True when `t` falls within the trigger minute.
    pub fn is_due(&self, t: DateTime<Utc>) -> bool {
        t.hour() == self.hour && t.minute() == self.minute
    }

    /// The next `n` triggers after `from`.
    pub fn upcoming(&self, from: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(n);
        let mut cursor = from;
        for _ in 0..n {
            cursor = self.next_after(cursor);
            out.push(cursor);
        }
        out
    }
}

impl FromStr for DailySchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cron(s)
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daily at {:02}:{:02} UTC", self.hour, self.minute)
    }
}
