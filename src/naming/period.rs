//! Cadence implementation
//!
//! Defines the time buckets used for rotation and archiving and provides
//! functionality for creating period keys and parsing them back.

use std::fmt;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Months, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::naming::{PeriodKey, SEPARATOR};

/// Time bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// One bucket per hour
    #[serde(alias = "hourly")]
    Hour,
    /// One bucket per day
    #[serde(alias = "daily")]
    Day,
    /// One bucket per ISO week, keyed by its Monday
    #[serde(alias = "weekly")]
    Week,
    /// One bucket per calendar month
    #[serde(alias = "monthly")]
    Month,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Hour => write!(f, "hourly"),
            Cadence::Day => write!(f, "daily"),
            Cadence::Week => write!(f, "weekly"),
            Cadence::Month => write!(f, "monthly"),
        }
    }
}

impl Cadence {
    /// Parse a cadence from a string
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "h" | "hour" | "hourly" => Ok(Self::Hour),
            "d" | "day" | "daily" => Ok(Self::Day),
            "w" | "week" | "weekly" => Ok(Self::Week),
            "m" | "month" | "monthly" => Ok(Self::Month),
            _ => Err(Error::config(format!("Unknown cadence: {}", s))),
        }
    }

    /// Whether this cadence may be used for rotating the active log file
    pub fn is_rotation_cadence(&self) -> bool {
        matches!(self, Self::Hour | Self::Day)
    }

    /// Nominal length of one bucket, used only to compare cadences
    pub fn nominal(&self) -> ChronoDuration {
        match self {
            Self::Hour => ChronoDuration::hours(1),
            Self::Day => ChronoDuration::days(1),
            Self::Week => ChronoDuration::weeks(1),
            Self::Month => ChronoDuration::days(30),
        }
    }

    /// Create a period key from a timestamp
    pub fn period_key(&self, timestamp: &DateTime<Utc>) -> PeriodKey {
        match self {
            Self::Hour => format!(
                "{:04}-{:02}-{:02}{}{:02}",
                timestamp.year(),
                timestamp.month(),
                timestamp.day(),
                SEPARATOR,
                timestamp.hour()
            ),
            Self::Day => format!("{:04}-{:02}-{:02}", timestamp.year(), timestamp.month(), timestamp.day()),
            Self::Week => {
                let monday = self.period_start(timestamp);
                format!("{:04}-{:02}-{:02}", monday.year(), monday.month(), monday.day())
            }
            Self::Month => format!("{:04}-{:02}", timestamp.year(), timestamp.month()),
        }
    }

    /// Start of the bucket containing `timestamp`
    pub fn period_start(&self, timestamp: &DateTime<Utc>) -> DateTime<Utc> {
        let date = timestamp.date_naive();
        let start = match self {
            Self::Hour => date.and_hms_opt(timestamp.hour(), 0, 0),
            Self::Day => date.and_hms_opt(0, 0, 0),
            Self::Week => {
                let weekday = date.weekday().num_days_from_monday();
                (date - ChronoDuration::days(weekday as i64)).and_hms_opt(0, 0, 0)
            }
            Self::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        };
        // Every component above is in range, so the fallback is unreachable in practice
        start.map(|naive| Utc.from_utc_datetime(&naive)).unwrap_or(*timestamp)
    }

    /// Start of the bucket following the one containing `timestamp`
    pub fn next_boundary(&self, timestamp: &DateTime<Utc>) -> DateTime<Utc> {
        let start = self.period_start(timestamp);
        match self {
            Self::Hour => start + ChronoDuration::hours(1),
            Self::Day => start + ChronoDuration::days(1),
            Self::Week => start + ChronoDuration::weeks(1),
            Self::Month => start
                .checked_add_months(Months::new(1))
                .unwrap_or(start + ChronoDuration::days(31)),
        }
    }

    /// Parse a period key back into the start of its bucket
    pub fn parse_period_key(&self, key: &str) -> Result<DateTime<Utc>> {
        let invalid = || Error::naming(format!("Invalid {} period key: {}", self, key));

        let naive = match self {
            Self::Hour => {
                let (date, hour) = key.split_once(SEPARATOR).ok_or_else(invalid)?;
                if hour.len() != 2 {
                    return Err(invalid());
                }
                let hour = hour.parse::<u32>().map_err(|_| invalid())?;
                parse_date(date).ok_or_else(invalid)?.and_hms_opt(hour, 0, 0)
            }
            Self::Day | Self::Week => parse_date(key).ok_or_else(invalid)?.and_hms_opt(0, 0, 0),
            Self::Month => {
                if key.len() != 7 {
                    return Err(invalid());
                }
                NaiveDate::parse_from_str(&format!("{}-01", key), "%Y-%m-%d")
                    .map_err(|_| invalid())?
                    .and_hms_opt(0, 0, 0)
            }
        }
        .ok_or_else(invalid)?;

        let start = Utc.from_utc_datetime(&naive);
        if self.period_start(&start) != start {
            // A weekly key must name a Monday
            return Err(invalid());
        }
        Ok(start)
    }

    /// Get all cadences, finest first
    pub fn all() -> [Self; 4] {
        [Self::Hour, Self::Day, Self::Week, Self::Month]
    }
}

/// Parse a strict `YYYY-MM-DD` date
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_key_creation() {
        let timestamp = Utc.with_ymd_and_hms(2023, 5, 17, 9, 30, 0).unwrap();

        assert_eq!(Cadence::Hour.period_key(&timestamp), "2023-05-17~09");
        assert_eq!(Cadence::Day.period_key(&timestamp), "2023-05-17");
        // May 15, 2023 was a Monday
        assert_eq!(Cadence::Week.period_key(&timestamp), "2023-05-15");
        assert_eq!(Cadence::Month.period_key(&timestamp), "2023-05");
    }

    #[test]
    fn test_period_key_parsing() -> Result<()> {
        let start = Cadence::Hour.parse_period_key("2023-05-17~09")?;
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 5, 17, 9, 0, 0).unwrap());

        let start = Cadence::Day.parse_period_key("2023-05-17")?;
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 5, 17, 0, 0, 0).unwrap());

        let start = Cadence::Week.parse_period_key("2023-05-15")?;
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 5, 15, 0, 0, 0).unwrap());

        let start = Cadence::Month.parse_period_key("2023-05")?;
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap());

        assert!(Cadence::Week.parse_period_key("2023-05-17").is_err());
        assert!(Cadence::Hour.parse_period_key("2023-05-17").is_err());
        assert!(Cadence::Month.parse_period_key("2023-5").is_err());
        assert!(Cadence::Day.parse_period_key("2023-13-01").is_err());

        Ok(())
    }

    #[test]
    fn test_next_boundary() {
        let timestamp = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();

        assert_eq!(
            Cadence::Hour.next_boundary(&timestamp),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Cadence::Day.next_boundary(&timestamp),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Cadence::Month.next_boundary(&timestamp),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        // Dec 25, 2023 was a Monday
        assert_eq!(
            Cadence::Week.next_boundary(&timestamp),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_cadence_parsing() {
        assert_eq!(Cadence::parse("hourly").unwrap(), Cadence::Hour);
        assert_eq!(Cadence::parse("Day").unwrap(), Cadence::Day);
        assert_eq!(Cadence::parse("w").unwrap(), Cadence::Week);
        assert_eq!(Cadence::parse("monthly").unwrap(), Cadence::Month);
        assert!(Cadence::parse("fortnightly").is_err());

        assert!(Cadence::Hour.is_rotation_cadence());
        assert!(Cadence::Day.is_rotation_cadence());
        assert!(!Cadence::Week.is_rotation_cadence());

        let parsed: Cadence = serde_json::from_str("\"daily\"").unwrap();
        assert_eq!(parsed, Cadence::Day);
        assert_eq!(serde_json::to_string(&Cadence::Month).unwrap(), "\"month\"");
    }
}
