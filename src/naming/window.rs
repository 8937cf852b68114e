//! Retention windows
//!
//! A retention window is parsed from a duration string of the form
//! `<integer><unit>` (`"7d"`, `"12h"`, `"3 months"`) and resolves to a cutoff
//! instant: rolling subtraction for hours, days and weeks, calendar
//! subtraction for months and years.

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::naming::Cadence;

/// Unit of a retention window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl WindowUnit {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "h" | "hr" | "hour" | "hours" => Some(Self::Hour),
            "d" | "day" | "days" => Some(Self::Day),
            "w" | "week" | "weeks" => Some(Self::Week),
            "m" | "mo" | "month" | "months" => Some(Self::Month),
            "y" | "year" | "years" => Some(Self::Year),
            _ => None,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Hour => "h",
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "m",
            Self::Year => "y",
        }
    }
}

/// How far back logs and archives are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetentionWindow {
    /// Number of units, always positive
    pub value: u32,
    /// Unit of the window
    pub unit: WindowUnit,
}

impl RetentionWindow {
    /// Create a new retention window
    pub fn new(value: u32, unit: WindowUnit) -> Result<Self> {
        if value == 0 {
            return Err(Error::config("Retention duration must be positive"));
        }
        Ok(Self { value, unit })
    }

    /// Parse a duration string such as `"7d"` or `"2 weeks"`
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim().to_lowercase();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        if digits.is_empty() {
            return Err(Error::config(format!("Invalid retention duration: {:?}", s)));
        }
        let value = digits
            .parse::<u32>()
            .map_err(|_| Error::config(format!("Invalid retention duration: {:?}", s)))?;
        let unit = WindowUnit::parse(unit.trim())
            .ok_or_else(|| Error::config(format!("Unknown retention unit in {:?}", s)))?;

        Self::new(value, unit)
    }

    /// Instant before which files are expired
    pub fn cutoff(&self, now: &DateTime<Utc>) -> DateTime<Utc> {
        let value = self.value as i64;
        let cutoff = match self.unit {
            WindowUnit::Hour => now.checked_sub_signed(ChronoDuration::hours(value)),
            WindowUnit::Day => now.checked_sub_signed(ChronoDuration::days(value)),
            WindowUnit::Week => now.checked_sub_signed(ChronoDuration::weeks(value)),
            WindowUnit::Month => now.checked_sub_months(Months::new(self.value)),
            WindowUnit::Year => now.checked_sub_months(Months::new(self.value.saturating_mul(12))),
        };
        // Windows reaching past the representable range keep everything
        cutoff.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Nominal length of the window, used only to compare against cadences
    pub fn nominal(&self) -> ChronoDuration {
        let value = self.value as i64;
        match self.unit {
            WindowUnit::Hour => ChronoDuration::hours(value),
            WindowUnit::Day => ChronoDuration::days(value),
            WindowUnit::Week => ChronoDuration::weeks(value),
            WindowUnit::Month => ChronoDuration::try_days(30 * value).unwrap_or(ChronoDuration::MAX),
            WindowUnit::Year => ChronoDuration::try_days(365 * value).unwrap_or(ChronoDuration::MAX),
        }
    }

    /// How often retention should be enforced for this window
    pub fn check_cadence(&self) -> Cadence {
        match self.unit {
            WindowUnit::Hour => Cadence::Hour,
            WindowUnit::Day => Cadence::Day,
            WindowUnit::Week => Cadence::Week,
            WindowUnit::Month | WindowUnit::Year => Cadence::Month,
        }
    }
}

impl fmt::Display for RetentionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for RetentionWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
