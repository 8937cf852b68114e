//! Log, overflow and archive filenames
//!
//! Primary log files are named `<period>.log`. Overflow files append
//! `~HH-mm-ss`, then `~mmm` on a same-second collision, then `~NNNN` on a
//! same-millisecond collision. Archive bundles are `<period>-archive.tar.gz`
//! with a `-N` suffix on collision.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};

use crate::naming::period::parse_date;
use crate::naming::{Cadence, PeriodKey, ARCHIVE_SUFFIX, LOG_EXTENSION, SEPARATOR};

/// Precision used when synthesizing an overflow filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStamp {
    /// `~HH-mm-ss`
    Seconds,
    /// `~HH-mm-ss~mmm`
    Millis,
    /// `~HH-mm-ss~mmm~NNNN`
    Counter(u32),
}

/// Get the primary log filename for a period
pub fn log_file_name(period_key: &str) -> String {
    format!("{}.{}", period_key, LOG_EXTENSION)
}

/// Get an overflow log filename for a period, stamped with `timestamp`
pub fn overflow_file_name(period_key: &str, timestamp: &DateTime<Utc>, stamp: OverflowStamp) -> String {
    let clock = format!(
        "{:02}-{:02}-{:02}",
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second()
    );
    let millis = timestamp.timestamp_subsec_millis();

    match stamp {
        OverflowStamp::Seconds => format!("{}{}{}.{}", period_key, SEPARATOR, clock, LOG_EXTENSION),
        OverflowStamp::Millis => format!(
            "{}{sep}{}{sep}{:03}.{}",
            period_key,
            clock,
            millis,
            LOG_EXTENSION,
            sep = SEPARATOR
        ),
        OverflowStamp::Counter(n) => format!(
            "{}{sep}{}{sep}{:03}{sep}{:04}.{}",
            period_key,
            clock,
            millis,
            n,
            LOG_EXTENSION,
            sep = SEPARATOR
        ),
    }
}

/// Get an archive bundle filename; `index` 0 is the base name
pub fn archive_file_name(period_key: &str, index: u32) -> String {
    if index == 0 {
        format!("{}{}", period_key, ARCHIVE_SUFFIX)
    } else {
        let stem = ARCHIVE_SUFFIX.trim_end_matches(".tar.gz");
        format!("{}{}-{}.tar.gz", period_key, stem, index)
    }
}

/// A parsed log filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileName {
    /// The original filename
    pub name: String,
    /// Calendar date embedded in the name
    pub date: NaiveDate,
    /// Hour embedded in the name, from an hourly period or an overflow stamp
    pub hour: Option<u32>,
    /// Whether this is an overflow file
    pub overflow: bool,
}

impl LogFileName {
    /// Timestamp represented by the filename
    pub fn timestamp(&self) -> DateTime<Utc> {
        let naive = self
            .date
            .and_hms_opt(self.hour.unwrap_or(0), 0, 0)
            .unwrap_or_default();
        Utc.from_utc_datetime(&naive)
    }

    /// Period key this file belongs to under `cadence`
    pub fn period_key(&self, cadence: Cadence) -> PeriodKey {
        cadence.period_key(&self.timestamp())
    }
}

/// Parse a log filename; returns `None` for anything that is not a log file
pub fn parse_log_file_name(name: &str) -> Option<LogFileName> {
    let stem = name.strip_suffix(LOG_EXTENSION)?.strip_suffix('.')?;
    let mut parts = stem.split(SEPARATOR);
    let date = parse_date(parts.next()?)?;

    let mut hour = None;
    let mut overflow = false;

    for part in parts {
        if overflow && is_digits(part) {
            // millisecond or counter disambiguator
            continue;
        }
        if let Some(h) = parse_hour(part) {
            if hour.is_some() || overflow {
                return None;
            }
            hour = Some(h);
        } else if let Some(h) = parse_clock(part) {
            hour.get_or_insert(h);
            overflow = true;
        } else {
            return None;
        }
    }

    Some(LogFileName {
        name: name.to_string(),
        date,
        hour,
        overflow,
    })
}

/// A parsed archive filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFileName {
    /// The original filename
    pub name: String,
    /// Archive period key
    pub period_key: PeriodKey,
    /// Collision index (0 for the base name)
    pub index: u32,
    /// Start of the archived period
    pub timestamp: DateTime<Utc>,
}

/// Parse an archive filename; returns `None` for anything that is not a bundle
pub fn parse_archive_file_name(name: &str) -> Option<ArchiveFileName> {
    let stem = name.strip_suffix(".tar.gz")?;
    let (key, index) = match stem.strip_suffix("-archive") {
        Some(key) => (key, 0),
        None => {
            let (key, index) = stem.rsplit_once("-archive-")?;
            if !is_digits(index) {
                return None;
            }
            (key, index.parse::<u32>().ok()?)
        }
    };

    let cadence = if key.contains(SEPARATOR) {
        Cadence::Hour
    } else if key.len() == 7 {
        Cadence::Month
    } else {
        Cadence::Day
    };
    let timestamp = cadence.parse_period_key(key).ok()?;

    Some(ArchiveFileName {
        name: name.to_string(),
        period_key: key.to_string(),
        index,
        timestamp,
    })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_hour(s: &str) -> Option<u32> {
    if s.len() != 2 || !is_digits(s) {
        return None;
    }
    s.parse::<u32>().ok().filter(|h| *h < 24)
}

fn parse_clock(s: &str) -> Option<u32> {
    let mut fields = s.split('-');
    let hour = parse_hour(fields.next()?)?;
    for _ in 0..2 {
        let field = fields.next()?;
        if field.len() != 2 || !is_digits(field) {
            return None;
        }
    }
    if fields.next().is_some() {
        return None;
    }
    Some(hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_log_file_names() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42);

        assert_eq!(log_file_name("2024-03-09"), "2024-03-09.log");
        assert_eq!(
            overflow_file_name("2024-03-09", &timestamp, OverflowStamp::Seconds),
            "2024-03-09~14-05-07.log"
        );
        assert_eq!(
            overflow_file_name("2024-03-09", &timestamp, OverflowStamp::Millis),
            "2024-03-09~14-05-07~042.log"
        );
        assert_eq!(
            overflow_file_name("2024-03-09~14", &timestamp, OverflowStamp::Counter(2)),
            "2024-03-09~14~14-05-07~042~0002.log"
        );
    }

    #[test]
    fn test_counter_stamps_sort_numerically() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + chrono::Duration::milliseconds(42);
        let names: Vec<String> = [1, 9, 10, 99, 100, 9_999]
            .into_iter()
            .map(|n| overflow_file_name("2024-03-09", &timestamp, OverflowStamp::Counter(n)))
            .collect();

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, names);
        assert!(overflow_file_name("2024-03-09", &timestamp, OverflowStamp::Millis) < names[0]);
    }

    #[test]
    fn test_parse_log_file_names() {
        let primary = parse_log_file_name("2024-03-09.log").unwrap();
        assert_eq!(primary.hour, None);
        assert!(!primary.overflow);
        assert_eq!(primary.period_key(Cadence::Day), "2024-03-09");

        let hourly = parse_log_file_name("2024-03-09~14.log").unwrap();
        assert_eq!(hourly.hour, Some(14));
        assert!(!hourly.overflow);
        assert_eq!(hourly.period_key(Cadence::Hour), "2024-03-09~14");

        let overflow = parse_log_file_name("2024-03-09~14-05-07~042~0002.log").unwrap();
        assert!(overflow.overflow);
        assert_eq!(overflow.period_key(Cadence::Day), "2024-03-09");

        let hourly_overflow = parse_log_file_name("2024-03-09~14~14-05-07.log").unwrap();
        assert!(hourly_overflow.overflow);
        assert_eq!(hourly_overflow.period_key(Cadence::Hour), "2024-03-09~14");

        assert!(parse_log_file_name("2024-03-09.txt").is_none());
        assert!(parse_log_file_name("rotation.lock").is_none());
        assert!(parse_log_file_name("2024-03-09~99.log").is_none());
        assert!(parse_log_file_name("2024-03-09~abc.log").is_none());
        assert!(parse_log_file_name("2024-03-09-archive.tar.gz").is_none());
    }

    #[test]
    fn test_archive_file_names() {
        assert_eq!(archive_file_name("2024-03", 0), "2024-03-archive.tar.gz");
        assert_eq!(archive_file_name("2024-03-09~14", 2), "2024-03-09~14-archive-2.tar.gz");

        let parsed = parse_archive_file_name("2024-03-archive.tar.gz").unwrap();
        assert_eq!(parsed.period_key, "2024-03");
        assert_eq!(parsed.index, 0);
        assert_eq!(parsed.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        let parsed = parse_archive_file_name("2024-03-09~14-archive-2.tar.gz").unwrap();
        assert_eq!(parsed.period_key, "2024-03-09~14");
        assert_eq!(parsed.index, 2);
        assert_eq!(parsed.timestamp, Utc.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap());

        assert!(parse_archive_file_name("2024-03-09.log").is_none());
        assert!(parse_archive_file_name("notes-archive.tar.gz").is_none());
    }

    proptest! {
        #[test]
        fn overflow_files_sort_after_primary_and_in_time_order(
            secs_a in 0i64..86_400_000,
            secs_b in 0i64..86_400_000,
        ) {
            let day = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
            let a = day + chrono::Duration::milliseconds(secs_a);
            let b = day + chrono::Duration::milliseconds(secs_b);
            let key = Cadence::Day.period_key(&a);
            let primary = log_file_name(&key);
            let name_a = overflow_file_name(&key, &a, OverflowStamp::Millis);
            let name_b = overflow_file_name(&key, &b, OverflowStamp::Millis);

            prop_assert!(primary < name_a);
            prop_assert!(primary < name_b);
            prop_assert_eq!(a.cmp(&b), name_a.cmp(&name_b));
        }

        #[test]
        fn primary_files_sort_in_time_order(hours_a in 0i64..100_000, hours_b in 0i64..100_000) {
            let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
            let a = epoch + chrono::Duration::hours(hours_a);
            let b = epoch + chrono::Duration::hours(hours_b);
            let name_a = log_file_name(&Cadence::Hour.period_key(&a));
            let name_b = log_file_name(&Cadence::Hour.period_key(&b));

            prop_assert_eq!(a.cmp(&b), name_a.cmp(&name_b));
        }
    }
}
