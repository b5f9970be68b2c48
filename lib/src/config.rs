/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::{fmt::Display, path::PathBuf, str::FromStr};

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(default)]
pub struct JobConfig {
    pub input_table: String,
    pub output_table: String,
    pub column_family: String,
    pub partitions: u16,
    pub interval: IntervalConfig,
    pub top_query_limit: usize,
    pub groups_file: PathBuf,
    pub users_file: PathBuf,
    pub storage_interval: StorageInterval,
    pub combine: bool,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(default)]
pub struct IntervalConfig {
    pub from: Option<String>,
    pub to: Option<String>,
    pub format: String,
}

/// Alignment of the time bucket stored in input row keys.
#[derive(SerializeDisplay, DeserializeFromStr, PartialEq, Eq, Clone, Copy, Debug)]
pub enum StorageInterval {
    Hour,
    Day,
}

/// Padded wall-clock interval of readings to aggregate. The lower bound
/// is the first day of the month before the configured start (00:00),
/// the upper bound the last day of the month after the configured end
/// (23:00).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct ReportingInterval {
    from: NaiveDateTime,
    to: NaiveDateTime,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input_table: String::from("daiad:meter-data"),
            output_table: String::from("daiad:meter-data-aggregate"),
            column_family: String::from("cf"),
            partitions: 5,
            interval: IntervalConfig::default(),
            top_query_limit: 5,
            groups_file: PathBuf::from("groups.csv"),
            users_file: PathBuf::from("users.csv"),
            storage_interval: StorageInterval::Hour,
            combine: true,
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            format: String::from("%d/%m/%Y"),
        }
    }
}

impl IntervalConfig {
    /// Resolve the configured bounds. Without any bound the interval
    /// covers the previous, current and next month relative to `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<ReportingInterval> {
        let from = non_blank(&self.from);
        let to = non_blank(&self.to);
        match (from, to) {
            (None, None) => ReportingInterval::new(today, today),
            (Some(from), Some(to)) => {
                ReportingInterval::new(self.parse(from)?, self.parse(to)?)
            }
            (None, Some(_)) => Err(Error::MissingIntervalBound("from")),
            (Some(_), None) => Err(Error::MissingIntervalBound("to")),
        }
    }

    fn parse(&self, s: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(s, &self.format)
            .map_err(|e| Error::InvalidDate(s.to_string(), self.format.clone(), e))
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ReportingInterval {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        let first = first_of_month(from)
            .checked_sub_months(Months::new(1))
            .ok_or(Error::DateOutOfRange(from))?;
        let last = first_of_month(to)
            .checked_add_months(Months::new(2))
            .ok_or(Error::DateOutOfRange(to))?
            - TimeDelta::days(1);

        let from = first.and_time(NaiveTime::MIN);
        let to = last.and_time(NaiveTime::MIN) + TimeDelta::hours(23);

        let months = (last.year() * 12 + last.month() as i32)
            - (first.year() * 12 + first.month() as i32);
        if months < 2 {
            return Err(Error::IntervalTooShort(from, to));
        }

        Ok(Self { from, to })
    }

    pub const fn from(&self) -> NaiveDateTime {
        self.from
    }

    pub const fn to(&self) -> NaiveDateTime {
        self.to
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - TimeDelta::days(date.day0() as i64)
}

impl StorageInterval {
    pub const fn seconds(self) -> i64 {
        match self {
            StorageInterval::Hour => 3600,
            StorageInterval::Day => 86400,
        }
    }
}

impl Display for StorageInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageInterval::Hour => write!(f, "hour"),
            StorageInterval::Day => write!(f, "day"),
        }
    }
}

impl FromStr for StorageInterval {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(StorageInterval::Hour),
            "day" => Ok(StorageInterval::Day),
            _ => Err(Error::InvalidStorageInterval(s.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    use super::{IntervalConfig, JobConfig, ReportingInterval, StorageInterval};
    use crate::Error;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn datetime(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn interval_is_padded_to_whole_months() {
        let interval = ReportingInterval::new(date(2023, 3, 15), date(2023, 5, 10)).unwrap();
        assert_eq!(interval.from(), datetime(2023, 2, 1, 0));
        assert_eq!(interval.to(), datetime(2023, 6, 30, 23));
    }

    #[test]
    fn interval_padding_crosses_years() {
        let interval = ReportingInterval::new(date(2023, 1, 20), date(2023, 12, 5)).unwrap();
        assert_eq!(interval.from(), datetime(2022, 12, 1, 0));
        assert_eq!(interval.to(), datetime(2024, 1, 31, 23));
    }

    #[test]
    fn default_interval_surrounds_today() {
        let interval = IntervalConfig::default().resolve(date(2024, 2, 10)).unwrap();
        assert_eq!(interval.from(), datetime(2024, 1, 1, 0));
        assert_eq!(interval.to(), datetime(2024, 3, 31, 23));
    }

    #[test]
    fn configured_interval_uses_format() {
        let config = IntervalConfig {
            from: Some(String::from("01/04/2023")),
            to: Some(String::from("30/04/2023")),
            ..IntervalConfig::default()
        };
        let interval = config.resolve(date(2020, 1, 1)).unwrap();
        assert_eq!(interval.from(), datetime(2023, 3, 1, 0));
        assert_eq!(interval.to(), datetime(2023, 5, 31, 23));
    }

    #[test]
    fn reversed_interval_is_rejected() {
        assert!(matches!(
            ReportingInterval::new(date(2023, 5, 1), date(2023, 2, 1)),
            Err(Error::IntervalTooShort(_, _))
        ));
        let config = IntervalConfig {
            from: Some(String::from("2023-05-01")),
            to: Some(String::from("01/06/2023")),
            ..IntervalConfig::default()
        };
        assert!(matches!(
            config.resolve(date(2020, 1, 1)),
            Err(Error::InvalidDate(..))
        ));
        let config = IntervalConfig {
            to: Some(String::from("01/06/2023")),
            ..IntervalConfig::default()
        };
        assert!(matches!(
            config.resolve(date(2020, 1, 1)),
            Err(Error::MissingIntervalBound("from"))
        ));
    }

    #[test]
    fn deserialize_job_config() {
        let config = serde_json::from_value::<JobConfig>(json!({
            "column_family": "m",
            "partitions": 3,
            "storage_interval": "day",
            "interval": { "from": "01/01/2023" }
        }))
        .unwrap();
        assert_eq!(config.column_family, "m");
        assert_eq!(config.partitions, 3);
        assert_eq!(config.storage_interval, StorageInterval::Day);
        assert_eq!(config.interval.format, "%d/%m/%Y");
        assert_eq!(config.top_query_limit, 5);
        assert!(config.combine);
    }
}
