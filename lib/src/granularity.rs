/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDateTime, TimeDelta, TimeZone, Timelike};
use chrono_tz::Tz;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{
    config::ReportingInterval,
    error::{Error, Result},
};

/// Calendar level at which readings are rolled up. The discriminant is
/// the one-byte tag stored in output keys.
#[derive(
    SerializeDisplay, DeserializeFromStr, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug,
)]
#[repr(u8)]
pub enum Granularity {
    Hour = 1,
    Day = 2,
    Week = 3,
    Month = 4,
    Year = 5,
}

impl Granularity {
    pub const ALL: [Granularity; 5] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Year,
    ];

    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Bucket of a UTC instant (milliseconds since the epoch), computed
    /// on the wall clock of `tz`. Returns `None` for instants chrono
    /// cannot represent.
    pub fn bucket(self, timestamp_millis: i64, tz: Tz) -> Option<i64> {
        let local = DateTime::from_timestamp_millis(timestamp_millis)?.with_timezone(&tz);
        Some(self.bucket_local(local.naive_local()))
    }

    /// Bucket of a wall-clock date and time. Buckets sort in calendar
    /// order and all instants of one period share the same value.
    pub fn bucket_local(self, t: NaiveDateTime) -> i64 {
        match self {
            Granularity::Hour => day_value(t.date()) + t.hour() as i64,
            Granularity::Day => day_value(t.date()),
            Granularity::Week => {
                let monday =
                    t.date() - TimeDelta::days(t.date().weekday().num_days_from_monday() as i64);
                day_value(monday)
            }
            Granularity::Month => t.year() as i64 * 1_000_000 + t.month() as i64 * 10_000 + 100,
            Granularity::Year => t.year() as i64 * 1_000_000 + 10_100,
        }
    }

    /// Whether `bucket` lies inside the (already padded) reporting
    /// interval, with both interval bounds read as wall-clock times in
    /// `tz` and bucketed at this granularity.
    pub fn is_within_reporting_window(
        self,
        bucket: i64,
        tz: Tz,
        interval: &ReportingInterval,
    ) -> bool {
        let (from, to) = self.window_bounds(tz, interval);
        from <= bucket && bucket <= to
    }

    /// Inclusive bucket bounds of the reporting interval in `tz`.
    pub fn window_bounds(self, tz: Tz, interval: &ReportingInterval) -> (i64, i64) {
        (
            self.bucket_local(resolve_local(tz, interval.from())),
            self.bucket_local(resolve_local(tz, interval.to())),
        )
    }
}

fn day_value(date: chrono::NaiveDate) -> i64 {
    date.year() as i64 * 1_000_000 + date.month() as i64 * 10_000 + date.day() as i64 * 100
}

/// Wall-clock time as it actually occurs in `tz`. Times inside a DST gap
/// are moved forward past the gap.
fn resolve_local(tz: Tz, t: NaiveDateTime) -> NaiveDateTime {
    tz.from_local_datetime(&t)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(t + TimeDelta::hours(1))).earliest())
        .map_or(t, |t| t.naive_local())
}

impl TryFrom<u8> for Granularity {
    type Error = Error;
    fn try_from(tag: u8) -> Result<Self> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.tag() == tag)
            .ok_or_else(|| Error::UnsupportedGranularity(tag.to_string()))
    }
}

impl Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Hour => write!(f, "hour"),
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedGranularity(s.to_string()))
    }
}
