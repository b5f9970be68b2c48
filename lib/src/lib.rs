/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

mod accum;
mod config;
mod directory;
mod error;
mod fanout;
mod granularity;
mod key;
mod output;
mod ranking;
mod row;

pub use accum::{
    combine, Accumulator, ForecastAccumulator, Identity, Merge, MergeAll, MeterValue,
};
pub use config::{IntervalConfig, JobConfig, ReportingInterval, StorageInterval};
pub use directory::{Group, GroupDirectory, GroupType, User, UserDirectory};
pub use error::{Error, Result};
pub use fanout::Fanout;
pub use granularity::Granularity;
pub use key::{
    invert_seconds, md5_hash, next_key_after_prefix, scan_plan, OutputKey, ScanRange, SerialHash,
    INVERSION_BASE,
};
pub use output::{
    format_decimal, format_entries, CountWidth, OutputRow, AVG_COLUMN, BOTTOM_COLUMN, COUNT_COLUMN,
    MAX_COLUMN, MIN_COLUMN, SUM_COLUMN, TOP_COLUMN,
};
pub use ranking::{RankedEntry, RankedResult, Ranking, RankingAggregator, DEFAULT_LIMIT};
pub use row::{decode_row, ColumnQualifier, Reading, RowKey, DIFFERENCE_COLUMN, VOLUME_COLUMN};
