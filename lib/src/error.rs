/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::path::PathBuf;

use crate::accum::Identity;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot merge accumulators with different identities: {0} / {1}")]
    IdentityMismatch(Identity, Identity),
    #[error("granularity {0} is not supported")]
    UnsupportedGranularity(String),
    #[error("group type {0} is not supported")]
    UnsupportedGroupType(String),
    #[error("directory file not found: {0}")]
    MissingDirectoryFile(PathBuf),
    #[error("failed to read directory file: {0}: {1}")]
    ReadDirectoryFile(PathBuf, std::io::Error),
    #[error("malformed record at line {line}: expected {expected} fields, found {found}")]
    MalformedRecord {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown timezone at line {0}: {1}")]
    UnknownTimezone(usize, String),
    #[error("cannot find user for meter {0}")]
    UnknownUserForRankedSerial(String),
    #[error("invalid row key: expected at least {expected} bytes, found {found}")]
    InvalidRowKey { expected: usize, found: usize },
    #[error("invalid column qualifier: {0} bytes")]
    InvalidColumn(usize),
    #[error("invalid value for column {0:?}: {1} bytes")]
    InvalidCellValue(String, usize),
    #[error("serial too long to encode: {0} bytes")]
    SerialTooLong(usize),
    #[error("invalid accumulator encoding: {0}")]
    InvalidEncoding(&'static str),
    #[error("invalid date {0:?} for format {1:?}: {2}")]
    InvalidDate(String, String, chrono::ParseError),
    #[error("reporting interval bound missing: {0}")]
    MissingIntervalBound(&'static str),
    #[error("date out of range: {0}")]
    DateOutOfRange(chrono::NaiveDate),
    #[error("reporting interval must span at least 3 months after padding: {0} - {1}")]
    IntervalTooShort(chrono::NaiveDateTime, chrono::NaiveDateTime),
    #[error("invalid storage interval: {0}")]
    InvalidStorageInterval(String),
}
