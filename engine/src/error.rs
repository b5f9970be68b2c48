/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Aggregation(#[from] swm_aggregation::Error),
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("failed to read file: {0}: {1}")]
    ReadFile(PathBuf, std::io::Error),
    #[error("failed to write file: {0}: {1}")]
    WriteFile(PathBuf, std::io::Error),
    #[error("failed to parse config: {0}: {1}")]
    ParseConfig(PathBuf, serde_yaml::Error),
    #[error("failed to decode table: {0}: {1}")]
    DecodeTable(PathBuf, ciborium::de::Error<std::io::Error>),
    #[error("failed to encode table: {0}: {1}")]
    EncodeTable(PathBuf, ciborium::ser::Error<std::io::Error>),
    #[error("failed to serialize scan plan: {0}")]
    SerializePlan(serde_json::Error),
    #[error("failed to join worker task: {0}")]
    JoinWorker(tokio::task::JoinError),
}
