/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use chrono::NaiveDate;
use swm_aggregation::{
    combine, scan_plan, Accumulator, Fanout, ForecastAccumulator, GroupDirectory, JobConfig,
    MeterValue, OutputKey, OutputRow, RankingAggregator, ReportingInterval, ScanRange,
    UserDirectory,
};

use crate::{
    error::{Error, Result},
    table::Cells,
};

/// A map/combine/reduce job, driven by the `Runner`.
pub trait Job: Send + Sync + 'static {
    /// Read-only state shared by all workers.
    type Context: Send + Sync + 'static;
    type Key: Ord + Display + Send + 'static;
    type Value: Shuffle + Send + 'static;

    fn scan_plan(&self) -> Vec<ScanRange>;
    fn column_family(&self) -> &str;
    fn configure(&self) -> Result<Self::Context>;

    /// Emit the key-value pairs for one input row. Returns the number of
    /// data points found in the row.
    fn map<F>(&self, ctx: &Self::Context, key: &[u8], cells: &Cells, emit: F) -> Result<usize>
    where
        F: FnMut(Self::Key, Self::Value);

    /// Shrink a key's values inside one worker. May run any number of
    /// times, or not at all.
    fn combine(
        &self,
        ctx: &Self::Context,
        key: &Self::Key,
        values: Vec<Self::Value>,
    ) -> Result<Vec<Self::Value>>;

    /// Called exactly once per key with all of its values.
    fn reduce(
        &self,
        ctx: &Self::Context,
        key: Self::Key,
        values: Vec<Self::Value>,
    ) -> Result<OutputRow>;
}

/// Byte encoding of values crossing worker boundaries.
pub trait Shuffle: Sized {
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl Shuffle for Accumulator {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(Accumulator::encode(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Accumulator::decode(bytes)?)
    }
}

impl Shuffle for ForecastAccumulator {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(ForecastAccumulator::encode(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(ForecastAccumulator::decode(bytes)?)
    }
}

/// The jobs selectable from the command line.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum JobName {
    MeterData,
    MeterForecasting,
}

impl Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MeterData => write!(f, "meter-data-pre-aggregation"),
            Self::MeterForecasting => write!(f, "meter-forecasting-data-pre-aggregation"),
        }
    }
}

impl FromStr for JobName {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        [Self::MeterData, Self::MeterForecasting]
            .into_iter()
            .find(|name| name.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownJob(s.to_string()))
    }
}

/// Rolls meter readings up into per-group rankings of `V`.
pub struct GroupAggregation<V> {
    config: JobConfig,
    interval: ReportingInterval,
    value: PhantomData<fn() -> V>,
}

/// Ranks readings with volume, min and max per serial.
pub type MeterDataAggregation = GroupAggregation<Accumulator>;
/// Ranks differences and counts only, for the forecasting models.
pub type MeterForecastingAggregation = GroupAggregation<ForecastAccumulator>;

pub struct MeterContext {
    fanout: Fanout,
    users: UserDirectory,
}

impl<V> GroupAggregation<V> {
    pub fn new(config: JobConfig, today: NaiveDate) -> Result<Self> {
        let interval = config.interval.resolve(today)?;
        log::info!(
            "aggregating {} into {}, from {} to {}",
            config.input_table,
            config.output_table,
            interval.from(),
            interval.to()
        );
        Ok(Self {
            config,
            interval,
            value: PhantomData,
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }
}

impl<V> Job for GroupAggregation<V>
where
    V: MeterValue + Shuffle + Send + Sync + 'static,
{
    type Context = MeterContext;
    type Key = OutputKey;
    type Value = V;

    fn scan_plan(&self) -> Vec<ScanRange> {
        scan_plan(
            self.config.partitions,
            &self.interval,
            self.config.storage_interval,
        )
    }

    fn column_family(&self) -> &str {
        &self.config.column_family
    }

    fn configure(&self) -> Result<MeterContext> {
        let groups = GroupDirectory::load(&self.config.groups_file)?;
        let users = UserDirectory::load(&self.config.users_file)?;
        log::info!("loaded {} groups and {} users", groups.len(), users.len());
        Ok(MeterContext {
            fanout: Fanout::new(groups, &self.interval),
            users,
        })
    }

    fn map<F>(&self, ctx: &MeterContext, key: &[u8], cells: &Cells, emit: F) -> Result<usize>
    where
        F: FnMut(OutputKey, V),
    {
        let columns = cells.iter().map(|(q, v)| (q.as_slice(), v.as_slice()));
        Ok(ctx.fanout.map_row(key, columns, emit)?)
    }

    fn combine(&self, _ctx: &MeterContext, _key: &OutputKey, values: Vec<V>) -> Result<Vec<V>> {
        Ok(combine(values)?)
    }

    fn reduce(&self, ctx: &MeterContext, key: OutputKey, values: Vec<V>) -> Result<OutputRow> {
        let mut ranking = RankingAggregator::new(key, self.config.top_query_limit);
        values.iter().try_for_each(|value| ranking.add(value))?;
        let result = ranking.finalize().resolve(&ctx.users)?;
        Ok(OutputRow::new(
            &result,
            &self.config.column_family,
            V::COUNT_WIDTH,
        ))
    }
}
