/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::{collections::BTreeMap, fmt::Display, ops::AddAssign, sync::Arc};

use swm_aggregation::{OutputRow, ScanRange};

use crate::{
    error::{Error, Result},
    job::{Job, Shuffle},
    table::Table,
};

/// Job counters. Reported only; they never affect the output.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct Counters {
    pub input_rows: u64,
    pub data_points: u64,
    pub map_output_values: u64,
    pub combine_input_values: u64,
    pub combine_output_values: u64,
    pub reduce_keys: u64,
    pub reduce_values: u64,
    pub output_rows: u64,
}

/// Output of one map worker: encoded values per key.
type Partial<K> = BTreeMap<K, Vec<Vec<u8>>>;

pub struct Runner<J: Job> {
    job: Arc<J>,
    combine: bool,
}

impl<J: Job> Runner<J> {
    pub fn new(job: J, combine: bool) -> Self {
        Self {
            job: Arc::new(job),
            combine,
        }
    }

    /// Map every scan range on its own blocking worker, then reduce all
    /// keys in order.
    pub async fn run(&self, input: Arc<Table>) -> Result<(Vec<OutputRow>, Counters)> {
        let ctx = Arc::new(self.job.configure()?);
        let workers = self
            .job
            .scan_plan()
            .into_iter()
            .map(|range| {
                let job = self.job.clone();
                let ctx = ctx.clone();
                let input = input.clone();
                let combine = self.combine;
                tokio::task::spawn_blocking(move || {
                    map_range(job.as_ref(), &ctx, &input, &range, combine)
                })
            })
            .collect::<Vec<_>>();

        let mut counters = Counters::default();
        let mut shuffled: Partial<J::Key> = BTreeMap::new();
        for worker in workers {
            let (partial, worker_counters) = worker.await.map_err(Error::JoinWorker)??;
            counters += worker_counters;
            for (key, values) in partial {
                shuffled.entry(key).or_default().extend(values);
            }
        }

        let mut rows = Vec::new();
        for (key, encoded) in shuffled {
            counters.reduce_keys += 1;
            counters.reduce_values += encoded.len() as u64;
            let values = encoded
                .iter()
                .map(|bytes| J::Value::decode(bytes))
                .collect::<Result<Vec<_>>>()?;
            log::trace!("reducing {} values for {key}", values.len());
            rows.push(self.job.reduce(&ctx, key, values)?);
            counters.output_rows += 1;
        }

        Ok((rows, counters))
    }
}

fn map_range<J: Job>(
    job: &J,
    ctx: &J::Context,
    input: &Table,
    range: &ScanRange,
    combine: bool,
) -> Result<(Partial<J::Key>, Counters)> {
    log::debug!("scanning partition {}", range.partition);
    let mut counters = Counters::default();
    let mut output: BTreeMap<J::Key, Vec<J::Value>> = BTreeMap::new();

    for (key, cells) in input.scan(range, job.column_family()) {
        counters.input_rows += 1;
        let points = job.map(ctx, key, cells, |key, value| {
            output.entry(key).or_default().push(value)
        })?;
        counters.data_points += points as u64;
    }
    counters.map_output_values = output.values().map(|v| v.len() as u64).sum();

    if combine {
        for (key, values) in output.iter_mut() {
            counters.combine_input_values += values.len() as u64;
            *values = job.combine(ctx, key, std::mem::take(values))?;
            counters.combine_output_values += values.len() as u64;
        }
    }

    log::debug!(
        "partition {}: {} rows, {} keys",
        range.partition,
        counters.input_rows,
        output.len()
    );

    let partial = output
        .into_iter()
        .map(|(key, values)| -> Result<_> {
            let encoded = values
                .iter()
                .map(Shuffle::encode)
                .collect::<Result<Vec<_>>>()?;
            Ok((key, encoded))
        })
        .collect::<Result<Partial<J::Key>>>()?;
    Ok((partial, counters))
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.input_rows += rhs.input_rows;
        self.data_points += rhs.data_points;
        self.map_output_values += rhs.map_output_values;
        self.combine_input_values += rhs.combine_input_values;
        self.combine_output_values += rhs.combine_output_values;
        self.reduce_keys += rhs.reduce_keys;
        self.reduce_values += rhs.reduce_values;
        self.output_rows += rhs.output_rows;
    }
}

impl Display for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "input rows = {}, data points = {}, map output = {}, \
             combine input = {}, combine output = {}, reduce keys = {}, \
             reduce values = {}, output rows = {}",
            self.input_rows,
            self.data_points,
            self.map_output_values,
            self.combine_input_values,
            self.combine_output_values,
            self.reduce_keys,
            self.reduce_values,
            self.output_rows
        )
    }
}
