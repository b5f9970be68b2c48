/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use crate::{
    accum::MeterValue,
    config::ReportingInterval,
    directory::GroupDirectory,
    error::Result,
    granularity::Granularity,
    key::{md5_hash, OutputKey},
    row::{decode_row, Reading},
};

/// Spreads readings over the groups containing their meter and over all
/// granularities, dropping buckets outside the reporting interval.
#[derive(Debug)]
pub struct Fanout {
    groups: GroupDirectory,
    windows: Vec<GroupWindow>,
}

/// Per group: the hash used in output keys and the accepted bucket
/// range per granularity, both in `Granularity::ALL` order.
#[derive(Debug)]
struct GroupWindow {
    hash: [u8; 16],
    bounds: [(i64, i64); 5],
}

impl Fanout {
    pub fn new(groups: GroupDirectory, interval: &ReportingInterval) -> Self {
        let windows = groups
            .groups()
            .map(|group| GroupWindow {
                hash: md5_hash(group.key()),
                bounds: Granularity::ALL.map(|g| g.window_bounds(group.timezone(), interval)),
            })
            .collect();
        Self { groups, windows }
    }

    pub fn groups(&self) -> &GroupDirectory {
        &self.groups
    }

    /// Output pairs for one reading, lazily, group by group.
    pub fn emissions<V: MeterValue>(
        &self,
        reading: Reading,
    ) -> impl Iterator<Item = (OutputKey, V)> + '_ {
        self.groups
            .memberships(&reading.serial_hash)
            .flat_map(move |(index, group, member)| {
                let window = &self.windows[index];
                Granularity::ALL
                    .into_iter()
                    .zip(window.bounds)
                    .filter_map(move |(granularity, (from, to))| {
                        let bucket = granularity.bucket(reading.timestamp_millis, group.timezone())?;
                        if bucket < from || bucket > to {
                            return None;
                        }
                        let serial = group.serial(member)?;
                        Some((
                            OutputKey::from_parts(&window.hash, granularity, bucket),
                            V::from_reading(bucket, serial, &reading),
                        ))
                    })
            })
    }

    /// Decode an input row and pass every emission to `emit`. Returns
    /// the number of readings found in the row.
    pub fn map_row<'a, V, I, F>(&self, key: &[u8], columns: I, mut emit: F) -> Result<usize>
    where
        V: MeterValue,
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
        F: FnMut(OutputKey, V),
    {
        let readings = decode_row(key, columns)?;
        readings
            .iter()
            .flat_map(|reading| self.emissions::<V>(*reading))
            .for_each(|(key, value)| emit(key, value));
        Ok(readings.len())
    }
}
