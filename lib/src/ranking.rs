/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::collections::{hash_map::Entry, HashMap};

use ordered_float::OrderedFloat;
use tap::Tap;

use crate::{
    accum::MeterValue,
    directory::UserDirectory,
    error::{Error, Result},
    key::{OutputKey, SerialHash},
};

pub const DEFAULT_LIMIT: usize = 5;

/// Collects the per-meter values of one output key. Values of the same
/// meter are merged; `sum` counts every value added.
#[derive(Debug)]
pub struct RankingAggregator<V> {
    key: OutputKey,
    limit: usize,
    sum: f32,
    entries: Vec<V>,
    index: HashMap<SerialHash, usize>,
}

/// Values of one output key, sorted ascending by difference with ties in
/// insertion order.
#[derive(Debug)]
pub struct Ranking<V> {
    key: OutputKey,
    limit: usize,
    sum: f32,
    entries: Vec<V>,
}

#[derive(PartialEq, Clone, Debug)]
pub struct RankedEntry {
    pub account_key: String,
    pub display_name: String,
    pub serial: String,
    pub difference: f32,
}

#[derive(PartialEq, Clone, Debug)]
pub struct RankedResult {
    pub key: OutputKey,
    pub sum: f32,
    pub min: f32,
    pub max: f32,
    pub avg: f32,
    pub count: i64,
    pub top: Vec<RankedEntry>,
    pub bottom: Vec<RankedEntry>,
}

impl<V: MeterValue> RankingAggregator<V> {
    pub fn new(key: OutputKey, limit: usize) -> Self {
        Self {
            key,
            limit,
            sum: 0.0,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn add(&mut self, value: &V) -> Result<()> {
        match self.index.entry(*value.serial_hash()) {
            Entry::Occupied(ent) => self.entries[*ent.get()].merge(value)?,
            Entry::Vacant(ent) => {
                ent.insert(self.entries.len());
                self.entries.push(value.clone());
            }
        }
        self.sum += value.difference();
        Ok(())
    }

    pub fn key(&self) -> &OutputKey {
        &self.key
    }

    pub fn sum(&self) -> f32 {
        self.sum
    }

    pub fn count(&self) -> i64 {
        self.entries.len() as i64
    }

    pub fn finalize(self) -> Ranking<V> {
        Ranking {
            key: self.key,
            limit: self.limit,
            sum: self.sum,
            entries: self
                .entries
                .tap_mut(|entries| entries.sort_by_key(|v| OrderedFloat(v.difference()))),
        }
    }
}

impl<V: MeterValue> Ranking<V> {
    pub fn key(&self) -> &OutputKey {
        &self.key
    }

    pub fn sum(&self) -> f32 {
        self.sum
    }

    pub fn count(&self) -> i64 {
        self.entries.len() as i64
    }

    pub fn min(&self) -> Option<f32> {
        self.entries.first().map(V::difference)
    }

    pub fn max(&self) -> Option<f32> {
        self.entries.last().map(V::difference)
    }

    pub fn average(&self) -> f32 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.sum / self.entries.len() as f32
        }
    }

    /// The `k` largest values, in ascending order.
    pub fn top_k(&self, k: usize) -> &[V] {
        &self.entries[self.entries.len().saturating_sub(k)..]
    }

    /// The `k` smallest values, in ascending order.
    pub fn bottom_k(&self, k: usize) -> &[V] {
        &self.entries[..k.min(self.entries.len())]
    }

    pub fn top(&self) -> &[V] {
        self.top_k(self.limit)
    }

    pub fn bottom(&self) -> &[V] {
        self.bottom_k(self.limit)
    }

    pub fn entries(&self) -> &[V] {
        &self.entries
    }

    /// Attach user identities to the ranked meters. Every ranked meter
    /// must be known to the user directory.
    pub fn resolve(&self, users: &UserDirectory) -> Result<RankedResult> {
        let entries = |values: &[V]| {
            values
                .iter()
                .map(|value| {
                    let user = users.get(value.serial()).ok_or_else(|| {
                        Error::UnknownUserForRankedSerial(value.serial().to_string())
                    })?;
                    Ok(RankedEntry {
                        account_key: user.account_key.clone(),
                        display_name: user.display_name.clone(),
                        serial: value.serial().to_string(),
                        difference: value.difference(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        };
        Ok(RankedResult {
            key: self.key,
            sum: self.sum,
            min: self.min().unwrap_or(0.0),
            max: self.max().unwrap_or(0.0),
            avg: self.average(),
            count: self.count(),
            top: entries(self.top())?,
            bottom: entries(self.bottom())?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{RankingAggregator, DEFAULT_LIMIT};
    use crate::{
        accum::{Accumulator, ForecastAccumulator},
        directory::UserDirectory,
        granularity::Granularity,
        key::{md5_hash, OutputKey},
        Error,
    };

    const BUCKET: i64 = 2023060110;

    fn key() -> OutputKey {
        OutputKey::new("G", Granularity::Hour, BUCKET)
    }

    fn acc(serial: &str, difference: f32) -> Accumulator {
        Accumulator::new(BUCKET, serial.to_string(), md5_hash(serial), 100.0, difference)
    }

    fn serials(accs: &[Accumulator]) -> Vec<&str> {
        accs.iter().map(|acc| acc.serial.as_str()).collect()
    }

    #[test]
    fn two_meters_with_tied_totals() {
        let mut agg = RankingAggregator::new(key(), 1);
        agg.add(&acc("S1", 2.0)).unwrap();
        agg.add(&acc("S1", 3.0)).unwrap();
        agg.add(&acc("S2", 5.0)).unwrap();
        assert_eq!(agg.sum(), 10.0);

        let ranking = agg.finalize();
        assert_eq!(ranking.sum(), 10.0);
        assert_eq!(ranking.count(), 2);
        assert_eq!(ranking.average(), 5.0);
        assert_eq!(ranking.entries()[0].difference, 5.0);
        assert_eq!(ranking.entries()[0].count, 2);
        assert_eq!(serials(ranking.entries()), vec!["S1", "S2"]);
        assert_eq!(serials(ranking.top()), vec!["S2"]);
        assert_eq!(serials(ranking.bottom()), vec!["S1"]);
    }

    #[test]
    fn ranking_is_ascending_and_bounded() {
        let mut agg = RankingAggregator::new(key(), 2);
        for (serial, difference) in [("A", 4.0), ("B", 1.0), ("C", 9.0), ("D", 2.5)] {
            agg.add(&acc(serial, difference)).unwrap();
        }
        let ranking = agg.finalize();
        assert_eq!(ranking.min(), Some(1.0));
        assert_eq!(ranking.max(), Some(9.0));
        assert_eq!(serials(ranking.bottom()), vec!["B", "D"]);
        assert_eq!(serials(ranking.top()), vec!["A", "C"]);
        assert_eq!(ranking.top_k(0).len(), 0);
    }

    #[test]
    fn limit_beyond_meter_count_returns_all() {
        let mut agg = RankingAggregator::new(key(), DEFAULT_LIMIT);
        agg.add(&acc("A", 3.0)).unwrap();
        agg.add(&acc("B", 1.0)).unwrap();
        let ranking = agg.finalize();
        assert_eq!(serials(ranking.top()), vec!["B", "A"]);
        assert_eq!(serials(ranking.bottom()), vec!["B", "A"]);
    }

    #[test]
    fn empty_ranking() {
        let ranking = RankingAggregator::<Accumulator>::new(key(), 3).finalize();
        assert_eq!(ranking.count(), 0);
        assert_eq!(ranking.average(), 0.0);
        assert_eq!(ranking.min(), None);
        assert!(ranking.top().is_empty() && ranking.bottom().is_empty());
    }

    #[test]
    fn duplicate_submission_counts_in_sum_only() {
        let mut agg = RankingAggregator::new(key(), 3);
        let value = acc("A", 2.0);
        agg.add(&value).unwrap();
        agg.add(&value).unwrap();
        assert_eq!(agg.sum(), 4.0);
        assert_eq!(agg.count(), 1);
    }

    #[test]
    fn add_rejects_identity_mismatch() {
        let mut agg = RankingAggregator::new(key(), 3);
        agg.add(&acc("A", 2.0)).unwrap();
        let mut other = acc("A", 1.0);
        other.bucket += 100;
        assert!(matches!(
            agg.add(&other),
            Err(Error::IdentityMismatch(..))
        ));
    }

    #[test]
    fn resolve_users() {
        let users = UserDirectory::parse("A;acc-a;alice\nB;acc-b;bob\n".as_bytes()).unwrap();
        let mut agg = RankingAggregator::new(key(), 1);
        agg.add(&acc("A", 3.0)).unwrap();
        agg.add(&acc("B", 1.0)).unwrap();
        let result = agg.finalize().resolve(&users).unwrap();
        assert_eq!(result.count, 2);
        assert_eq!(result.avg, 2.0);
        assert_eq!(result.min, 1.0);
        assert_eq!(result.max, 3.0);
        assert_eq!(result.top[0].account_key, "acc-a");
        assert_eq!(result.bottom[0].display_name, "bob");

        let mut agg = RankingAggregator::new(key(), 1);
        agg.add(&acc("C", 3.0)).unwrap();
        assert!(matches!(
            agg.finalize().resolve(&users),
            Err(Error::UnknownUserForRankedSerial(s)) if s == "C"
        ));
    }

    #[test]
    fn rank_forecast_values() {
        let value = |serial: &str, difference: f32| {
            ForecastAccumulator::new(BUCKET, serial.to_string(), md5_hash(serial), difference)
        };
        let mut agg = RankingAggregator::new(key(), 1);
        agg.add(&value("S1", 2.0)).unwrap();
        agg.add(&value("S1", 3.0)).unwrap();
        agg.add(&value("S2", 5.0)).unwrap();
        let ranking = agg.finalize();
        assert_eq!(ranking.sum(), 10.0);
        assert_eq!(ranking.average(), 5.0);
        assert_eq!(ranking.entries()[0].count, 2);
        assert_eq!(ranking.bottom()[0].serial, "S1");
        assert_eq!(ranking.top()[0].serial, "S2");
    }
}
