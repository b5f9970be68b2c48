/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::fmt::Display;

use md5::{Digest, Md5};
use serde::Serialize;

use crate::{
    config::{ReportingInterval, StorageInterval},
    error::{Error, Result},
    granularity::Granularity,
};

pub type SerialHash = [u8; 16];

/// Inverted timestamps count down from this value, so that the most
/// recent rows sort first.
pub const INVERSION_BASE: i64 = i64::MAX / 1000;

pub fn md5_hash(s: &str) -> [u8; 16] {
    Md5::digest(s.as_bytes()).into()
}

pub const fn invert_seconds(epoch_seconds: i64) -> i64 {
    INVERSION_BASE - epoch_seconds
}

/// Row key range of one input partition. A missing `stop` means the scan
/// runs to the end of the table.
#[derive(Serialize, PartialEq, Eq, Clone, Debug)]
pub struct ScanRange {
    pub partition: u16,
    pub start: Vec<u8>,
    pub stop: Option<Vec<u8>>,
}

impl ScanRange {
    pub fn new(partition: u16, interval: &ReportingInterval, storage: StorageInterval) -> Self {
        let start = scan_key(partition, interval.to().and_utc().timestamp(), storage);
        let end = scan_key(partition, interval.from().and_utc().timestamp(), storage);
        Self {
            partition,
            start,
            stop: next_key_after_prefix(&end),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.stop.as_ref().map_or(true, |stop| key < stop)
    }
}

/// One scan range per partition, in partition order.
pub fn scan_plan(
    partitions: u16,
    interval: &ReportingInterval,
    storage: StorageInterval,
) -> Vec<ScanRange> {
    (0..partitions)
        .map(|p| ScanRange::new(p, interval, storage))
        .collect()
}

fn scan_key(partition: u16, epoch_seconds: i64, storage: StorageInterval) -> Vec<u8> {
    let inverted = invert_seconds(epoch_seconds);
    let aligned = inverted - inverted.rem_euclid(storage.seconds());
    let mut key = Vec::with_capacity(10);
    key.extend_from_slice(&partition.to_be_bytes());
    key.extend_from_slice(&aligned.to_be_bytes());
    key
}

/// Smallest key greater than every key starting with `prefix`: trailing
/// 0xFF bytes are dropped and the last remaining byte is incremented.
/// Returns `None` (no upper bound) when nothing but 0xFF remains.
pub fn next_key_after_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let len = prefix.iter().rposition(|b| *b != 0xFF)? + 1;
    let mut next = prefix[..len].to_vec();
    next[len - 1] += 1;
    Some(next)
}

/// Aggregate row key: MD5 of the group key, granularity tag and the
/// big-endian bucket. Sorts by group, then granularity, then bucket.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct OutputKey([u8; OutputKey::LEN]);

impl OutputKey {
    pub const LEN: usize = 25;

    pub fn new(group_key: &str, granularity: Granularity, bucket: i64) -> Self {
        Self::from_parts(&md5_hash(group_key), granularity, bucket)
    }

    pub fn from_parts(group_hash: &[u8; 16], granularity: Granularity, bucket: i64) -> Self {
        let mut key = [0; Self::LEN];
        key[..16].copy_from_slice(group_hash);
        key[16] = granularity.tag();
        key[17..].copy_from_slice(&bucket.to_be_bytes());
        Self(key)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let key: [u8; Self::LEN] = bytes.try_into().map_err(|_| Error::InvalidRowKey {
            expected: Self::LEN,
            found: bytes.len(),
        })?;
        Granularity::try_from(key[16])?;
        Ok(Self(key))
    }

    pub fn group_hash(&self) -> &[u8] {
        &self.0[..16]
    }

    pub fn granularity(&self) -> Result<Granularity> {
        Granularity::try_from(self.0[16])
    }

    pub fn bucket(&self) -> i64 {
        let mut bucket = [0; 8];
        bucket.copy_from_slice(&self.0[17..]);
        i64::from_be_bytes(bucket)
    }

    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl Display for OutputKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.group_hash()
            .iter()
            .try_for_each(|b| write!(f, "{b:02x}"))?;
        write!(f, "/{}/{}", self.0[16], self.bucket())
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::{
        invert_seconds, md5_hash, next_key_after_prefix, scan_plan, OutputKey, ScanRange,
        INVERSION_BASE,
    };
    use crate::{
        config::{ReportingInterval, StorageInterval},
        granularity::Granularity,
    };

    #[test]
    fn next_key_increments_last_byte() {
        assert_eq!(next_key_after_prefix(&[0x00, 0x01]), Some(vec![0x00, 0x02]));
        assert_eq!(next_key_after_prefix(&[0x12, 0xFE]), Some(vec![0x12, 0xFF]));
    }

    #[test]
    fn next_key_strips_trailing_ff() {
        assert_eq!(next_key_after_prefix(&[0x00, 0xFF, 0xFF]), Some(vec![0x01]));
        assert_eq!(next_key_after_prefix(&[0x01, 0x7F, 0xFF]), Some(vec![0x01, 0x80]));
    }

    #[test]
    fn next_key_of_all_ff_is_unbounded() {
        assert_eq!(next_key_after_prefix(&[0xFF, 0xFF]), None);
        assert_eq!(next_key_after_prefix(&[]), None);
    }

    proptest! {
        #[test]
        fn next_key_is_least_upper_bound(
            prefix in prop::collection::vec(any::<u8>(), 1..8),
            suffix in prop::collection::vec(any::<u8>(), 0..8),
        ) {
            prop_assume!(prefix.iter().any(|b| *b != 0xFF));
            let next = next_key_after_prefix(&prefix).unwrap();
            let mut extended = prefix.clone();
            extended.extend_from_slice(&suffix);
            prop_assert!(next > extended);
            // The key just below `next` still carries the prefix.
            prop_assert!(next.len() <= prefix.len());
            prop_assert_eq!(&next[..next.len() - 1], &prefix[..next.len() - 1]);
            prop_assert_eq!(next[next.len() - 1], prefix[next.len() - 1] + 1);
            prop_assert!(prefix[next.len()..].iter().all(|b| *b == 0xFF));
        }
    }

    #[test]
    fn inverted_time_sorts_recent_first() {
        assert!(invert_seconds(2_000) < invert_seconds(1_000));
        assert_eq!(invert_seconds(0), INVERSION_BASE);
    }

    #[test]
    fn scan_range_bounds() {
        let interval = ReportingInterval::new(
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
        )
        .unwrap();
        let range = ScanRange::new(3, &interval, StorageInterval::Hour);

        let to = interval.to().and_utc().timestamp();
        let from = interval.from().and_utc().timestamp();
        let start = invert_seconds(to) - invert_seconds(to) % 3600;
        let end = invert_seconds(from) - invert_seconds(from) % 3600;

        assert_eq!(&range.start[..2], &[0, 3]);
        assert_eq!(&range.start[2..], &start.to_be_bytes());

        let mut end_key = vec![0, 3];
        end_key.extend_from_slice(&end.to_be_bytes());
        assert_eq!(range.stop, next_key_after_prefix(&end_key));

        // Rows at the end bucket itself, with any serial hash, are inside.
        let mut row = end_key.clone();
        row.extend_from_slice(&[0xFF; 16]);
        assert!(range.contains(&row));
        let mut row = vec![0, 3];
        row.extend_from_slice(&(start - 3600).to_be_bytes());
        assert!(!range.contains(&row));
        assert!(!range.contains(&[0, 4]));
    }

    #[test]
    fn scan_plan_covers_partitions() {
        let interval = ReportingInterval::new(
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
        )
        .unwrap();
        let plan = scan_plan(4, &interval, StorageInterval::Day);
        assert_eq!(plan.len(), 4);
        assert!(plan
            .iter()
            .enumerate()
            .all(|(i, range)| range.partition as usize == i && range.start[..2] == (i as u16).to_be_bytes()));
    }

    #[test]
    fn output_key_layout() {
        let key = OutputKey::new("group-area", Granularity::Day, 2023060100);
        assert_eq!(key.group_hash(), &md5_hash("group-area"));
        assert_eq!(key.as_bytes()[16], 2);
        assert_eq!(&key.as_bytes()[17..], &2023060100i64.to_be_bytes());
        assert_eq!(key.granularity().unwrap(), Granularity::Day);
        assert_eq!(key.bucket(), 2023060100);
        assert_eq!(OutputKey::decode(key.as_bytes()).unwrap(), key);
        assert!(OutputKey::decode(&key.as_bytes()[..24]).is_err());
    }

    #[test]
    fn output_keys_sort_by_group_granularity_bucket() {
        let hash = md5_hash("g");
        let a = OutputKey::from_parts(&hash, Granularity::Hour, 2023060123);
        let b = OutputKey::from_parts(&hash, Granularity::Day, 2023010100);
        let c = OutputKey::from_parts(&hash, Granularity::Day, 2023060100);
        assert!(a < b && b < c);
        assert!(a.as_bytes() < b.as_bytes() && b.as_bytes() < c.as_bytes());
    }

    #[test]
    fn md5_of_known_value() {
        assert_eq!(
            md5_hash("abc"),
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1,
                0x7f, 0x72
            ]
        );
    }
}
