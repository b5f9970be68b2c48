/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::Display,
};

use crate::{
    error::{Error, Result},
    key::SerialHash,
    output::CountWidth,
    row::Reading,
};

/// Partial aggregate that can be merged with another partial aggregate
/// of the same identity. Merging is associative and commutative, but not
/// idempotent: every contribution must be merged exactly once.
pub trait Merge {
    fn merge(&mut self, other: &Self) -> Result<()>;
}

pub trait MergeAll: Iterator {
    type Output;
    fn merge_all(self) -> Result<Option<Self::Output>>;
}

impl<'a, T, Acc> MergeAll for T
where
    T: Iterator<Item = &'a Acc>,
    Acc: Merge + Clone + 'a,
{
    type Output = Acc;

    fn merge_all(mut self) -> Result<Option<Acc>> {
        let Some(first) = self.next() else {
            return Ok(None);
        };
        self.try_fold(first.clone(), |mut sum, acc| {
            sum.merge(acc)?;
            Ok(sum)
        })
        .map(Some)
    }
}

/// Per-meter value emitted for an output key and ranked by difference.
pub trait MeterValue: Merge + Clone {
    /// Width of the `cnt` column written for rankings of this value.
    const COUNT_WIDTH: CountWidth;

    fn from_reading(bucket: i64, serial: &str, reading: &Reading) -> Self;
    fn serial(&self) -> &str;
    fn serial_hash(&self) -> &SerialHash;
    fn difference(&self) -> f32;
}

/// Contribution of one meter to one output key.
#[derive(PartialEq, Clone, Debug)]
pub struct Accumulator {
    pub bucket: i64,
    pub serial: String,
    pub serial_hash: SerialHash,
    pub volume: f32,
    pub difference: f32,
    pub min: f32,
    pub max: f32,
    pub count: i64,
}

/// Consumption of one meter within one output key, as fed to
/// forecasting: only the difference and the number of readings.
#[derive(PartialEq, Clone, Debug)]
pub struct ForecastAccumulator {
    pub bucket: i64,
    pub serial: String,
    pub serial_hash: SerialHash,
    pub difference: f32,
    pub count: i64,
}

/// What two accumulators must share to be merged.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Identity {
    pub bucket: i64,
    pub serial: String,
}

impl Accumulator {
    /// Accumulator for a single reading.
    pub fn new(
        bucket: i64,
        serial: String,
        serial_hash: SerialHash,
        volume: f32,
        difference: f32,
    ) -> Self {
        Self {
            bucket,
            serial,
            serial_hash,
            volume,
            difference,
            min: volume - difference,
            max: volume,
            count: 1,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            bucket: self.bucket,
            serial: self.serial.clone(),
        }
    }

    /// Fixed layout: bucket (i64), serial (u16 length + UTF-8), serial
    /// hash (16 bytes), volume, min, max, difference (f32), count (i64).
    /// All integers and floats are big-endian.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + 2 + self.serial.len() + 16 + 16 + 8);
        buf.extend_from_slice(&self.bucket.to_be_bytes());
        put_serial(&mut buf, &self.serial)?;
        buf.extend_from_slice(&self.serial_hash);
        buf.extend_from_slice(&self.volume.to_be_bytes());
        buf.extend_from_slice(&self.min.to_be_bytes());
        buf.extend_from_slice(&self.max.to_be_bytes());
        buf.extend_from_slice(&self.difference.to_be_bytes());
        buf.extend_from_slice(&self.count.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader(bytes);
        let bucket = i64::from_be_bytes(r.take()?);
        let serial = r.take_serial()?;
        let serial_hash = r.take()?;
        let volume = f32::from_be_bytes(r.take()?);
        let min = f32::from_be_bytes(r.take()?);
        let max = f32::from_be_bytes(r.take()?);
        let difference = f32::from_be_bytes(r.take()?);
        let count = i64::from_be_bytes(r.take()?);
        r.finish()?;
        Ok(Self {
            bucket,
            serial,
            serial_hash,
            volume,
            difference,
            min,
            max,
            count,
        })
    }
}

impl ForecastAccumulator {
    pub fn new(bucket: i64, serial: String, serial_hash: SerialHash, difference: f32) -> Self {
        Self {
            bucket,
            serial,
            serial_hash,
            difference,
            count: 1,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            bucket: self.bucket,
            serial: self.serial.clone(),
        }
    }

    /// Fixed layout: bucket (i64), serial (u16 length + UTF-8), serial
    /// hash (16 bytes), difference (f32), count (i64), all big-endian.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + 2 + self.serial.len() + 16 + 4 + 8);
        buf.extend_from_slice(&self.bucket.to_be_bytes());
        put_serial(&mut buf, &self.serial)?;
        buf.extend_from_slice(&self.serial_hash);
        buf.extend_from_slice(&self.difference.to_be_bytes());
        buf.extend_from_slice(&self.count.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader(bytes);
        let bucket = i64::from_be_bytes(r.take()?);
        let serial = r.take_serial()?;
        let serial_hash = r.take()?;
        let difference = f32::from_be_bytes(r.take()?);
        let count = i64::from_be_bytes(r.take()?);
        r.finish()?;
        Ok(Self {
            bucket,
            serial,
            serial_hash,
            difference,
            count,
        })
    }
}

impl Merge for Accumulator {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.bucket != other.bucket || self.serial != other.serial {
            return Err(Error::IdentityMismatch(self.identity(), other.identity()));
        }
        self.volume = self.volume.max(other.volume);
        self.difference += other.difference;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count += other.count;
        Ok(())
    }
}

impl Merge for ForecastAccumulator {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.bucket != other.bucket || self.serial != other.serial {
            return Err(Error::IdentityMismatch(self.identity(), other.identity()));
        }
        self.difference += other.difference;
        self.count += other.count;
        Ok(())
    }
}

impl MeterValue for Accumulator {
    const COUNT_WIDTH: CountWidth = CountWidth::I64;

    fn from_reading(bucket: i64, serial: &str, reading: &Reading) -> Self {
        Self::new(
            bucket,
            serial.to_string(),
            reading.serial_hash,
            reading.volume,
            reading.difference,
        )
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn serial_hash(&self) -> &SerialHash {
        &self.serial_hash
    }

    fn difference(&self) -> f32 {
        self.difference
    }
}

impl MeterValue for ForecastAccumulator {
    const COUNT_WIDTH: CountWidth = CountWidth::I32;

    fn from_reading(bucket: i64, serial: &str, reading: &Reading) -> Self {
        Self::new(
            bucket,
            serial.to_string(),
            reading.serial_hash,
            reading.difference,
        )
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn serial_hash(&self) -> &SerialHash {
        &self.serial_hash
    }

    fn difference(&self) -> f32 {
        self.difference
    }
}

/// Local pre-aggregation of the values of one output key: values of the
/// same meter are merged, in order of first appearance.
pub fn combine<V, I>(values: I) -> Result<Vec<V>>
where
    V: MeterValue,
    I: IntoIterator<Item = V>,
{
    let mut index: HashMap<SerialHash, usize> = HashMap::new();
    let mut combined: Vec<V> = Vec::new();
    for value in values {
        match index.entry(*value.serial_hash()) {
            Entry::Occupied(ent) => combined[*ent.get()].merge(&value)?,
            Entry::Vacant(ent) => {
                ent.insert(combined.len());
                combined.push(value);
            }
        }
    }
    Ok(combined)
}

fn put_serial(buf: &mut Vec<u8>, serial: &str) -> Result<()> {
    let len = u16::try_from(serial.len()).map_err(|_| Error::SerialTooLong(serial.len()))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(serial.as_bytes());
    Ok(())
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.0.len() < n {
            return Err(Error::InvalidEncoding("truncated"));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0; N];
        buf.copy_from_slice(self.take_slice(N)?);
        Ok(buf)
    }

    fn take_serial(&mut self) -> Result<String> {
        let len = u16::from_be_bytes(self.take()?) as usize;
        std::str::from_utf8(self.take_slice(len)?)
            .map(str::to_string)
            .map_err(|_| Error::InvalidEncoding("serial is not valid UTF-8"))
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidEncoding("trailing bytes"))
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} , {}]", self.bucket, self.serial)
    }
}
