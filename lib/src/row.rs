/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use crate::{
    error::{Error, Result},
    key::{SerialHash, INVERSION_BASE},
};

pub const DIFFERENCE_COLUMN: &[u8] = b"d";
pub const VOLUME_COLUMN: &[u8] = b"v";

/// A single meter reading decoded from an input row.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct Reading {
    pub timestamp_millis: i64,
    pub serial_hash: SerialHash,
    pub volume: f32,
    pub difference: f32,
}

/// Input row key: partition, inverted time bucket (seconds) and the MD5
/// of the meter serial.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct RowKey {
    pub partition: u16,
    pub time_bucket: i64,
    pub serial_hash: SerialHash,
}

/// Column qualifier: time offset in seconds relative to the row bucket,
/// followed by a length-prefixed field name.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct ColumnQualifier<'a> {
    pub offset: i32,
    pub name: &'a [u8],
}

impl RowKey {
    pub const LEN: usize = 26;

    pub fn decode(key: &[u8]) -> Result<Self> {
        if key.len() < Self::LEN {
            return Err(Error::InvalidRowKey {
                expected: Self::LEN,
                found: key.len(),
            });
        }
        let mut partition = [0; 2];
        let mut time_bucket = [0; 8];
        let mut serial_hash = [0; 16];
        partition.copy_from_slice(&key[0..2]);
        time_bucket.copy_from_slice(&key[2..10]);
        serial_hash.copy_from_slice(&key[10..26]);
        Ok(Self {
            partition: u16::from_be_bytes(partition),
            time_bucket: i64::from_be_bytes(time_bucket),
            serial_hash,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(Self::LEN);
        key.extend_from_slice(&self.partition.to_be_bytes());
        key.extend_from_slice(&self.time_bucket.to_be_bytes());
        key.extend_from_slice(&self.serial_hash);
        key
    }

    /// UTC timestamp in milliseconds of a column at `offset` seconds.
    pub fn timestamp_millis(&self, offset: i32) -> i64 {
        INVERSION_BASE
            .saturating_sub(self.time_bucket.saturating_add(offset as i64))
            .saturating_mul(1000)
    }
}

impl<'a> ColumnQualifier<'a> {
    pub fn decode(qualifier: &'a [u8]) -> Result<Self> {
        let invalid = || Error::InvalidColumn(qualifier.len());
        let offset = qualifier
            .get(0..4)
            .and_then(|b| b.try_into().ok())
            .map(i32::from_be_bytes)
            .ok_or_else(invalid)?;
        let len = *qualifier.get(4).ok_or_else(invalid)? as usize;
        let name = qualifier.get(5..5 + len).ok_or_else(invalid)?;
        Ok(Self { offset, name })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut qualifier = Vec::with_capacity(5 + self.name.len());
        qualifier.extend_from_slice(&self.offset.to_be_bytes());
        qualifier.push(self.name.len() as u8);
        qualifier.extend_from_slice(self.name);
        qualifier
    }
}

/// Decode the readings of one input row. Columns are expected in stored
/// (sorted) order, so all fields of one offset are adjacent. An offset
/// yields a reading only if it carries a difference; its volume, if
/// stored as a valid float, is taken from the volume column.
pub fn decode_row<'a, I>(key: &[u8], columns: I) -> Result<Vec<Reading>>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let key = RowKey::decode(key)?;
    let mut readings = Vec::new();
    let mut pending: Option<Pending> = None;

    for (qualifier, value) in columns {
        let qualifier = ColumnQualifier::decode(qualifier)?;
        let is_difference = qualifier.name == DIFFERENCE_COLUMN;
        if !is_difference && qualifier.name != VOLUME_COLUMN {
            continue;
        }

        let value = if is_difference {
            decode_float(qualifier.name, value)?
        } else {
            // Volume is optional; a malformed cell leaves it unset.
            match value.try_into() {
                Ok(bytes) => f32::from_be_bytes(bytes),
                Err(_) => continue,
            }
        };
        if pending.as_ref().map_or(true, |p| p.offset != qualifier.offset) {
            if let Some(p) = pending.replace(Pending::new(qualifier.offset)) {
                readings.extend(p.into_reading(&key));
            }
        }
        let current = pending.get_or_insert_with(|| Pending::new(qualifier.offset));
        if is_difference {
            current.difference = Some(value);
        } else {
            current.volume = Some(value);
        }
    }

    if let Some(p) = pending {
        readings.extend(p.into_reading(&key));
    }

    Ok(readings)
}

struct Pending {
    offset: i32,
    volume: Option<f32>,
    difference: Option<f32>,
}

impl Pending {
    fn new(offset: i32) -> Self {
        Self {
            offset,
            volume: None,
            difference: None,
        }
    }

    fn into_reading(self, key: &RowKey) -> Option<Reading> {
        Some(Reading {
            timestamp_millis: key.timestamp_millis(self.offset),
            serial_hash: key.serial_hash,
            volume: self.volume.unwrap_or(0.0),
            difference: self.difference?,
        })
    }
}

fn decode_float(name: &[u8], value: &[u8]) -> Result<f32> {
    value
        .try_into()
        .map(f32::from_be_bytes)
        .map_err(|_| Error::InvalidCellValue(String::from_utf8_lossy(name).into_owned(), value.len()))
}

#[cfg(test)]
mod test {
    use super::{decode_row, ColumnQualifier, Reading, RowKey};
    use crate::{
        key::{invert_seconds, md5_hash},
        Error,
    };

    fn column(offset: i32, name: &[u8], value: f32) -> (Vec<u8>, Vec<u8>) {
        (
            ColumnQualifier { offset, name }.encode(),
            value.to_be_bytes().to_vec(),
        )
    }

    #[test]
    fn row_key_roundtrip_and_layout() {
        let key = RowKey {
            partition: 7,
            time_bucket: invert_seconds(1_685_610_000),
            serial_hash: md5_hash("I11FA555555"),
        };
        let bytes = key.encode();
        assert_eq!(bytes.len(), RowKey::LEN);
        assert_eq!(&bytes[..2], &[0, 7]);
        assert_eq!(RowKey::decode(&bytes).unwrap(), key);
        assert!(matches!(
            RowKey::decode(&bytes[..20]),
            Err(Error::InvalidRowKey { found: 20, .. })
        ));
    }

    #[test]
    fn timestamp_is_recovered_from_inverted_bucket() {
        // The bucket is the inverted start of the hour; offsets count back
        // towards earlier readings.
        let hour = 1_685_610_000;
        let key = RowKey {
            partition: 0,
            time_bucket: invert_seconds(hour),
            serial_hash: [0; 16],
        };
        assert_eq!(key.timestamp_millis(0), hour * 1000);
        assert_eq!(key.timestamp_millis(60), (hour - 60) * 1000);
    }

    #[test]
    fn decode_qualifier() {
        let bytes = ColumnQualifier {
            offset: 900,
            name: b"d",
        }
        .encode();
        assert_eq!(bytes, vec![0, 0, 3, 132, 1, b'd']);
        let q = ColumnQualifier::decode(&bytes).unwrap();
        assert_eq!(q.offset, 900);
        assert_eq!(q.name, b"d");
        assert!(matches!(
            ColumnQualifier::decode(&bytes[..5]),
            Err(Error::InvalidColumn(5))
        ));
    }

    #[test]
    fn decode_row_pairs_volume_and_difference() {
        let hash = md5_hash("I11FA555555");
        let key = RowKey {
            partition: 1,
            time_bucket: invert_seconds(1_685_610_000),
            serial_hash: hash,
        };
        let columns = [
            column(0, b"d", 1.5),
            column(0, b"v", 100.0),
            column(0, b"x", 9.0),
            column(60, b"v", 98.5),
            column(120, b"d", 2.0),
        ];
        let readings = decode_row(
            &key.encode(),
            columns.iter().map(|(q, v)| (q.as_slice(), v.as_slice())),
        )
        .unwrap();

        assert_eq!(
            readings,
            vec![
                Reading {
                    timestamp_millis: 1_685_610_000_000,
                    serial_hash: hash,
                    volume: 100.0,
                    difference: 1.5,
                },
                Reading {
                    timestamp_millis: (1_685_610_000 - 120) * 1000,
                    serial_hash: hash,
                    volume: 0.0,
                    difference: 2.0,
                },
            ]
        );
    }

    #[test]
    fn decode_row_rejects_bad_values() {
        let key = RowKey {
            partition: 1,
            time_bucket: 0,
            serial_hash: [1; 16],
        };
        let qualifier = ColumnQualifier {
            offset: 0,
            name: b"d",
        }
        .encode();
        let value = [0u8; 3];
        assert!(matches!(
            decode_row(&key.encode(), [(qualifier.as_slice(), value.as_slice())]),
            Err(Error::InvalidCellValue(_, 3))
        ));
    }

    #[test]
    fn malformed_volume_keeps_difference() {
        let hash = md5_hash("I11FA555555");
        let key = RowKey {
            partition: 1,
            time_bucket: invert_seconds(1_685_610_000),
            serial_hash: hash,
        };
        let (d, difference) = column(0, b"d", 2.0);
        let v = ColumnQualifier {
            offset: 0,
            name: b"v",
        }
        .encode();
        let volume = [0u8; 3];
        let readings = decode_row(
            &key.encode(),
            [
                (d.as_slice(), difference.as_slice()),
                (v.as_slice(), volume.as_slice()),
            ],
        )
        .unwrap();
        assert_eq!(
            readings,
            vec![Reading {
                timestamp_millis: 1_685_610_000_000,
                serial_hash: hash,
                volume: 0.0,
                difference: 2.0,
            }]
        );
    }
}
