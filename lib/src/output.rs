/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use crate::{
    key::OutputKey,
    ranking::{RankedEntry, RankedResult},
};

pub const SUM_COLUMN: &str = "sum";
pub const MIN_COLUMN: &str = "min";
pub const MAX_COLUMN: &str = "max";
pub const COUNT_COLUMN: &str = "cnt";
pub const AVG_COLUMN: &str = "avg";
pub const TOP_COLUMN: &str = "top";
pub const BOTTOM_COLUMN: &str = "bottom";

const TUPLE_SEPARATOR: &str = ";";

/// Encoding of the `cnt` column: big-endian i64 or i32.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CountWidth {
    I32,
    I64,
}

/// A formatted aggregate row, ready to be stored.
#[derive(PartialEq, Clone, Debug)]
pub struct OutputRow {
    pub key: OutputKey,
    pub family: String,
    pub columns: Vec<(&'static str, Vec<u8>)>,
}

impl OutputRow {
    pub fn new(result: &RankedResult, family: &str, count_width: CountWidth) -> Self {
        let count = match count_width {
            CountWidth::I64 => result.count.to_be_bytes().to_vec(),
            CountWidth::I32 => (result.count as i32).to_be_bytes().to_vec(),
        };
        Self {
            key: result.key,
            family: family.to_string(),
            columns: vec![
                (SUM_COLUMN, result.sum.to_be_bytes().to_vec()),
                (MIN_COLUMN, result.min.to_be_bytes().to_vec()),
                (MAX_COLUMN, result.max.to_be_bytes().to_vec()),
                (COUNT_COLUMN, count),
                (AVG_COLUMN, result.avg.to_be_bytes().to_vec()),
                (TOP_COLUMN, format_entries(&result.top).into_bytes()),
                (BOTTOM_COLUMN, format_entries(&result.bottom).into_bytes()),
            ],
        }
    }

    pub fn column(&self, name: &str) -> Option<&[u8]> {
        self.columns
            .iter()
            .find(|(qualifier, _)| *qualifier == name)
            .map(|(_, value)| value.as_slice())
    }
}

/// `accountKey;displayName;serial;difference` per entry, all joined by
/// `;`.
pub fn format_entries(entries: &[RankedEntry]) -> String {
    entries
        .iter()
        .flat_map(|entry| {
            [
                entry.account_key.clone(),
                entry.display_name.clone(),
                entry.serial.clone(),
                format_decimal(entry.difference),
            ]
        })
        .collect::<Vec<_>>()
        .join(TUPLE_SEPARATOR)
}

/// Plain decimal notation, never exponent form. Integral values keep a
/// fractional part (`5.0`).
pub fn format_decimal(value: f32) -> String {
    let s = value.to_string();
    if value.is_finite() && !s.contains('.') {
        format!("{s}.0")
    } else {
        s
    }
}
