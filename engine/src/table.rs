/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

use std::{collections::BTreeMap, ops::Bound, path::Path};

use serde::{Deserialize, Serialize};
use swm_aggregation::{OutputRow, ScanRange};

use crate::error::{Error, Result};

/// Qualifier to value, within one column family.
pub type Cells = BTreeMap<Vec<u8>, Vec<u8>>;

/// Sorted wide-column table: row key, column family, qualifier.
#[derive(Serialize, Deserialize, PartialEq, Default, Debug)]
pub struct Table {
    rows: BTreeMap<Vec<u8>, BTreeMap<String, Cells>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::ReadFile(path.to_path_buf(), e))?;
        let table = ciborium::from_reader::<Table, _>(data.as_slice())
            .map_err(|e| Error::DecodeTable(path.to_path_buf(), e))?;
        log::debug!("loaded {} rows from {}", table.len(), path.display());
        Ok(table)
    }

    /// Load the table, or start an empty one if the file does not exist.
    pub async fn load_or_new(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| Error::ReadFile(path.to_path_buf(), e))?;
        if exists {
            Self::load(path).await
        } else {
            Ok(Self::new())
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut data = Vec::new();
        ciborium::into_writer(self, &mut data)
            .map_err(|e| Error::EncodeTable(path.to_path_buf(), e))?;
        tokio::fs::write(path, data)
            .await
            .map_err(|e| Error::WriteFile(path.to_path_buf(), e))?;
        log::debug!("saved {} rows to {}", self.len(), path.display());
        Ok(())
    }

    /// Rows within `range` having cells in `family`, in key order.
    pub fn scan<'a>(
        &'a self,
        range: &'a ScanRange,
        family: &'a str,
    ) -> impl Iterator<Item = (&'a [u8], &'a Cells)> + 'a {
        self.rows
            .range::<[u8], _>((Bound::Included(range.start.as_slice()), Bound::Unbounded))
            .take_while(move |(key, _)| range.contains(key))
            .filter_map(move |(key, families)| Some((key.as_slice(), families.get(family)?)))
    }

    pub fn put_cell(&mut self, row: Vec<u8>, family: &str, qualifier: Vec<u8>, value: Vec<u8>) {
        self.rows
            .entry(row)
            .or_default()
            .entry(family.to_string())
            .or_default()
            .insert(qualifier, value);
    }

    pub fn put(&mut self, row: OutputRow) {
        let cells = self
            .rows
            .entry(row.key.as_bytes().to_vec())
            .or_default()
            .entry(row.family)
            .or_default();
        cells.extend(
            row.columns
                .into_iter()
                .map(|(qualifier, value)| (qualifier.as_bytes().to_vec(), value)),
        );
    }

    pub fn get(&self, row: &[u8], family: &str, qualifier: &[u8]) -> Option<&[u8]> {
        self.rows
            .get(row)?
            .get(family)?
            .get(qualifier)
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
