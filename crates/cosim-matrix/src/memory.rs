//! In-memory row store.
//!
//! Holds rows in the same encoded form as a matrix file, so views behave
//! identically. Handy for tests and small corpora.

use crate::error::{MatrixError, Result};
use crate::format::ValueConf;
use crate::row::{MatrixRow, SparseRow};
use crate::store::RowStore;
use crate::ItemId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct InMemoryMatrix {
    vconf: ValueConf,
    rows: BTreeMap<ItemId, Vec<u8>>,
}

impl InMemoryMatrix {
    pub fn new(vconf: ValueConf) -> Self {
        Self {
            vconf,
            rows: BTreeMap::new(),
        }
    }

    /// Builds a store from rows, rejecting repeated row ids.
    pub fn from_rows(vconf: ValueConf, rows: impl IntoIterator<Item = SparseRow>) -> Result<Self> {
        let mut m = Self::new(vconf);
        for row in rows {
            m.insert(&row)?;
        }
        Ok(m)
    }

    pub fn insert(&mut self, row: &SparseRow) -> Result<()> {
        if self.rows.contains_key(&row.row_id()) {
            return Err(MatrixError::DuplicateRow(row.row_id()));
        }
        let mut buf = Vec::with_capacity(row.encoded_len() + 8);
        row.encode_into(&self.vconf, &mut buf);
        self.rows.insert(row.row_id(), buf);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowStore for InMemoryMatrix {
    fn get_row(&self, id: ItemId) -> Result<Option<MatrixRow<'_>>> {
        match self.rows.get(&id) {
            Some(buf) => MatrixRow::parse(buf).map(Some),
            None => Ok(None),
        }
    }

    fn row_ids(&self) -> Vec<ItemId> {
        self.rows.keys().copied().collect()
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn value_conf(&self) -> ValueConf {
        self.vconf
    }

    fn for_each_row(&self, f: &mut dyn FnMut(MatrixRow<'_>) -> Result<()>) -> Result<()> {
        for buf in self.rows.values() {
            f(MatrixRow::parse(buf)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store() {
        let m = InMemoryMatrix::from_rows(
            ValueConf::unbounded(),
            vec![
                SparseRow::new(2, vec![3], vec![1.0]).unwrap(),
                SparseRow::new(1, vec![2, 3], vec![1.0, 1.0]).unwrap(),
            ],
        )
        .unwrap();

        assert_eq!(m.row_ids(), vec![1, 2]);
        assert_eq!(m.get_row(1).unwrap().unwrap().num_cols(), 2);
        assert!(m.get_row(9).unwrap().is_none());

        let mut seen = Vec::new();
        m.for_each_row(&mut |row| {
            seen.push(row.row_id());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let row = SparseRow::new(1, vec![], vec![]).unwrap();
        assert!(matches!(
            InMemoryMatrix::from_rows(ValueConf::unbounded(), vec![row.clone(), row]),
            Err(MatrixError::DuplicateRow(1))
        ));
    }
}
