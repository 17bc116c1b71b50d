//! Row-major sparse matrix primitive.

use std::collections::BTreeMap;

/// Sparse matrix with hypersparse row storage: absent rows cost nothing,
/// present rows keep their cells sorted by column.
#[derive(Clone, Debug, Default)]
pub struct SparseMatrix<T> {
    nrows: u64,
    ncols: u64,
    rows: BTreeMap<u64, Vec<(u64, T)>>,
    nvals: u64,
}

impl<T: Copy> SparseMatrix<T> {
    pub fn new(nrows: u64, ncols: u64) -> Self {
        Self {
            nrows,
            ncols,
            rows: BTreeMap::new(),
            nvals: 0,
        }
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn ncols(&self) -> u64 {
        self.ncols
    }

    /// Number of stored cells.
    pub fn nvals(&self) -> u64 {
        self.nvals
    }

    pub fn is_empty(&self) -> bool {
        self.nvals == 0
    }

    /// Sets `(row, col)` to `v`, returning the previous value if any.
    /// Out-of-bounds coordinates are storage bugs.
    pub fn set(&mut self, row: u64, col: u64, v: T) -> Option<T> {
        debug_assert!(row < self.nrows && col < self.ncols, "cell out of bounds");
        let cells = self.rows.entry(row).or_default();
        match cells.binary_search_by_key(&col, |(c, _)| *c) {
            Ok(idx) => Some(std::mem::replace(&mut cells[idx].1, v)),
            Err(idx) => {
                cells.insert(idx, (col, v));
                self.nvals += 1;
                None
            }
        }
    }

    /// Removes `(row, col)`, returning the stored value if it was present.
    pub fn remove(&mut self, row: u64, col: u64) -> Option<T> {
        let cells = self.rows.get_mut(&row)?;
        match cells.binary_search_by_key(&col, |(c, _)| *c) {
            Ok(idx) => {
                let (_, v) = cells.remove(idx);
                if cells.is_empty() {
                    self.rows.remove(&row);
                }
                self.nvals -= 1;
                Some(v)
            }
            Err(_) => None,
        }
    }

    pub fn get(&self, row: u64, col: u64) -> Option<T> {
        let cells = self.rows.get(&row)?;
        cells
            .binary_search_by_key(&col, |(c, _)| *c)
            .ok()
            .map(|idx| cells[idx].1)
    }

    pub fn contains(&self, row: u64, col: u64) -> bool {
        self.get(row, col).is_some()
    }

    /// Cells of one row in ascending column order.
    pub fn row(&self, row: u64) -> &[(u64, T)] {
        self.rows.get(&row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Populated rows at or above `from`, in ascending row order.
    pub fn rows_from(&self, from: u64) -> impl Iterator<Item = (u64, &[(u64, T)])> {
        self.rows
            .range(from..)
            .map(|(r, cells)| (*r, cells.as_slice()))
    }

    /// All cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, T)> + '_ {
        self.rows
            .iter()
            .flat_map(|(r, cells)| cells.iter().map(move |(c, v)| (*r, *c, *v)))
    }

    /// Grows to at least `(nrows, ncols)`; never shrinks.
    pub fn resize(&mut self, nrows: u64, ncols: u64) {
        self.nrows = self.nrows.max(nrows);
        self.ncols = self.ncols.max(ncols);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.nvals = 0;
    }
}
