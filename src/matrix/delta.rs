//! Delta-overlay matrix: a main matrix plus pending-addition and
//! pending-deletion overlays, folded together on flush.

use std::sync::atomic::{AtomicU64, Ordering};

use super::sparse::SparseMatrix;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Logical matrix `L` presented over the triple `(M, P+, P-)`:
///
/// - a cell present in `P+` is present in `L` with the `P+` value;
/// - otherwise a cell present in `M` is present unless marked in `P-`.
///
/// Writers stage edits into the overlays; `flush` folds them into `M`,
/// after which `M` alone represents `L`. `P+` and `M` stay disjoint except
/// for replace edits, where the `P+` value wins until flushed.
#[derive(Debug)]
pub struct DeltaMatrix<T> {
    m: SparseMatrix<T>,
    plus: SparseMatrix<T>,
    minus: SparseMatrix<()>,
    token: u64,
}

impl<T: Copy> DeltaMatrix<T> {
    pub fn new(nrows: u64, ncols: u64) -> Self {
        Self {
            m: SparseMatrix::new(nrows, ncols),
            plus: SparseMatrix::new(nrows, ncols),
            minus: SparseMatrix::new(nrows, ncols),
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Identity token used by iterators to recognize the matrix they were
    /// attached to.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn nrows(&self) -> u64 {
        self.m.nrows()
    }

    pub fn ncols(&self) -> u64 {
        self.m.ncols()
    }

    /// Stored cells in the logical view. Every `P-` mark shadows exactly one
    /// `M` cell, and a replace edit contributes one `M`, one `P+`, and one
    /// `P-` entry, so the sum nets out per cell.
    pub fn nvals(&self) -> u64 {
        self.m.nvals() + self.plus.nvals() - self.minus.nvals()
    }

    /// Sets `(row, col)` to `v` in the logical view. A cell already present
    /// in `M` is marked deleted there and re-added through `P+` so the new
    /// value replaces the old at flush.
    pub fn set(&mut self, row: u64, col: u64, v: T) {
        if self.m.contains(row, col) {
            self.minus.set(row, col, ());
            self.plus.set(row, col, v);
        } else {
            self.minus.remove(row, col);
            self.plus.set(row, col, v);
        }
    }

    /// Removes `(row, col)` from the logical view.
    pub fn clear(&mut self, row: u64, col: u64) {
        if self.plus.remove(row, col).is_some() {
            // A replace edit still shadows an M entry; keep its P- mark so
            // the original cell dies at flush.
            if !self.m.contains(row, col) {
                self.minus.remove(row, col);
            }
        } else if self.m.contains(row, col) {
            self.minus.set(row, col, ());
        }
    }

    /// Value at `(row, col)` in the logical view.
    pub fn get(&self, row: u64, col: u64) -> Option<T> {
        if let Some(v) = self.plus.get(row, col) {
            return Some(v);
        }
        if self.minus.contains(row, col) {
            return None;
        }
        self.m.get(row, col)
    }

    pub fn contains(&self, row: u64, col: u64) -> bool {
        self.get(row, col).is_some()
    }

    /// True iff either overlay holds staged edits.
    pub fn pending(&self) -> bool {
        !self.plus.is_empty() || !self.minus.is_empty()
    }

    /// Folds the overlays into `M`: deletions first, then additions, then
    /// both overlays are cleared. Afterwards `M` alone represents the
    /// logical view.
    pub fn flush(&mut self) {
        let deletions: Vec<(u64, u64)> = self.minus.iter().map(|(r, c, _)| (r, c)).collect();
        for (r, c) in deletions {
            self.m.remove(r, c);
        }
        let additions: Vec<(u64, u64, T)> = self.plus.iter().collect();
        for (r, c, v) in additions {
            self.m.set(r, c, v);
        }
        self.plus.clear();
        self.minus.clear();
    }

    /// Grows all three matrices to at least `(nrows, ncols)`.
    pub fn resize(&mut self, nrows: u64, ncols: u64) {
        self.m.resize(nrows, ncols);
        self.plus.resize(nrows, ncols);
        self.minus.resize(nrows, ncols);
    }

    /// Cells of one logical row in ascending column order.
    pub fn row_iter(&self, row: u64) -> LogicalRowIter<'_, T> {
        LogicalRowIter {
            m: self.m.row(row),
            plus: self.plus.row(row),
            minus: &self.minus,
            row,
            mi: 0,
            pi: 0,
        }
    }

    /// Populated logical rows at or above `from`, ascending. A row appears
    /// once even when both `M` and `P+` contribute to it.
    pub fn occupied_rows_from(&self, from: u64) -> impl Iterator<Item = u64> + '_ {
        let mut m_rows = self.m.rows_from(from).map(|(r, _)| r).peekable();
        let mut p_rows = self.plus.rows_from(from).map(|(r, _)| r).peekable();
        std::iter::from_fn(move || match (m_rows.peek(), p_rows.peek()) {
            (Some(&a), Some(&b)) => {
                if a <= b {
                    if a == b {
                        p_rows.next();
                    }
                    m_rows.next();
                    Some(a)
                } else {
                    p_rows.next();
                    Some(b)
                }
            }
            (Some(&a), None) => {
                m_rows.next();
                Some(a)
            }
            (None, Some(&b)) => {
                p_rows.next();
                Some(b)
            }
            (None, None) => None,
        })
    }
}

/// Merged iterator over one logical row.
pub struct LogicalRowIter<'a, T> {
    m: &'a [(u64, T)],
    plus: &'a [(u64, T)],
    minus: &'a SparseMatrix<()>,
    row: u64,
    mi: usize,
    pi: usize,
}

impl<'a, T: Copy> Iterator for LogicalRowIter<'a, T> {
    type Item = (u64, T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let m_cell = self.m.get(self.mi).copied();
            let p_cell = self.plus.get(self.pi).copied();
            match (m_cell, p_cell) {
                (Some((mc, mv)), Some((pc, _))) if mc < pc => {
                    self.mi += 1;
                    if !self.minus.contains(self.row, mc) {
                        return Some((mc, mv));
                    }
                }
                (Some((mc, _)), Some((pc, pv))) => {
                    // P+ wins on ties.
                    if mc == pc {
                        self.mi += 1;
                    }
                    self.pi += 1;
                    return Some((pc, pv));
                }
                (Some((mc, mv)), None) => {
                    self.mi += 1;
                    if !self.minus.contains(self.row, mc) {
                        return Some((mc, mv));
                    }
                }
                (None, Some((pc, pv))) => {
                    self.pi += 1;
                    return Some((pc, pv));
                }
                (None, None) => return None,
            }
        }
    }
}
