//! Tuple iteration over the logical view of a delta matrix.
//!
//! The iterator is a cursor: it records the matrix identity and its own
//! position, and every `next` call walks the matrix it is handed. Holders
//! re-present the matrix on each call, which makes re-attachment after a
//! lock release (the index populator's batch protocol) explicit.

use crate::error::{GraphError, Result};

use super::delta::DeltaMatrix;

/// Iterator over `(row, col, value)` tuples of a delta matrix in row-major
/// order, ascending columns within a row.
#[derive(Clone, Debug, Default)]
pub struct TupleIter {
    token: u64,
    rmin: u64,
    rmax: u64, // inclusive
    /// Last emitted position; `None` before the first emission.
    cursor: Option<(u64, u64)>,
    exhausted: bool,
}

impl TupleIter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches to the full row range of `m`.
    pub fn attach<T: Copy>(&mut self, m: &DeltaMatrix<T>) {
        self.token = m.token();
        self.rmin = 0;
        self.rmax = m.nrows().saturating_sub(1);
        self.cursor = None;
        self.exhausted = m.nrows() == 0;
    }

    /// Attaches to rows `rmin..=rmax` of `m`. An inverted range attaches in
    /// the exhausted state; a range starting beyond the matrix is a
    /// dimension mismatch the caller may recover from by tightening.
    pub fn attach_range<T: Copy>(&mut self, m: &DeltaMatrix<T>, rmin: u64, rmax: u64) -> Result<()> {
        if rmin > rmax {
            self.token = m.token();
            self.rmin = rmin;
            self.rmax = rmax;
            self.cursor = None;
            self.exhausted = true;
            return Ok(());
        }
        if rmin >= m.nrows() {
            return Err(GraphError::DimensionMismatch(format!(
                "range start {rmin} outside matrix of {} rows",
                m.nrows()
            )));
        }
        self.token = m.token();
        self.rmin = rmin;
        self.rmax = rmax.min(m.nrows().saturating_sub(1));
        self.cursor = None;
        self.exhausted = false;
        Ok(())
    }

    /// True iff this iterator was attached to `m`.
    pub fn is_attached<T: Copy>(&self, m: &DeltaMatrix<T>) -> bool {
        self.token != 0 && self.token == m.token()
    }

    pub fn attached(&self) -> bool {
        self.token != 0
    }

    /// Moves the cursor so the next emission starts at `row` (clamped into
    /// the attached range).
    pub fn jump_to_row(&mut self, row: u64) {
        let row = row.max(self.rmin);
        self.cursor = if row == 0 { None } else { Some((row - 1, u64::MAX)) };
        self.exhausted = row > self.rmax;
    }

    /// Rewinds to the start of the attached range.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.exhausted = self.rmin > self.rmax;
    }

    /// Releases the matrix identity; `next` on a detached iterator yields
    /// nothing.
    pub fn detach(&mut self) {
        self.token = 0;
        self.cursor = None;
        self.exhausted = true;
    }

    /// Advances over the logical view of `m`. Returns `None` on exhaustion.
    pub fn next<T: Copy>(&mut self, m: &DeltaMatrix<T>) -> Option<(u64, u64, T)> {
        if self.exhausted || self.token == 0 {
            return None;
        }
        debug_assert!(self.is_attached(m), "iterator advanced over a different matrix");

        let (start_row, min_col) = match self.cursor {
            None => (self.rmin, None),
            Some((r, c)) => (r, Some(c)),
        };

        let mut rows = m.occupied_rows_from(start_row);
        while let Some(r) = rows.next() {
            if r > self.rmax {
                break;
            }
            let skip_to = if r == start_row { min_col } else { None };
            for (c, v) in m.row_iter(r) {
                if let Some(mc) = skip_to {
                    if c <= mc {
                        continue;
                    }
                }
                self.cursor = Some((r, c));
                return Some((r, c, v));
            }
        }
        self.exhausted = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeltaMatrix<bool> {
        let mut m = DeltaMatrix::new(10, 10);
        m.set(0, 0, true);
        m.set(2, 2, true);
        m.set(4, 4, true);
        m.flush();
        m.set(6, 6, true); // pending addition
        m.clear(2, 2); // pending deletion
        m
    }

    #[test]
    fn yields_union_minus_deletions_in_order() {
        let m = sample();
        let mut it = TupleIter::new();
        it.attach(&m);
        let mut got = Vec::new();
        while let Some((r, c, _)) = it.next(&m) {
            got.push((r, c));
        }
        assert_eq!(got, vec![(0, 0), (4, 4), (6, 6)]);
        assert!(it.next(&m).is_none());
    }

    #[test]
    fn attach_range_bounds() {
        let m = sample();
        let mut it = TupleIter::new();
        it.attach_range(&m, 4, 6).unwrap();
        let mut got = Vec::new();
        while let Some((r, _, _)) = it.next(&m) {
            got.push(r);
        }
        assert_eq!(got, vec![4, 6]);

        // inverted range: exhausted immediately
        it.attach_range(&m, 6, 4).unwrap();
        assert!(it.next(&m).is_none());

        // range beyond the matrix: typed error
        assert!(matches!(
            it.attach_range(&m, 100, 200),
            Err(GraphError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn jump_to_row_resumes() {
        let m = sample();
        let mut it = TupleIter::new();
        it.attach(&m);
        it.jump_to_row(4);
        assert_eq!(it.next(&m).map(|(r, _, _)| r), Some(4));
        assert_eq!(it.next(&m).map(|(r, _, _)| r), Some(6));
        assert!(it.next(&m).is_none());
        it.reset();
        assert_eq!(it.next(&m).map(|(r, _, _)| r), Some(0));
    }

    #[test]
    fn is_attached_tracks_identity() {
        let a = sample();
        let b = sample();
        let mut it = TupleIter::new();
        it.attach(&a);
        assert!(it.is_attached(&a));
        assert!(!it.is_attached(&b));
        it.detach();
        assert!(!it.attached());
        assert!(it.next(&a).is_none());
    }
}
