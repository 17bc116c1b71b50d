//! Boolean matrix algebra over logical matrix views, used by traversal
//! operators to expand a batch of source nodes through relation matrices.

use super::delta::DeltaMatrix;
use super::sparse::SparseMatrix;

/// Structural (boolean) view of a matrix: which columns are populated per
/// row. Values are irrelevant to traversal expansion.
pub trait LogicalSource {
    fn nrows(&self) -> u64;
    fn ncols(&self) -> u64;
    /// Populated columns of `row` in ascending order.
    fn row_cols(&self, row: u64, out: &mut Vec<u64>);
    /// Populated rows in ascending order.
    fn occupied_rows(&self, out: &mut Vec<u64>);
}

impl<T: Copy> LogicalSource for DeltaMatrix<T> {
    fn nrows(&self) -> u64 {
        DeltaMatrix::nrows(self)
    }

    fn ncols(&self) -> u64 {
        DeltaMatrix::ncols(self)
    }

    fn row_cols(&self, row: u64, out: &mut Vec<u64>) {
        out.extend(self.row_iter(row).map(|(c, _)| c));
    }

    fn occupied_rows(&self, out: &mut Vec<u64>) {
        out.extend(self.occupied_rows_from(0));
    }
}

impl LogicalSource for SparseMatrix<bool> {
    fn nrows(&self) -> u64 {
        SparseMatrix::nrows(self)
    }

    fn ncols(&self) -> u64 {
        SparseMatrix::ncols(self)
    }

    fn row_cols(&self, row: u64, out: &mut Vec<u64>) {
        out.extend(self.row(row).iter().map(|(c, _)| *c));
    }

    fn occupied_rows(&self, out: &mut Vec<u64>) {
        out.extend(self.rows_from(0).map(|(r, _)| r));
    }
}

/// Boolean semiring product `a × b`: `result[i,k]` holds iff some `j`
/// satisfies `a[i,j] ∧ b[j,k]`.
pub fn bool_mxm(a: &SparseMatrix<bool>, b: &dyn LogicalSource) -> SparseMatrix<bool> {
    let mut result = SparseMatrix::new(a.nrows(), b.ncols());
    let mut cols = Vec::new();
    for (i, cells) in a.rows_from(0) {
        for (j, _) in cells {
            cols.clear();
            b.row_cols(*j, &mut cols);
            for &k in &cols {
                result.set(i, k, true);
            }
        }
    }
    result
}

/// Materializes the structural transpose of `src` as a boolean matrix.
pub fn transpose_logical(src: &dyn LogicalSource) -> SparseMatrix<bool> {
    let mut result = SparseMatrix::new(src.ncols(), src.nrows());
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    src.occupied_rows(&mut rows);
    for &row in &rows {
        cols.clear();
        src.row_cols(row, &mut cols);
        for &c in &cols {
            result.set(c, row, true);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mxm_expands_frontier() {
        // F: one record row selecting sources {0, 2}
        let mut f = SparseMatrix::new(1, 4);
        f.set(0, 0, true);
        f.set(0, 2, true);

        // R: 0->1, 2->3, 3->0
        let mut r = DeltaMatrix::new(4, 4);
        r.set(0, 1, 100u64);
        r.set(2, 3, 101);
        r.set(3, 0, 102);

        let m = bool_mxm(&f, &r);
        let cells: Vec<(u64, u64)> = m.iter().map(|(i, k, _)| (i, k)).collect();
        assert_eq!(cells, vec![(0, 1), (0, 3)]);
    }

    #[test]
    fn transpose_flips_edges() {
        let mut r = DeltaMatrix::new(3, 3);
        r.set(0, 2, 1u64);
        r.set(1, 2, 2);
        let t = transpose_logical(&r);
        let cells: Vec<(u64, u64)> = t.iter().map(|(i, k, _)| (i, k)).collect();
        assert_eq!(cells, vec![(2, 0), (2, 1)]);
    }
}
