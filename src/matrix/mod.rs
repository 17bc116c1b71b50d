//! Sparse matrix storage: the raw primitive, the delta overlay presented to
//! the rest of the engine, tuple iteration, and the boolean algebra used by
//! traversal operators.

mod algebra;
mod delta;
mod iter;
mod sparse;

pub use algebra::{bool_mxm, transpose_logical, LogicalSource};
pub use delta::DeltaMatrix;
pub use iter::TupleIter;
pub use sparse::SparseMatrix;
