//! cosim-matrix: persistent sparse row matrices.
//!
//! A matrix maps row ids to sparse rows of `(column id, value)` cells. Matrices
//! are written once by [`SparseMatrixWriter`], sealed, and then read through a
//! memory mapping by [`SparseMatrix`]. [`SparseMatrixTransposer`] produces the
//! column-major twin of a matrix without holding it all in memory.
//!
//! # Example
//!
//! ```no_run
//! use cosim_matrix::{SparseMatrix, SparseMatrixWriter, SparseRow, ValueConf};
//!
//! # fn main() -> cosim_matrix::Result<()> {
//! let writer = SparseMatrixWriter::create("/tmp/features", ValueConf::unbounded())?;
//! writer.write_row(&SparseRow::new(1, vec![10, 11], vec![1.0, 0.5])?)?;
//! writer.finish()?;
//!
//! let matrix = SparseMatrix::open("/tmp/features")?;
//! let row = matrix.get_row(1)?.expect("row 1");
//! assert_eq!(row.get(11), Some(0.5));
//! # Ok(())
//! # }
//! ```
//!
//! See [`format`] for the on-disk layout.

pub mod error;
pub mod format;
pub mod memory;
pub mod reader;
pub mod row;
pub mod store;
pub mod transpose;
pub mod writer;

/// Identifier of a row or column.
pub type ItemId = u32;

pub use error::{MatrixError, Result};
pub use format::ValueConf;
pub use memory::InMemoryMatrix;
pub use reader::SparseMatrix;
pub use row::{MatrixRow, SparseRow};
pub use store::RowStore;
pub use transpose::{transpose, SparseMatrixTransposer, DEFAULT_TRANSPOSE_BUFFER_MB};
pub use writer::{MatrixMetadata, SparseMatrixWriter};
