//! Error types for cosim-matrix operations.

use crate::ItemId;
use std::io;
use thiserror::Error;

/// Errors that can occur while writing, reading or transposing a sparse matrix.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// I/O error from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CRC checksum mismatch indicating a corrupt header.
    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// Invalid matrix file format, magic number or row layout.
    #[error("Invalid matrix format: {0}")]
    InvalidFormat(String),

    /// A row id was written twice to the same matrix.
    #[error("Row {0} was already written")]
    DuplicateRow(ItemId),

    /// A row listed the same column id twice.
    #[error("Row {row} contains column {col} more than once")]
    DuplicateColumn { row: ItemId, col: ItemId },

    /// Column id and value arrays differ in length.
    #[error("Column ids ({ids}) and values ({values}) differ in length")]
    LengthMismatch { ids: usize, values: usize },

    /// NaN or infinite cell value.
    #[error("Row {row} has a non-finite value at column {col}")]
    InvalidValue { row: ItemId, col: ItemId },
}

/// Result type alias for matrix operations.
pub type Result<T> = std::result::Result<T, MatrixError>;
