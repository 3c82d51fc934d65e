//! Row store abstraction shared by file-backed and in-memory matrices.

use crate::error::Result;
use crate::format::ValueConf;
use crate::row::MatrixRow;
use crate::ItemId;

/// Read access to a sparse matrix by row id.
///
/// Implementations must be thread-safe: similarity queries read rows from many
/// worker threads at once.
pub trait RowStore: Send + Sync {
    /// Returns the row with this id, if present.
    fn get_row(&self, id: ItemId) -> Result<Option<MatrixRow<'_>>>;

    /// Row ids in ascending order.
    fn row_ids(&self) -> Vec<ItemId>;

    fn num_rows(&self) -> usize;

    fn value_conf(&self) -> ValueConf;

    /// Visits every row in ascending id order, stopping at the first error.
    fn for_each_row(&self, f: &mut dyn FnMut(MatrixRow<'_>) -> Result<()>) -> Result<()>;
}
