//! End-to-end tests: write, seal, reopen and transpose matrix files.

use cosim_matrix::{
    transpose, MatrixError, RowStore, SparseMatrix, SparseMatrixWriter, SparseRow, ValueConf,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_write_from_many_threads_then_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("features");
    let writer = Arc::new(SparseMatrixWriter::create(&path, ValueConf::unbounded()).unwrap());

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                for i in 0..50u32 {
                    let id = t * 1000 + i;
                    let cells: HashMap<u32, f32> =
                        (0..(i % 7)).map(|c| (c * 3 + t, (c + 1) as f32)).collect();
                    writer.write_row(&SparseRow::from_map(id, &cells).unwrap()).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let writer = Arc::try_unwrap(writer).ok().unwrap();
    let meta = writer.finish().unwrap();
    assert_eq!(meta.num_rows, 400);

    let m = SparseMatrix::open(&path).unwrap();
    assert_eq!(m.num_rows(), 400);
    let ids = m.row_ids();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let row = m.get_row(3 * 1000 + 13).unwrap().unwrap();
    assert_eq!(row.num_cols(), 13 % 7);
    for i in 1..row.num_cols() {
        assert!(row.col_id(i - 1) < row.col_id(i));
    }
    assert_eq!(row.get(3), Some(1.0));
}

#[test]
fn test_rewrite_replaces_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m");

    let w = SparseMatrixWriter::create(&path, ValueConf::unbounded()).unwrap();
    w.write_row(&SparseRow::new(1, vec![1], vec![1.0]).unwrap()).unwrap();
    w.finish().unwrap();

    let w = SparseMatrixWriter::create(&path, ValueConf::unbounded()).unwrap();
    w.write_row(&SparseRow::new(2, vec![2], vec![2.0]).unwrap()).unwrap();
    w.finish().unwrap();

    let m = SparseMatrix::open(&path).unwrap();
    assert_eq!(m.row_ids(), vec![2]);
}

#[test]
fn test_transpose_file_backed() {
    let dir = TempDir::new().unwrap();
    let fpath = dir.path().join("features");
    let tpath = dir.path().join("transpose");

    let w = SparseMatrixWriter::create(&fpath, ValueConf::unbounded()).unwrap();
    w.write_row(&SparseRow::new(1, vec![2, 3], vec![1.0, 1.0]).unwrap()).unwrap();
    w.write_row(&SparseRow::new(2, vec![3], vec![1.0]).unwrap()).unwrap();
    w.write_row(&SparseRow::new(3, vec![], vec![]).unwrap()).unwrap();
    w.finish().unwrap();

    let features = SparseMatrix::open(&fpath).unwrap();
    transpose(&features, &tpath).unwrap();
    let t = SparseMatrix::open(&tpath).unwrap();

    assert_eq!(RowStore::row_ids(&t), vec![2, 3]);
    assert_eq!(t.get_row(2).unwrap().unwrap().to_map(), HashMap::from([(1, 1.0)]));
    assert_eq!(
        t.get_row(3).unwrap().unwrap().to_map(),
        HashMap::from([(1, 1.0), (2, 1.0)])
    );
}

#[test]
fn test_truncated_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m");
    let w = SparseMatrixWriter::create(&path, ValueConf::unbounded()).unwrap();
    for id in 0..10u32 {
        w.write_row(&SparseRow::new(id, vec![id], vec![1.0]).unwrap()).unwrap();
    }
    w.finish().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..40]).unwrap();
    assert!(matches!(
        SparseMatrix::open(&path),
        Err(MatrixError::InvalidFormat(_))
    ));
}
