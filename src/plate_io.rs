//! Plate grid files
//!
//! A plate file is a raw little-endian dump:
//!
//! ```text
//! [8 bytes: rows (u64)][8 bytes: cols (u64)][rows * cols * 8 bytes: f64 cells, row-major]
//! ```
//!
//! There is no magic number and no padding. Results are written in the same
//! format next to the other outputs as `<plate stem>-<states>.bin`.

use crate::error::HeatError;
use crate::grid::{Grid, CELL_BYTES};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Load the grid stored in `path`
pub fn load_plate_grid(path: &Path) -> Result<Grid, HeatError> {
    let file = File::open(path).map_err(|e| HeatError::io("Failed to open plate file", path, e))?;
    let mut reader = BufReader::new(file);

    let rows = read_extent(&mut reader, path, "row count")?;
    let cols = read_extent(&mut reader, path, "column count")?;

    if rows == 0 || cols == 0 {
        return Err(HeatError::malformed(
            path,
            format!("{}x{} grid has no cells", rows, cols),
        ));
    }

    let expected = rows
        .checked_mul(cols)
        .and_then(|cells| cells.checked_mul(CELL_BYTES as u64))
        .and_then(|bytes| bytes.checked_add(2 * CELL_BYTES as u64));
    let expected = expected.ok_or_else(|| {
        HeatError::malformed(path, format!("{}x{} grid exceeds any file size", rows, cols))
    })?;
    if let Ok(actual) = fs::metadata(path).map(|m| m.len()) {
        if actual < expected {
            return Err(HeatError::malformed(
                path,
                format!(
                    "{}x{} grid needs {} bytes but the file has {}",
                    rows, cols, expected, actual
                ),
            ));
        }
    }

    let rows = usize::try_from(rows)
        .map_err(|_| HeatError::malformed(path, format!("row count {} does not fit in memory", rows)))?;
    let cols = usize::try_from(cols)
        .map_err(|_| HeatError::malformed(path, format!("column count {} does not fit in memory", cols)))?;

    Grid::load(rows, cols, &mut reader, path)
}

/// Write the most recently completed state of `grid` to `path`
pub fn store_plate_grid(path: &Path, grid: &Grid) -> Result<(), HeatError> {
    let file = File::create(path).map_err(|e| HeatError::io("Failed to create plate file", path, e))?;
    let mut writer = BufWriter::new(file);

    let write = |writer: &mut BufWriter<File>, bytes: &[u8]| {
        writer
            .write_all(bytes)
            .map_err(|e| HeatError::io("Failed to write plate file", path, e))
    };

    write(&mut writer, &(grid.rows() as u64).to_le_bytes())?;
    write(&mut writer, &(grid.cols() as u64).to_le_bytes())?;
    for cell in grid.state() {
        write(&mut writer, &cell.to_le_bytes())?;
    }

    writer
        .flush()
        .map_err(|e| HeatError::io("Failed to flush plate file", path, e))
}

/// Output file for a plate that equilibrated after `states` rounds
///
/// `plate001.bin` with 2162 states becomes `<output_dir>/plate001-2162.bin`.
pub fn output_path(output_dir: &Path, plate_stem: &str, states: u64) -> PathBuf {
    output_dir.join(format!("{}-{}.bin", plate_stem, states))
}

fn read_extent<R: Read>(reader: &mut R, path: &Path, what: &str) -> Result<u64, HeatError> {
    let mut raw = [0u8; 8];
    reader.read_exact(&mut raw).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            HeatError::malformed(path, format!("file ends before the {}", what))
        } else {
            HeatError::io("Failed to read plate file", path, e)
        }
    })?;
    Ok(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_plate(path: &Path, rows: u64, cols: u64, cells: &[f64]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&cols.to_le_bytes());
        for cell in cells {
            bytes.extend_from_slice(&cell.to_le_bytes());
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_load_known_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plate.bin");
        let cells: Vec<f64> = (0..6).map(|i| i as f64 * 0.5).collect();
        write_plate(&path, 2, 3, &cells);

        let grid = load_plate_grid(&path).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (2, 3));
        assert_eq!(grid.state(), cells.as_slice());
    }

    #[test]
    fn test_store_is_byte_exact() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        let cells = [1.0, -2.5, 3.25, f64::MAX];
        write_plate(&input, 2, 2, &cells);

        let grid = load_plate_grid(&input).unwrap();
        store_plate_grid(&output, &grid).unwrap();

        assert_eq!(fs::read(&input).unwrap(), fs::read(&output).unwrap());
    }

    #[test]
    fn test_truncated_cells_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        write_plate(&path, 3, 3, &[0.0; 8]);

        let err = load_plate_grid(&path).unwrap_err();
        assert!(matches!(err, HeatError::MalformedInput { .. }), "{:?}", err);
    }

    #[test]
    fn test_truncated_header_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("header.bin");
        fs::write(&path, 4u64.to_le_bytes()).unwrap();

        let err = load_plate_grid(&path).unwrap_err();
        assert!(err.to_string().contains("column count"), "{}", err);
    }

    #[test]
    fn test_absurd_extents_do_not_allocate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.bin");
        write_plate(&path, u64::MAX / 4, 1 << 20, &[]);

        assert!(load_plate_grid(&path).is_err());
    }

    #[test]
    fn test_empty_shape_is_malformed() {
        let dir = TempDir::new().unwrap();
        for (rows, cols) in [(0, 1u64 << 61), (0, 1 << 44), (3, 0), (0, 0)] {
            let path = dir.path().join(format!("empty-{}-{}.bin", rows, cols));
            write_plate(&path, rows, cols, &[]);

            let err = load_plate_grid(&path).unwrap_err();
            assert!(matches!(err, HeatError::MalformedInput { .. }), "{}x{}: {:?}", rows, cols, err);
        }
    }

    #[test]
    fn test_row_width_overflow_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.bin");
        write_plate(&path, 1, 1 << 61, &[]);

        let err = load_plate_grid(&path).unwrap_err();
        assert!(matches!(err, HeatError::MalformedInput { .. }), "{:?}", err);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_plate_grid(Path::new("/nonexistent/plate.bin")).unwrap_err();
        assert!(matches!(err, HeatError::Io { .. }));
    }

    #[test]
    fn test_output_path_naming() {
        assert_eq!(
            output_path(Path::new("out"), "plate001", 2162),
            PathBuf::from("out/plate001-2162.bin")
        );
    }
}
