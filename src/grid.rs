//! Double-buffered temperature grid
//!
//! A [`Grid`] holds two equally sized row-major `f64` buffers. During a sweep
//! the five-point stencil reads the *previous* buffer and writes the
//! *current* buffer; [`Grid::swap`] then flips the roles so the freshly
//! written buffer becomes the read side of the next round. Swapping is an
//! index flip, never a copy, and nothing is allocated after [`Grid::load`].
//!
//! Border rows and columns are boundary conditions. They are copied into both
//! buffers at load time and never written again.
//!
//! ```text
//!   previous (read)            current (write)
//!   +---+---+---+---+          +---+---+---+---+
//!   | B | B | B | B |          | B | B | B | B |
//!   +---+---+---+---+   sweep  +---+---+---+---+
//!   | B | x | x | B |  ----->  | B | x'| x'| B |
//!   +---+---+---+---+          +---+---+---+---+
//!   | B | B | B | B |          | B | B | B | B |
//!   +---+---+---+---+          +---+---+---+---+
//! ```

use crate::error::HeatError;
use std::io::{ErrorKind, Read};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bytes per serialized cell
pub const CELL_BYTES: usize = 8;

/// Double-buffered plate temperatures
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    buffers: [Vec<f64>; 2],
    /// Index of the buffer the next sweep writes into
    current: usize,
}

impl Grid {
    /// Load a `rows x cols` field of little-endian `f64` cells from `reader`
    ///
    /// `origin` names the stream in error messages.
    ///
    /// # Errors
    ///
    /// - [`HeatError::Allocation`] if either buffer cannot be allocated
    /// - [`HeatError::MalformedInput`] if the stream ends before every cell is read
    /// - [`HeatError::Io`] for any other read failure
    pub fn load<R: Read>(rows: usize, cols: usize, reader: &mut R, origin: &Path) -> Result<Self, HeatError> {
        let len = cell_count(rows, cols)?;
        let mut initial = allocate_buffer(len)?;
        let scratch = allocate_buffer(len)?;

        if len > 0 {
            let mut row_bytes = allocate_row_bytes(cols)?;
            for (row, cells) in initial.chunks_exact_mut(cols).enumerate() {
                reader.read_exact(&mut row_bytes).map_err(|e| {
                    if e.kind() == ErrorKind::UnexpectedEof {
                        HeatError::malformed(
                            origin,
                            format!("stream ended in row {} of {} ({} columns declared)", row, rows, cols),
                        )
                    } else {
                        HeatError::io("Failed to read cells from", origin, e)
                    }
                })?;
                decode_row(&row_bytes, cells);
            }
        }

        Ok(Self::assemble(rows, cols, initial, scratch))
    }

    /// Build a grid from an in-memory row-major field
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<f64>) -> Result<Self, HeatError> {
        let len = cell_count(rows, cols)?;
        if cells.len() != len {
            return Err(HeatError::InvalidArgument(format!(
                "{} cells given for a {}x{} grid",
                cells.len(),
                rows,
                cols
            )));
        }
        let scratch = allocate_buffer(len)?;
        Ok(Self::assemble(rows, cols, cells, scratch))
    }

    /// The initial field becomes the read side; its borders are mirrored
    /// into the write side so they survive every swap.
    fn assemble(rows: usize, cols: usize, initial: Vec<f64>, scratch: Vec<f64>) -> Self {
        let mut grid = Self {
            rows,
            cols,
            buffers: [scratch, initial],
            current: 0,
        };
        grid.mirror_borders();
        grid
    }

    fn mirror_borders(&mut self) {
        let (rows, cols) = (self.rows, self.cols);
        if rows == 0 || cols == 0 {
            return;
        }
        let (write, read) = self.split_buffers();

        let last_row = (rows - 1) * cols;
        write[..cols].copy_from_slice(&read[..cols]);
        write[last_row..].copy_from_slice(&read[last_row..]);

        for row in 1..rows.saturating_sub(1) {
            let first = row * cols;
            let last = first + cols - 1;
            write[first] = read[first];
            write[last] = read[last];
        }
    }

    /// (current, previous) as disjoint slices
    fn split_buffers(&mut self) -> (&mut [f64], &mut [f64]) {
        let (low, high) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (&mut low[0], &mut high[0])
        } else {
            (&mut high[0], &mut low[0])
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of rows the relaxation step recomputes
    pub fn interior_rows(&self) -> usize {
        self.rows.saturating_sub(2)
    }

    /// Rows `1..rows-1`
    pub fn interior_row_range(&self) -> Range<usize> {
        1..1 + self.interior_rows()
    }

    /// Buffer the next sweep writes into
    pub fn current(&self) -> &[f64] {
        &self.buffers[self.current]
    }

    /// Buffer the next sweep reads from
    pub fn previous(&self) -> &[f64] {
        &self.buffers[1 - self.current]
    }

    /// Most recently completed state (the initial field before any round)
    ///
    /// This is the buffer to persist once equilibrium is reached.
    pub fn state(&self) -> &[f64] {
        self.previous()
    }

    /// Cell of the most recently completed state
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.state()[row * self.cols + col]
    }

    /// Recompute one interior cell from the previous buffer into the current one
    ///
    /// Applies `new = old + coefficient * (up + down + left + right - 4 * old)`
    /// and returns `|new - old|`.
    pub fn update_cell(&mut self, row: usize, col: usize, coefficient: f64) -> f64 {
        debug_assert!(row >= 1 && row + 1 < self.rows, "row {} is not interior", row);
        debug_assert!(col >= 1 && col + 1 < self.cols, "col {} is not interior", col);

        let cols = self.cols;
        let (write, read) = self.split_buffers();
        let old = read[row * cols + col];
        let new = stencil(read, cols, row, col, coefficient);
        write[row * cols + col] = new;
        (new - old).abs()
    }

    /// Recompute every interior cell of `rows`, returning the largest change
    pub fn sweep_rows(&mut self, rows: Range<usize>, coefficient: f64) -> f64 {
        let cols = self.cols;
        let (write, read) = self.split_buffers();
        let band = &mut write[rows.start * cols..rows.end * cols];
        relax_band(read, band, rows, cols, coefficient)
    }

    /// Exchange the roles of the two buffers in O(1)
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Free both buffers
    pub fn release(self) {
        drop(self);
    }

    /// View used by the threads of one equilibration
    pub(crate) fn share(&mut self) -> SharedGrid<'_> {
        SharedGrid::new(self)
    }
}

/// Five-point stencil update of cell (row, col) read from `read`
#[inline]
fn stencil(read: &[f64], cols: usize, row: usize, col: usize, coefficient: f64) -> f64 {
    let idx = row * cols + col;
    let old = read[idx];
    let neighbors = read[idx - cols] + read[idx + cols] + read[idx - 1] + read[idx + 1];
    old + coefficient * (neighbors - 4.0 * old)
}

/// Relax the interior columns of `rows`
///
/// `band` holds exactly those rows of the write buffer. Returns the largest
/// absolute change observed.
fn relax_band(read: &[f64], band: &mut [f64], rows: Range<usize>, cols: usize, coefficient: f64) -> f64 {
    let mut biggest_change = 0.0f64;
    let interior_cols = 1..cols.saturating_sub(1).max(1);

    for (offset, row) in rows.enumerate() {
        let band_row = &mut band[offset * cols..(offset + 1) * cols];
        for col in interior_cols.clone() {
            let old = read[row * cols + col];
            let new = stencil(read, cols, row, col, coefficient);
            band_row[col] = new;

            let change = (new - old).abs();
            if change > biggest_change {
                biggest_change = change;
            }
        }
    }

    biggest_change
}

fn cell_count(rows: usize, cols: usize) -> Result<usize, HeatError> {
    rows.checked_mul(cols).ok_or_else(|| HeatError::Allocation {
        what: format!("grid of {}x{} cells overflows the address space", rows, cols),
    })
}

fn allocate_buffer(len: usize) -> Result<Vec<f64>, HeatError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|e| HeatError::Allocation {
        what: format!("grid buffer of {} cells: {}", len, e),
    })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

/// Scratch space for one serialized row
fn allocate_row_bytes(cols: usize) -> Result<Vec<u8>, HeatError> {
    let len = cols.checked_mul(CELL_BYTES).ok_or_else(|| HeatError::Allocation {
        what: format!("row of {} cells overflows the address space", cols),
    })?;
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len).map_err(|e| HeatError::Allocation {
        what: format!("row buffer of {} bytes: {}", len, e),
    })?;
    bytes.resize(len, 0);
    Ok(bytes)
}

fn decode_row(bytes: &[u8], cells: &mut [f64]) {
    for (cell, chunk) in cells.iter_mut().zip(bytes.chunks_exact(CELL_BYTES)) {
        let mut raw = [0u8; CELL_BYTES];
        raw.copy_from_slice(chunk);
        *cell = f64::from_le_bytes(raw);
    }
}

/// Grid view shared by the worker threads of one equilibration
///
/// Holds raw pointers to both buffers so each thread can write its own rows
/// of the current buffer while every thread reads the previous one. The
/// round protocol upholds the invariants the unsafe methods rely on:
///
/// - row bands handed to [`SharedGrid::sweep_rows`] are disjoint between threads
/// - [`SharedGrid::swap`] runs on one thread while all others wait at a barrier
///
/// Dropping the view writes the final buffer roles back into the grid.
pub(crate) struct SharedGrid<'a> {
    buffers: [*mut f64; 2],
    rows: usize,
    cols: usize,
    current: AtomicUsize,
    current_slot: &'a mut usize,
    _grid: PhantomData<&'a mut [f64]>,
}

// SAFETY: the pointers target buffers exclusively borrowed for 'a. Concurrent
// access is limited to disjoint writes and shared reads, ordered by barriers.
unsafe impl Send for SharedGrid<'_> {}
unsafe impl Sync for SharedGrid<'_> {}

impl<'a> SharedGrid<'a> {
    fn new(grid: &'a mut Grid) -> Self {
        let Grid { rows, cols, buffers, current } = grid;
        let (low, high) = buffers.split_at_mut(1);
        Self {
            buffers: [low[0].as_mut_ptr(), high[0].as_mut_ptr()],
            rows: *rows,
            cols: *cols,
            current: AtomicUsize::new(*current),
            current_slot: current,
            _grid: PhantomData,
        }
    }

    /// Relax `rows` of the current buffer from the previous one
    ///
    /// # Safety
    ///
    /// No other thread may write `rows` of the current buffer, and no thread
    /// may call [`SharedGrid::swap`], until this call returns.
    pub(crate) unsafe fn sweep_rows(&self, rows: Range<usize>, coefficient: f64) -> f64 {
        debug_assert!(rows.end <= self.rows);
        let len = self.rows * self.cols;
        let write = self.current.load(Ordering::Relaxed);

        // SAFETY: both buffers hold `len` cells for 'a; the caller guarantees
        // nobody writes the previous buffer or this band concurrently.
        let (read, band) = unsafe {
            let read = std::slice::from_raw_parts(self.buffers[1 - write] as *const f64, len);
            let band = std::slice::from_raw_parts_mut(
                self.buffers[write].add(rows.start * self.cols),
                rows.len() * self.cols,
            );
            (read, band)
        };

        relax_band(read, band, rows, self.cols, coefficient)
    }

    /// Flip the buffer roles
    ///
    /// Only the barrier-elected thread calls this, while its peers wait.
    pub(crate) fn swap(&self) {
        self.current.fetch_xor(1, Ordering::Relaxed);
    }
}

impl Drop for SharedGrid<'_> {
    fn drop(&mut self) {
        *self.current_slot = self.current.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(cells: &[f64]) -> Vec<u8> {
        cells.iter().flat_map(|c| c.to_le_bytes()).collect()
    }

    fn bordered(rows: usize, cols: usize, border: f64, interior: f64) -> Vec<f64> {
        let mut cells = vec![interior; rows * cols];
        for row in 0..rows {
            for col in 0..cols {
                if row == 0 || col == 0 || row == rows - 1 || col == cols - 1 {
                    cells[row * cols + col] = border;
                }
            }
        }
        cells
    }

    #[test]
    fn test_load_reads_row_major_cells() {
        let cells: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let mut stream = Cursor::new(encode(&cells));
        let grid = Grid::load(3, 4, &mut stream, Path::new("mem")).unwrap();

        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.cols(), 4);
        assert_eq!(grid.state(), cells.as_slice());
        assert_eq!(grid.get(2, 1), 9.0);
    }

    #[test]
    fn test_load_mirrors_borders_into_write_buffer() {
        let cells = bordered(4, 5, 7.5, 1.0);
        let grid = Grid::load(4, 5, &mut Cursor::new(encode(&cells)), Path::new("mem")).unwrap();

        let write = grid.current();
        for row in 0..4 {
            for col in 0..5 {
                let idx = row * 5 + col;
                if row == 0 || col == 0 || row == 3 || col == 4 {
                    assert_eq!(write[idx], 7.5, "border ({}, {}) not mirrored", row, col);
                } else {
                    assert_eq!(write[idx], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_load_truncated_stream_is_malformed() {
        let cells = vec![1.0; 8];
        let err = Grid::load(3, 3, &mut Cursor::new(encode(&cells)), Path::new("short.bin")).unwrap_err();
        assert!(matches!(err, HeatError::MalformedInput { .. }), "got {:?}", err);
        assert!(err.to_string().contains("short.bin"));
    }

    #[test]
    fn test_load_empty_rows_with_wide_columns_reads_nothing() {
        let grid = Grid::load(0, 1 << 61, &mut Cursor::new(Vec::new()), Path::new("empty.bin")).unwrap();
        assert!(grid.state().is_empty());
    }

    #[test]
    fn test_update_cell_applies_stencil() {
        // Center 10, neighbors 0: new = 10 + 0.25 * (0 - 40) = 0
        let cells = bordered(3, 3, 0.0, 10.0);
        let mut grid = Grid::from_cells(3, 3, cells).unwrap();
        let change = grid.update_cell(1, 1, 0.25);

        assert_eq!(grid.current()[4], 0.0);
        assert_eq!(change, 10.0);
        // Read side untouched
        assert_eq!(grid.previous()[4], 10.0);
    }

    #[test]
    fn test_update_cell_uniform_field_does_not_move() {
        let mut grid = Grid::from_cells(3, 3, vec![3.0; 9]).unwrap();
        assert_eq!(grid.update_cell(1, 1, 0.2), 0.0);
        assert_eq!(grid.current()[4], 3.0);
    }

    #[test]
    fn test_swap_twice_restores_identity() {
        let mut grid = Grid::from_cells(3, 3, vec![1.0; 9]).unwrap();
        let current = grid.current().as_ptr();
        let previous = grid.previous().as_ptr();

        grid.swap();
        assert_eq!(grid.current().as_ptr(), previous);
        assert_eq!(grid.previous().as_ptr(), current);

        grid.swap();
        assert_eq!(grid.current().as_ptr(), current);
        assert_eq!(grid.previous().as_ptr(), previous);
    }

    #[test]
    fn test_borders_survive_many_rounds() {
        let mut cells = bordered(6, 7, 0.0, 50.0);
        // Distinct border values so a wrong copy would show
        for col in 0..7 {
            cells[col] = col as f64 * 1.5;
            cells[5 * 7 + col] = -(col as f64);
        }
        for row in 0..6 {
            cells[row * 7] = 100.0 + row as f64;
            cells[row * 7 + 6] = 0.125 * row as f64;
        }
        let original = cells.clone();
        let mut grid = Grid::from_cells(6, 7, cells).unwrap();

        for _ in 0..37 {
            grid.sweep_rows(grid.interior_row_range(), 0.2);
            grid.swap();
        }

        for buffer in [grid.current(), grid.previous()] {
            for row in 0..6 {
                for col in 0..7 {
                    if row == 0 || col == 0 || row == 5 || col == 6 {
                        let idx = row * 7 + col;
                        assert_eq!(buffer[idx].to_bits(), original[idx].to_bits());
                    }
                }
            }
        }
    }

    #[test]
    fn test_sweep_matches_cell_by_cell_updates() {
        let cells: Vec<f64> = (0..30).map(|i| ((i * 7) % 11) as f64).collect();
        let mut by_sweep = Grid::from_cells(5, 6, cells.clone()).unwrap();
        let mut by_cell = Grid::from_cells(5, 6, cells).unwrap();

        let biggest = by_sweep.sweep_rows(1..4, 0.1);
        let mut expected_biggest = 0.0f64;
        for row in 1..4 {
            for col in 1..5 {
                expected_biggest = expected_biggest.max(by_cell.update_cell(row, col, 0.1));
            }
        }

        assert_eq!(by_sweep.current(), by_cell.current());
        assert_eq!(biggest, expected_biggest);
    }

    #[test]
    fn test_degenerate_grids_have_no_interior() {
        let mut thin = Grid::from_cells(2, 5, vec![1.0; 10]).unwrap();
        assert_eq!(thin.interior_rows(), 0);
        assert_eq!(thin.sweep_rows(thin.interior_row_range(), 0.25), 0.0);

        let mut narrow = Grid::from_cells(4, 2, vec![1.0; 8]).unwrap();
        assert_eq!(narrow.sweep_rows(narrow.interior_row_range(), 0.25), 0.0);

        let empty = Grid::from_cells(0, 0, Vec::new()).unwrap();
        assert!(empty.state().is_empty());
    }

    #[test]
    fn test_from_cells_rejects_wrong_length() {
        assert!(Grid::from_cells(3, 3, vec![0.0; 8]).is_err());
    }

    #[test]
    fn test_shared_view_writes_back_buffer_roles() {
        let mut grid = Grid::from_cells(4, 4, vec![2.0; 16]).unwrap();
        let before = grid.current().as_ptr();
        {
            let shared = grid.share();
            // SAFETY: single thread, no concurrent access
            unsafe {
                shared.sweep_rows(1..3, 0.25);
            }
            shared.swap();
        }
        assert_eq!(grid.previous().as_ptr(), before);
    }
}
