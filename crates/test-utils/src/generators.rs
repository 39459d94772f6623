//! Test data generators for synthetic grids.
//!
//! Every generator is deterministic and returns row-major `Vec<f64>` values
//! so results can be checked cell by cell.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that tiles are read and written to the
/// right place by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::index_grid;
///
/// let grid = index_grid(5, 10);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0);  // row=0, col=1
/// assert_eq!(grid[10], 1.0);    // row=1, col=0
/// ```
pub fn index_grid(rows: usize, cols: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Creates a grid with temperature-like values in Kelvin.
///
/// Values run from 250K at the top-left corner towards 310K at the
/// bottom-right.
pub fn temperature_grid(rows: usize, cols: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let x_factor = col as f64 / cols.max(1) as f64;
            let y_factor = row as f64 / rows.max(1) as f64;
            data.push(250.0 + x_factor * 30.0 + y_factor * 30.0);
        }
    }
    data
}

/// Creates a grid with wind speed values in m/s.
///
/// Calm in the centre, up to 50 m/s at the corners.
pub fn wind_speed_grid(rows: usize, cols: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(rows * cols);
    let center_x = cols as f64 / 2.0;
    let center_y = rows as f64 / 2.0;
    let max_dist = (center_x * center_x + center_y * center_y).sqrt().max(f64::MIN_POSITIVE);

    for row in 0..rows {
        for col in 0..cols {
            let dx = col as f64 - center_x;
            let dy = row as f64 - center_y;
            data.push((dx * dx + dy * dy).sqrt() / max_dist * 50.0);
        }
    }
    data
}

/// Creates a sparse precipitation-like grid in mm.
///
/// About a quarter of the cells are wet, with amounts up to 50 mm in
/// 0.01 mm steps. The same seed always gives the same grid.
pub fn precipitation_grid(rows: usize, cols: usize, seed: u32) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(u64::from(seed));
    (0..rows * cols)
        .map(|_| {
            if rng.gen_bool(0.25) {
                f64::from(rng.gen_range(0..5000u32)) / 100.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Creates a grid filled with a constant value.
pub fn constant_grid(rows: usize, cols: usize, value: f64) -> Vec<f64> {
    vec![value; rows * cols]
}

/// Replaces the cells at `(row, col)` with NaN. Positions outside the grid
/// are ignored.
pub fn with_gaps(mut data: Vec<f64>, cols: usize, gaps: &[(usize, usize)]) -> Vec<f64> {
    for &(row, col) in gaps {
        if col < cols {
            if let Some(cell) = data.get_mut(row * cols + col) {
                *cell = f64::NAN;
            }
        }
    }
    data
}

/// Every `step`-th cell of a `rows x cols` grid, as `(row, col)` pairs.
pub fn every_nth_cell(rows: usize, cols: usize, step: usize) -> Vec<(usize, usize)> {
    (0..rows * cols)
        .step_by(step.max(1))
        .map(|i| (i / cols, i % cols))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_grid() {
        let grid = index_grid(5, 10);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[11], 1001.0);
    }

    #[test]
    fn test_temperature_grid_range() {
        let grid = temperature_grid(100, 100);
        let min = grid.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = grid.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(min >= 250.0);
        assert!(max <= 310.0);
    }

    #[test]
    fn test_wind_speed_grid() {
        let grid = wind_speed_grid(100, 100);
        assert!(grid[50 * 100 + 50] < 5.0);
        assert!(grid[0] > 30.0);
    }

    #[test]
    fn test_precipitation_deterministic() {
        let grid1 = precipitation_grid(50, 50, 42);
        assert_eq!(grid1, precipitation_grid(50, 50, 42));
        assert_ne!(grid1, precipitation_grid(50, 50, 43));

        let wet = grid1.iter().filter(|&&v| v > 0.0).count();
        assert!((400..900).contains(&wet), "{wet} wet cells");
        assert!(grid1.iter().all(|&v| (0.0..50.0).contains(&v)));
    }

    #[test]
    fn test_with_gaps() {
        let grid = with_gaps(constant_grid(10, 10, 1.0), 10, &[(5, 5), (0, 0), (10, 0)]);
        assert!(grid[0].is_nan());
        assert!(grid[55].is_nan());
        assert_eq!(grid.iter().filter(|v| v.is_nan()).count(), 2);
    }

    #[test]
    fn test_every_nth_cell() {
        assert_eq!(every_nth_cell(2, 3, 2), vec![(0, 0), (0, 2), (1, 1)]);
    }
}
