//! Dirty-cell tracking. The screen is overlaid with a fixed grid of cells;
//! every recorded command hashes into the cells its clipped bounds touch, and
//! cells whose hash differs from the previous frame are merged into redraw
//! rectangles.

use crate::geometry::Rect;

/// Fixed grid dimensions: 128 × 72 cells of 60 points cover a notional
/// 7680 × 4320 canvas regardless of window size.
pub const CELLS_X: usize = 128;
pub const CELLS_Y: usize = 72;
pub const CELL_SIZE: i32 = 60;

/// 32-bit FNV-1a offset basis. A previous-cell value of 0xFFFFFFFF is the
/// invalidation sentinel: it is guaranteed to differ from any accumulated
/// hash on the next diff.
pub const HASH_INITIAL: u32 = 2166136261;

/// One FNV-1a step over a byte slice, continuing from `h`.
pub fn fnv1a_update(mut h: u32, bytes: &[u8]) -> u32 {
    for &b in bytes {
        h = (h ^ b as u32).wrapping_mul(16777619);
    }
    h
}

fn cell_idx(x: usize, y: usize) -> usize {
    x + y * CELLS_X
}

/// Two parallel hash planes (current and previous frame) plus the diff/merge
/// step that turns changed cells into redraw rectangles.
pub struct CellGrid {
    cells: Vec<u32>,
    cells_prev: Vec<u32>,
}

impl Default for CellGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl CellGrid {
    pub fn new() -> Self {
        // Both planes start at the offset basis: the diff scan resets visited
        // previous cells to the same value, so accumulation always starts
        // from an identical base and byte-equal frames hash equal.
        Self {
            cells: vec![HASH_INITIAL; CELLS_X * CELLS_Y],
            cells_prev: vec![HASH_INITIAL; CELLS_X * CELLS_Y],
        }
    }

    /// Writes the sentinel across the previous plane, forcing every in-bounds
    /// cell dirty on the next diff.
    pub fn invalidate(&mut self) {
        self.cells_prev.fill(0xFFFF_FFFF);
    }

    /// Folds a command hash into every cell its rect overlaps. The range is
    /// inclusive of the cell containing the rect's far edge, and coordinates
    /// beyond the grid clamp into the last row/column.
    pub fn update_overlapping(&mut self, rect: Rect, h: u32) {
        let clamp_x = |v: i32| (v.max(0) as usize).min(CELLS_X - 1);
        let clamp_y = |v: i32| (v.max(0) as usize).min(CELLS_Y - 1);
        let x1 = clamp_x(rect.x / CELL_SIZE);
        let y1 = clamp_y(rect.y / CELL_SIZE);
        let x2 = clamp_x((rect.x + rect.width) / CELL_SIZE);
        let y2 = clamp_y((rect.y + rect.height) / CELL_SIZE);

        for y in y1..=y2 {
            for x in x1..=x2 {
                let idx = cell_idx(x, y);
                self.cells[idx] = fnv1a_update(self.cells[idx], &h.to_ne_bytes());
            }
        }
    }

    /// Compares the two planes over the cells covered by `screen` and pushes
    /// a merged rect (in cell units) for every run of changed cells. Each
    /// visited previous cell is reset to the offset basis so it can serve as
    /// the accumulation start of the next frame.
    pub fn diff(&mut self, screen: Rect, out: &mut Vec<Rect>) {
        let max_x = (screen.width / CELL_SIZE + 1).max(0).min(CELLS_X as i32) as usize;
        let max_y = (screen.height / CELL_SIZE + 1).max(0).min(CELLS_Y as i32) as usize;
        for y in 0..max_y {
            for x in 0..max_x {
                let idx = cell_idx(x, y);
                if self.cells[idx] != self.cells_prev[idx] {
                    push_rect(out, Rect::new(x as i32, y as i32, 1, 1));
                }
                self.cells_prev[idx] = HASH_INITIAL;
            }
        }
    }

    /// Swaps the planes at the end of a frame: the hashes just accumulated
    /// become the previous frame, and the reset plane becomes current.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.cells, &mut self.cells_prev);
    }
}

/// Merges a new rect into the buffer by scanning backward for any overlap;
/// quadratic in the worst case but adjacent cells collapse immediately.
fn push_rect(buf: &mut Vec<Rect>, r: Rect) {
    for stored in buf.iter_mut().rev() {
        if stored.overlaps(r) {
            *stored = stored.merge(r);
            return;
        }
    }
    buf.push(r);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vector() {
        // FNV-1a("a") with the 32-bit parameters
        assert_eq!(fnv1a_update(HASH_INITIAL, b"a"), 0xe40c292c);
    }

    #[test]
    fn equal_planes_produce_no_rects() {
        let mut grid = CellGrid::new();
        let mut rects = Vec::new();
        grid.diff(Rect::of_size(200, 100), &mut rects);
        assert!(rects.is_empty());
    }

    #[test]
    fn hashed_cell_becomes_dirty() {
        let mut grid = CellGrid::new();
        grid.update_overlapping(Rect::new(20, 30, 10, 10), 0xdeadbeef);
        let mut rects = Vec::new();
        grid.diff(Rect::of_size(200, 100), &mut rects);
        assert_eq!(rects, vec![Rect::new(0, 0, 1, 1)]);
    }

    #[test]
    fn sentinel_forces_redraw_of_untouched_cells() {
        let mut grid = CellGrid::new();
        grid.invalidate();
        let mut rects = Vec::new();
        grid.diff(Rect::of_size(70, 70), &mut rects);
        // 2×2 in-bounds cells, adjacent, merged into one
        assert_eq!(rects, vec![Rect::new(0, 0, 2, 2)]);
    }

    #[test]
    fn identical_frames_settle_after_swap() {
        let mut grid = CellGrid::new();
        let screen = Rect::of_size(200, 100);
        let draw = |grid: &mut CellGrid| {
            grid.update_overlapping(Rect::new(20, 30, 10, 10), 42);
        };

        draw(&mut grid);
        let mut first = Vec::new();
        grid.diff(screen, &mut first);
        grid.swap();
        assert_eq!(first.len(), 1);

        draw(&mut grid);
        let mut second = Vec::new();
        grid.diff(screen, &mut second);
        grid.swap();
        assert!(second.is_empty());
    }

    #[test]
    fn adjacent_cells_merge() {
        let mut grid = CellGrid::new();
        grid.update_overlapping(Rect::new(0, 0, 150, 50), 7);
        let mut rects = Vec::new();
        grid.diff(Rect::of_size(400, 100), &mut rects);
        assert_eq!(rects, vec![Rect::new(0, 0, 3, 1)]);
    }

    #[test]
    fn far_coordinates_clamp_into_the_grid() {
        let mut grid = CellGrid::new();
        grid.update_overlapping(Rect::new(1_000_000, 1_000_000, 10, 10), 9);
        // no panic; the hash landed in the last cell
        assert_ne!(grid.cells[cell_idx(CELLS_X - 1, CELLS_Y - 1)], HASH_INITIAL);
    }
}
