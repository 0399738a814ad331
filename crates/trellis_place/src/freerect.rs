//! Maximal free-rectangle extraction.
//!
//! Given a boundary rectangle and a set of occupied rectangles, produces a
//! set of (possibly mutually overlapping) maximal rectangles whose union is
//! exactly the boundary minus the occupied area. The compaction pass uses
//! these as candidate destinations for boundary nodes.
//!
//! Works on the compressed coordinate grid induced by the rectangle edges:
//! every free grid cell is grown into the largest rectangle reachable by
//! widening first and by heightening first, and the results are pruned of
//! rectangles wholly contained in a larger one.

use trellis_common::Rect;

/// Returns the maximal free rectangles of `boundary` minus `occupied`.
///
/// Occupied rectangles are clipped to the boundary; rectangles entirely
/// outside are ignored. Returns the whole boundary when nothing occupies it
/// and an empty set when the boundary is fully covered.
pub fn free_rectangles(boundary: Rect, occupied: &[Rect]) -> Vec<Rect> {
    let grid = Grid::build(boundary, occupied);
    if grid.xs.len() < 2 || grid.ys.len() < 2 {
        return Vec::new();
    }

    let mut found: Vec<Rect> = Vec::new();
    for j in 0..grid.rows() {
        for i in 0..grid.cols() {
            if grid.blocked(i, j) {
                continue;
            }
            for rect in [grid.grow_wide(i, j), grid.grow_tall(i, j)] {
                if rect.area() > 0.0 && !found.contains(&rect) {
                    found.push(rect);
                }
            }
        }
    }

    // Containment prune: anything wholly inside a larger rectangle is noise.
    found.sort_by(|a, b| b.area().total_cmp(&a.area()));
    let mut kept: Vec<Rect> = Vec::new();
    for rect in found {
        if !kept.iter().any(|k| k.contains_rect(&rect)) {
            kept.push(rect);
        }
    }
    kept
}

/// The compressed coordinate grid over a boundary and its obstacles.
struct Grid {
    xs: Vec<f64>,
    ys: Vec<f64>,
    // row-major, true = covered by an obstacle
    cells: Vec<bool>,
}

impl Grid {
    fn build(boundary: Rect, occupied: &[Rect]) -> Self {
        let clipped: Vec<Rect> = occupied
            .iter()
            .filter(|r| r.overlaps(&boundary))
            .map(|r| {
                Rect::new(
                    r.min_x.max(boundary.min_x),
                    r.min_y.max(boundary.min_y),
                    r.max_x.min(boundary.max_x),
                    r.max_y.min(boundary.max_y),
                )
            })
            .collect();

        let mut xs = vec![boundary.min_x, boundary.max_x];
        let mut ys = vec![boundary.min_y, boundary.max_y];
        for r in &clipped {
            xs.push(r.min_x);
            xs.push(r.max_x);
            ys.push(r.min_y);
            ys.push(r.max_y);
        }
        xs.sort_by(f64::total_cmp);
        xs.dedup();
        ys.sort_by(f64::total_cmp);
        ys.dedup();

        let cols = xs.len() - 1;
        let rows = ys.len() - 1;
        let mut cells = vec![false; cols * rows];
        for j in 0..rows {
            for i in 0..cols {
                let cx = (xs[i] + xs[i + 1]) / 2.0;
                let cy = (ys[j] + ys[j + 1]) / 2.0;
                if clipped
                    .iter()
                    .any(|r| cx > r.min_x && cx < r.max_x && cy > r.min_y && cy < r.max_y)
                {
                    cells[j * cols + i] = true;
                }
            }
        }
        Self { xs, ys, cells }
    }

    fn cols(&self) -> usize {
        self.xs.len() - 1
    }

    fn rows(&self) -> usize {
        self.ys.len() - 1
    }

    fn blocked(&self, i: usize, j: usize) -> bool {
        self.cells[j * self.cols() + i]
    }

    fn row_free(&self, i0: usize, i1: usize, j: usize) -> bool {
        (i0..=i1).all(|i| !self.blocked(i, j))
    }

    fn col_free(&self, i: usize, j0: usize, j1: usize) -> bool {
        (j0..=j1).all(|j| !self.blocked(i, j))
    }

    /// Widest free span through `(i, j)`, then as tall as that span allows.
    fn grow_wide(&self, i: usize, j: usize) -> Rect {
        let mut i0 = i;
        while i0 > 0 && !self.blocked(i0 - 1, j) {
            i0 -= 1;
        }
        let mut i1 = i;
        while i1 + 1 < self.cols() && !self.blocked(i1 + 1, j) {
            i1 += 1;
        }
        let mut j0 = j;
        while j0 > 0 && self.row_free(i0, i1, j0 - 1) {
            j0 -= 1;
        }
        let mut j1 = j;
        while j1 + 1 < self.rows() && self.row_free(i0, i1, j1 + 1) {
            j1 += 1;
        }
        self.rect(i0, j0, i1, j1)
    }

    /// Tallest free span through `(i, j)`, then as wide as that span allows.
    fn grow_tall(&self, i: usize, j: usize) -> Rect {
        let mut j0 = j;
        while j0 > 0 && !self.blocked(i, j0 - 1) {
            j0 -= 1;
        }
        let mut j1 = j;
        while j1 + 1 < self.rows() && !self.blocked(i, j1 + 1) {
            j1 += 1;
        }
        let mut i0 = i;
        while i0 > 0 && self.col_free(i0 - 1, j0, j1) {
            i0 -= 1;
        }
        let mut i1 = i;
        while i1 + 1 < self.cols() && self.col_free(i1 + 1, j0, j1) {
            i1 += 1;
        }
        self.rect(i0, j0, i1, j1)
    }

    fn rect(&self, i0: usize, j0: usize, i1: usize, j1: usize) -> Rect {
        Rect::new(self.xs[i0], self.ys[j0], self.xs[i1 + 1], self.ys[j1 + 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Union area of a rectangle set, measured on its own compressed grid.
    fn union_area(rects: &[Rect]) -> f64 {
        let mut xs: Vec<f64> = rects.iter().flat_map(|r| [r.min_x, r.max_x]).collect();
        let mut ys: Vec<f64> = rects.iter().flat_map(|r| [r.min_y, r.max_y]).collect();
        xs.sort_by(f64::total_cmp);
        xs.dedup();
        ys.sort_by(f64::total_cmp);
        ys.dedup();
        let mut area = 0.0;
        for j in 0..ys.len().saturating_sub(1) {
            for i in 0..xs.len().saturating_sub(1) {
                let cx = (xs[i] + xs[i + 1]) / 2.0;
                let cy = (ys[j] + ys[j + 1]) / 2.0;
                if rects
                    .iter()
                    .any(|r| cx > r.min_x && cx < r.max_x && cy > r.min_y && cy < r.max_y)
                {
                    area += (xs[i + 1] - xs[i]) * (ys[j + 1] - ys[j]);
                }
            }
        }
        area
    }

    #[test]
    fn empty_obstacles_yield_whole_boundary() {
        let boundary = Rect::new(0.0, 0.0, 20.0, 20.0);
        assert_eq!(free_rectangles(boundary, &[]), vec![boundary]);
    }

    #[test]
    fn fully_occupied_yields_nothing() {
        let boundary = Rect::new(0.0, 0.0, 20.0, 20.0);
        assert!(free_rectangles(boundary, &[boundary]).is_empty());
    }

    #[test]
    fn centered_obstacle_union_area() {
        let boundary = Rect::new(0.0, 0.0, 20.0, 20.0);
        let occupied = [Rect::new(5.0, 5.0, 10.0, 10.0)];
        let free = free_rectangles(boundary, &occupied);

        assert!((union_area(&free) - 300.0).abs() < 1e-9);
        for f in &free {
            assert!(!f.overlaps(&occupied[0]));
        }
        // The four maximal strips around the obstacle.
        assert!(free.contains(&Rect::new(0.0, 0.0, 5.0, 20.0)));
        assert!(free.contains(&Rect::new(10.0, 0.0, 20.0, 20.0)));
        assert!(free.contains(&Rect::new(0.0, 0.0, 20.0, 5.0)));
        assert!(free.contains(&Rect::new(0.0, 10.0, 20.0, 20.0)));
    }

    #[test]
    fn coverage_with_multiple_obstacles() {
        let boundary = Rect::new(0.0, 0.0, 30.0, 30.0);
        let occupied = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(20.0, 20.0, 30.0, 30.0),
            Rect::new(12.0, 4.0, 18.0, 26.0),
        ];
        let free = free_rectangles(boundary, &occupied);

        let occupied_area: f64 = occupied.iter().map(Rect::area).sum();
        assert!((union_area(&free) - (boundary.area() - occupied_area)).abs() < 1e-9);
        for f in &free {
            for o in &occupied {
                assert!(!f.overlaps(o), "{f:?} overlaps {o:?}");
            }
        }
    }

    #[test]
    fn no_returned_rect_is_contained_in_another() {
        let boundary = Rect::new(0.0, 0.0, 30.0, 30.0);
        let occupied = [
            Rect::new(5.0, 5.0, 10.0, 10.0),
            Rect::new(18.0, 12.0, 25.0, 22.0),
        ];
        let free = free_rectangles(boundary, &occupied);
        for (i, a) in free.iter().enumerate() {
            for (k, b) in free.iter().enumerate() {
                if i != k {
                    assert!(!b.contains_rect(a));
                }
            }
        }
    }

    #[test]
    fn obstacles_outside_boundary_are_ignored() {
        let boundary = Rect::new(0.0, 0.0, 10.0, 10.0);
        let occupied = [Rect::new(50.0, 50.0, 60.0, 60.0)];
        assert_eq!(free_rectangles(boundary, &occupied), vec![boundary]);
    }

    #[test]
    fn obstacle_straddling_boundary_is_clipped() {
        let boundary = Rect::new(0.0, 0.0, 10.0, 10.0);
        let occupied = [Rect::new(5.0, -5.0, 15.0, 15.0)];
        let free = free_rectangles(boundary, &occupied);
        assert_eq!(free, vec![Rect::new(0.0, 0.0, 5.0, 10.0)]);
    }
}
