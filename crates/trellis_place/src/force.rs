//! Connectivity-driven force accumulation.
//!
//! Sums the pull of every connection incident on a node (or cluster) into a
//! single suggested displacement. Contributions are also bucketed by angular
//! octant — the four axis directions get their own buckets, diagonal pulls
//! share a quadrant bucket — and a bucket holding a strict majority of the
//! contributions overrides the global mean. Contributions that correspond to
//! exact bounding-box abutment, and contributions from power/ground nets,
//! snap the result onto the recorded exact displacement so near-misses from
//! accumulated float error do not leave hairline gaps.

use trellis_common::{Point, Rect};

/// A majority octant wins when `bucket_count * OCTANT_MAJORITY_DIVISOR`
/// exceeds the total contribution count — "more than half". Deliberate
/// heuristic tie-break, not incidental.
pub const OCTANT_MAJORITY_DIVISOR: usize = 2;

/// Tolerance for "perfectly aligned" bounding-box edges.
///
/// Coordinates are f64 in cell-size units; anything below this is float
/// noise from orientation transforms, not geometry.
pub const ALIGNMENT_EPSILON: f64 = 1e-6;

const OCTANTS: usize = 8;

/// Accumulates connection pulls on one node and resolves them into a single
/// suggested displacement.
#[derive(Debug)]
pub struct ForceAccumulator {
    sum: (f64, f64),
    count: usize,
    octant_sums: [(f64, f64); OCTANTS],
    octant_counts: [usize; OCTANTS],
    exact: Vec<(f64, f64)>,
}

impl ForceAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self {
            sum: (0.0, 0.0),
            count: 0,
            octant_sums: [(0.0, 0.0); OCTANTS],
            octant_counts: [0; OCTANTS],
            exact: Vec::new(),
        }
    }

    /// Number of contributions added so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Adds one connection: the pull from this node's port at `from` toward
    /// the other endpoint's port at `to`. `from_bounds`/`to_bounds` are the
    /// two nodes' bounding boxes, used to detect exact abutment; `is_supply`
    /// marks power/ground nets.
    pub fn add(&mut self, from: Point, to: Point, from_bounds: Rect, to_bounds: Rect, is_supply: bool) {
        let dx = to.x - from.x;
        let dy = to.y - from.y;

        self.sum.0 += dx;
        self.sum.1 += dy;
        self.count += 1;

        if let Some(octant) = octant_of(dx, dy) {
            self.octant_sums[octant].0 += dx;
            self.octant_sums[octant].1 += dy;
            self.octant_counts[octant] += 1;
        }

        if is_supply || aligns_exactly(&from_bounds.translated(dx, dy), &to_bounds) {
            self.exact.push((dx, dy));
        }
    }

    /// Resolves the accumulated contributions into a displacement.
    pub fn resolve(&self) -> (f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        let mut force = (self.sum.0 / self.count as f64, self.sum.1 / self.count as f64);

        if self.count > 1 {
            let (major, major_count) = self
                .octant_counts
                .iter()
                .copied()
                .enumerate()
                .max_by_key(|&(_, c)| c)
                .unwrap_or((0, 0));
            if major_count * OCTANT_MAJORITY_DIVISOR > self.count {
                force = (
                    self.octant_sums[major].0 / major_count as f64,
                    self.octant_sums[major].1 / major_count as f64,
                );
            }
        }

        if let Some(snap) = self.nearest_exact(force) {
            return snap;
        }
        force
    }

    fn nearest_exact(&self, force: (f64, f64)) -> Option<(f64, f64)> {
        self.exact
            .iter()
            .copied()
            .min_by(|a, b| {
                let da = (a.0 - force.0).powi(2) + (a.1 - force.1).powi(2);
                let db = (b.0 - force.0).powi(2) + (b.1 - force.1).powi(2);
                da.total_cmp(&db)
            })
    }
}

impl Default for ForceAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Buckets a pull vector: axis pulls get octants 0-3 (E, N, W, S), diagonal
/// pulls share their quadrant (4-7). Zero vectors bucket nowhere.
fn octant_of(dx: f64, dy: f64) -> Option<usize> {
    match (dx == 0.0, dy == 0.0) {
        (true, true) => None,
        (false, true) => Some(if dx > 0.0 { 0 } else { 2 }),
        (true, false) => Some(if dy > 0.0 { 1 } else { 3 }),
        (false, false) => Some(match (dx > 0.0, dy > 0.0) {
            (true, true) => 4,
            (false, true) => 5,
            (false, false) => 6,
            (true, false) => 7,
        }),
    }
}

/// Returns `true` if any edge of `a` exactly aligns with the corresponding
/// or opposing edge of `b`.
fn aligns_exactly(a: &Rect, b: &Rect) -> bool {
    let pairs = [
        (a.min_x, b.max_x),
        (a.max_x, b.min_x),
        (a.min_x, b.min_x),
        (a.max_x, b.max_x),
        (a.min_y, b.max_y),
        (a.max_y, b.min_y),
        (a.min_y, b.min_y),
        (a.max_y, b.max_y),
    ];
    pairs.iter().any(|&(x, y)| (x - y).abs() < ALIGNMENT_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_rect(cx: f64, cy: f64) -> Rect {
        Rect::from_center(cx, cy, 1000.0, 1000.0)
    }

    fn far_rect() -> Rect {
        // Bounds that never align with anything under test displacements
        Rect::new(1e7, 1e7, 1e7 + 0.123, 1e7 + 0.456)
    }

    #[test]
    fn empty_accumulator_is_zero() {
        let acc = ForceAccumulator::new();
        assert_eq!(acc.resolve(), (0.0, 0.0));
        assert_eq!(acc.count(), 0);
    }

    #[test]
    fn single_pull_is_its_own_mean() {
        let mut acc = ForceAccumulator::new();
        acc.add(
            Point::new(0.0, 0.0),
            Point::new(10.0, 4.0),
            far_rect(),
            Rect::new(0.0, 0.0, 0.111, 0.222),
            false,
        );
        assert_eq!(acc.resolve(), (10.0, 4.0));
    }

    #[test]
    fn mean_of_opposing_pulls() {
        let mut acc = ForceAccumulator::new();
        acc.add(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            far_rect(),
            Rect::new(0.3, 0.0, 0.4, 0.1),
            false,
        );
        acc.add(
            Point::new(0.0, 0.0),
            Point::new(-6.0, 0.0),
            far_rect(),
            Rect::new(0.3, 0.5, 0.4, 0.6),
            false,
        );
        // Opposite axis pulls: no majority octant, plain mean
        assert_eq!(acc.resolve(), (2.0, 0.0));
    }

    #[test]
    fn majority_octant_overrides_mean() {
        let mut acc = ForceAccumulator::new();
        // Two pulls east, one pull north: east holds 2 of 3 > half.
        for to_x in [10.0, 20.0] {
            acc.add(
                Point::new(0.0, 0.0),
                Point::new(to_x, 0.0),
                far_rect(),
                Rect::new(0.3, 0.0, 0.4, 0.1),
                false,
            );
        }
        acc.add(
            Point::new(0.0, 0.0),
            Point::new(0.0, 9.0),
            far_rect(),
            Rect::new(0.3, 0.5, 0.4, 0.6),
            false,
        );
        // East-octant mean is (15, 0), not the global mean (10, 3)
        assert_eq!(acc.resolve(), (15.0, 0.0));
    }

    #[test]
    fn no_majority_keeps_global_mean() {
        let mut acc = ForceAccumulator::new();
        let targets = [(10.0, 0.0), (0.0, 10.0), (-10.0, 0.0), (0.0, -6.0)];
        for (x, y) in targets {
            acc.add(
                Point::new(0.0, 0.0),
                Point::new(x, y),
                far_rect(),
                Rect::new(50.5, 50.5, 51.0, 51.0),
                false,
            );
        }
        assert_eq!(acc.resolve(), (0.0, 1.0));
    }

    #[test]
    fn supply_net_snaps_to_exact() {
        let mut acc = ForceAccumulator::new();
        acc.add(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            far_rect(),
            Rect::new(0.3, 0.0, 0.4, 0.1),
            true,
        );
        acc.add(
            Point::new(0.0, 0.0),
            Point::new(13.0, 2.0),
            far_rect(),
            Rect::new(0.3, 0.5, 0.4, 0.6),
            false,
        );
        // Mean is (11.5, 1.0); the supply contribution (10, 0) wins
        assert_eq!(acc.resolve(), (10.0, 0.0));
    }

    #[test]
    fn abutment_snaps_to_exact() {
        let mut acc = ForceAccumulator::new();
        // Displacing by the pull vector lands the boxes edge-to-edge.
        acc.add(
            Point::new(5.0, 0.0),
            Point::new(15.0, 0.0),
            unit_rect(0.0, 0.0),   // max_x = 500; translated +10 -> 510
            unit_rect(1010.0, 0.0), // min_x = 510: exact alignment
            false,
        );
        acc.add(
            Point::new(5.0, 0.0),
            Point::new(18.0, 3.0),
            unit_rect(0.0, 0.0),
            far_rect(),
            false,
        );
        assert_eq!(acc.resolve(), (10.0, 0.0));
    }

    #[test]
    fn octant_classification() {
        assert_eq!(octant_of(1.0, 0.0), Some(0));
        assert_eq!(octant_of(0.0, 1.0), Some(1));
        assert_eq!(octant_of(-1.0, 0.0), Some(2));
        assert_eq!(octant_of(0.0, -1.0), Some(3));
        assert_eq!(octant_of(1.0, 1.0), Some(4));
        assert_eq!(octant_of(-1.0, 1.0), Some(5));
        assert_eq!(octant_of(-1.0, -1.0), Some(6));
        assert_eq!(octant_of(1.0, -1.0), Some(7));
        assert_eq!(octant_of(0.0, 0.0), None);
    }

    #[test]
    fn alignment_uses_epsilon() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0 + ALIGNMENT_EPSILON / 2.0, 0.0, 20.0, 10.0);
        assert!(aligns_exactly(&a, &b));
        let c = Rect::new(10.1, 0.3, 20.0, 10.7);
        assert!(!aligns_exactly(&a.translated(0.05, 0.11), &c));
    }
}
