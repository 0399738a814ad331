//! The eight rigid orientations of a rectangular cell.
//!
//! [`Orientation`] is the dihedral group of the rectangle: four rotations and
//! four mirrored rotations. Orientations transform port offsets measured from
//! the cell center; the 90/270-degree variants swap the cell's width and
//! height.

use serde::{Deserialize, Serialize};

/// One of the eight rigid transforms a placed cell can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// Identity.
    #[default]
    R0,
    /// Rotated 90 degrees counter-clockwise.
    R90,
    /// Rotated 180 degrees.
    R180,
    /// Rotated 270 degrees counter-clockwise.
    R270,
    /// Mirrored about the X axis (Y offsets negate).
    MirrorX,
    /// Mirrored about the Y axis (X offsets negate).
    MirrorY,
    /// Mirrored about the X axis, then rotated 90 degrees.
    MirrorX90,
    /// Mirrored about the Y axis, then rotated 90 degrees.
    MirrorY90,
}

impl Orientation {
    /// All eight orientations.
    pub const ALL: [Orientation; 8] = [
        Orientation::R0,
        Orientation::R90,
        Orientation::R180,
        Orientation::R270,
        Orientation::MirrorX,
        Orientation::MirrorY,
        Orientation::MirrorX90,
        Orientation::MirrorY90,
    ];

    /// The orientation trials evaluated during cluster merging when cell
    /// rotation is disallowed.
    pub const UPRIGHT: [Orientation; 4] = [
        Orientation::R0,
        Orientation::MirrorX,
        Orientation::MirrorY,
        Orientation::R180,
    ];

    /// The additional trials enabled by the allow-rotation flag.
    pub const ROTATED: [Orientation; 2] = [Orientation::R90, Orientation::R270];

    /// The 2x2 integer transform matrix `[a, b, c, d]` mapping an offset
    /// `(x, y)` to `(a*x + b*y, c*x + d*y)`.
    fn matrix(self) -> [i8; 4] {
        match self {
            Orientation::R0 => [1, 0, 0, 1],
            Orientation::R90 => [0, -1, 1, 0],
            Orientation::R180 => [-1, 0, 0, -1],
            Orientation::R270 => [0, 1, -1, 0],
            Orientation::MirrorX => [1, 0, 0, -1],
            Orientation::MirrorY => [-1, 0, 0, 1],
            Orientation::MirrorX90 => [0, 1, 1, 0],
            Orientation::MirrorY90 => [0, -1, -1, 0],
        }
    }

    fn from_matrix(m: [i8; 4]) -> Orientation {
        for o in Orientation::ALL {
            if o.matrix() == m {
                return o;
            }
        }
        unreachable!("every product of orientation matrices is an orientation matrix")
    }

    /// Applies this orientation to an offset measured from the cell center.
    pub fn apply(self, dx: f64, dy: f64) -> (f64, f64) {
        let [a, b, c, d] = self.matrix();
        (
            a as f64 * dx + b as f64 * dy,
            c as f64 * dx + d as f64 * dy,
        )
    }

    /// Returns `true` if this orientation swaps the cell's width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::R90
                | Orientation::R270
                | Orientation::MirrorX90
                | Orientation::MirrorY90
        )
    }

    /// The orientation equivalent to applying `self` first, then `next`.
    pub fn then(self, next: Orientation) -> Orientation {
        let s = self.matrix();
        let n = next.matrix();
        // n * s
        Orientation::from_matrix([
            n[0] * s[0] + n[1] * s[2],
            n[0] * s[1] + n[1] * s[3],
            n[2] * s[0] + n[3] * s[2],
            n[2] * s[1] + n[3] * s[3],
        ])
    }
}
