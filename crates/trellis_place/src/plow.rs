//! The plow resolver: displaces blockers out of the way of a moving entry.
//!
//! Given an entry requested to move by `(dx, dy)`, plowing produces a
//! conflict-free arrangement by pushing overlapping neighbors just far
//! enough to clear, recursively. The recursion is realized as an explicit
//! worklist so depth stays bounded on dense layouts, with the forbidden
//! direction set carried per entry: each displacement forbids its blockers
//! from moving back toward the mover, and forbidden sets only grow along a
//! displacement chain. A failed plow restores every rectangle it touched —
//! the caller never sees a partially applied move.

use crate::spatial::SpatialIndex;
use std::collections::HashMap;
use std::hash::Hash;
use trellis_common::{InternalError, Rect, TrellisResult};

/// Direction bit: motion toward negative X.
pub const LEFT: u8 = 1;
/// Direction bit: motion toward positive X.
pub const RIGHT: u8 = 2;
/// Direction bit: motion toward negative Y.
pub const DOWN: u8 = 4;
/// Direction bit: motion toward positive Y.
pub const UP: u8 = 8;

/// The directions a blocker may not take after its mover traveled `(dx, dy)`:
/// everything pointing back toward where the mover came from.
fn opposite_mask(dx: f64, dy: f64) -> u8 {
    let mut mask = 0;
    if dx > 0.0 {
        mask |= LEFT;
    }
    if dx < 0.0 {
        mask |= RIGHT;
    }
    if dy > 0.0 {
        mask |= DOWN;
    }
    if dy < 0.0 {
        mask |= UP;
    }
    mask
}

/// Moves `target` by `(dx, dy)` in the index, plowing blockers aside.
///
/// On success the index holds the conflict-free result and the final
/// rectangle of every entry that moved is returned (the target included).
/// `Ok(None)` means the move is infeasible; the index is restored exactly
/// and the caller must treat the move as rejected. `Err` means the plow
/// broke one of its own invariants.
///
/// `is_fixed` marks entries that may never move; a motion that would newly
/// intersect a fixed entry is not considered, and a fixed blocker rejects
/// the whole plow.
pub fn plow<P: Copy + Eq + Hash>(
    index: &mut SpatialIndex<P>,
    is_fixed: impl Fn(P) -> bool,
    target: P,
    dx: f64,
    dy: f64,
) -> TrellisResult<Option<Vec<(P, Rect)>>> {
    let Some(start) = index.rect_of(target) else {
        return Ok(None);
    };

    // Original rects in move order; doubles as the rollback journal.
    let mut journal: Vec<(P, Rect)> = vec![(target, start)];
    let mut forbidden: HashMap<P, u8> = HashMap::new();
    let mut motion: HashMap<P, (f64, f64)> = HashMap::new();

    index.relocate(target, start.translated(dx, dy));
    forbidden.insert(target, 0);
    motion.insert(target, (dx, dy));

    let mut pending = vec![target];
    let mut displacements = 0usize;
    // Each displacement strictly reduces overlap along one axis under a
    // shrinking direction set, so the count is bounded; breaching this cap
    // means that invariant no longer holds.
    let limit = 16 * index.len().max(4) + 64;

    while let Some(p) = pending.pop() {
        loop {
            let Some(prect) = index.rect_of(p) else {
                rollback(index, &journal);
                return Err(InternalError::new("plow", "tracked entry vanished from the index"));
            };
            let blockers = index.query_overlapping(&prect);
            let Some(&b) = blockers.iter().find(|&&other| other != p) else {
                break;
            };
            if is_fixed(b) {
                rollback(index, &journal);
                return Ok(None);
            }
            displacements += 1;
            if displacements > limit {
                rollback(index, &journal);
                return Err(InternalError::new(
                    "plow",
                    format!("displacement cap of {limit} exceeded"),
                ));
            }

            let (pdx, pdy) = motion.get(&p).copied().unwrap_or((0.0, 0.0));
            let inherited = forbidden.get(&p).copied().unwrap_or(0) | opposite_mask(pdx, pdy);
            let mask = inherited | forbidden.get(&b).copied().unwrap_or(0);
            let Some(brect) = index.rect_of(b) else {
                rollback(index, &journal);
                return Err(InternalError::new("plow", "blocker vanished from the index"));
            };

            // Four candidate motions: clear the mover just barely, in each
            // still-allowed direction.
            let candidates = [
                (LEFT, prect.min_x - brect.max_x, 0.0),
                (RIGHT, prect.max_x - brect.min_x, 0.0),
                (DOWN, 0.0, prect.min_y - brect.max_y),
                (UP, 0.0, prect.max_y - brect.min_y),
            ];

            let mut best: Option<(f64, f64, f64)> = None;
            for (dir, mx, my) in candidates {
                if mask & dir != 0 {
                    continue;
                }
                let moved = brect.translated(mx, my);
                if hits_fixed(index, &is_fixed, b, &moved) {
                    continue;
                }
                let magnitude = mx.abs() + my.abs();
                if best.is_none_or(|(_, _, m)| magnitude < m) {
                    best = Some((mx, my, magnitude));
                }
            }

            let Some((mx, my, _)) = best else {
                rollback(index, &journal);
                return Ok(None);
            };

            if !forbidden.contains_key(&b) {
                journal.push((b, brect));
            }
            index.relocate(b, brect.translated(mx, my));
            forbidden.insert(b, mask);
            motion.insert(b, (mx, my));
            pending.push(b);
            // Re-query from p's bounds: other blockers may remain or may
            // have shifted.
        }

        if pending.is_empty() {
            // Late displacements can reopen conflicts with entries cleared
            // earlier; re-verify everything that moved.
            for &(moved, _) in &journal {
                if let Some(rect) = index.rect_of(moved) {
                    if index
                        .query_overlapping(&rect)
                        .iter()
                        .any(|&other| other != moved)
                    {
                        pending.push(moved);
                    }
                }
            }
        }
    }

    let mut result = Vec::with_capacity(journal.len());
    for &(moved, _) in &journal {
        let rect = index
            .rect_of(moved)
            .ok_or_else(|| InternalError::new("plow", "journal entry vanished from the index"))?;
        result.push((moved, rect));
    }
    Ok(Some(result))
}

/// The `blocks_fixed` predicate: would placing `entry` at `rect` intersect a
/// fixed entry it must not displace?
fn hits_fixed<P: Copy + Eq + Hash>(
    index: &SpatialIndex<P>,
    is_fixed: &impl Fn(P) -> bool,
    entry: P,
    rect: &Rect,
) -> bool {
    index
        .query_overlapping(rect)
        .iter()
        .any(|&other| other != entry && is_fixed(other))
}

fn rollback<P: Copy + Eq + Hash>(index: &mut SpatialIndex<P>, journal: &[(P, Rect)]) {
    for &(entry, rect) in journal.iter().rev() {
        index.relocate(entry, rect);
    }
}
