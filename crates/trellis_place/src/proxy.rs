//! Mutable shadow state for nodes during placement.
//!
//! A [`ProxyNode`] decouples the engine's working position/orientation from
//! the immutable input [`Node`](trellis_netlist::Node). Besides its current
//! fields it carries a *proposed* shadow copy for speculative evaluation
//! before commit, and a *saved* copy for rolling back multi-step trial
//! sequences. [`Cluster`] groups proxies and caches their even-grid-snapped
//! bounding rectangle.

use serde::{Deserialize, Serialize};
use trellis_common::{NodeId, Orientation, Point, ProxyId, Rect};
use trellis_netlist::{Netlist, Node};

/// The positional fields of a proxy that proposals and saves shadow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProxyFields {
    /// Center X.
    pub x: f64,
    /// Center Y.
    pub y: f64,
    /// Cumulative orientation relative to the node's unoriented footprint.
    pub orientation: Orientation,
    /// Current footprint width (swapped on 90/270 orientations).
    pub width: f64,
    /// Current footprint height.
    pub height: f64,
}

/// The engine's mutable shadow of one input node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyNode {
    /// The input node this proxy shadows.
    pub node: NodeId,
    /// Committed positional state.
    pub current: ProxyFields,
    /// Speculative state; only meaningful while a proposal is open.
    proposed: Option<ProxyFields>,
    /// Rollback point for multi-step trial sequences.
    saved: Option<ProxyFields>,
}

impl ProxyNode {
    /// Creates a proxy from an input node, falling back to the given
    /// position if the node has no initial placement.
    pub fn from_node(node: &Node, fallback: Point) -> Self {
        let (x, y, orientation) = match node.placement {
            Some(p) => (p.x, p.y, p.orientation),
            None => (fallback.x, fallback.y, Orientation::R0),
        };
        let (width, height) = node.oriented_size(orientation);
        Self {
            node: node.id,
            current: ProxyFields {
                x,
                y,
                orientation,
                width,
                height,
            },
            proposed: None,
            saved: None,
        }
    }

    /// The fields placement math should read: the open proposal if one
    /// exists, the committed state otherwise.
    pub fn effective(&self) -> &ProxyFields {
        self.proposed.as_ref().unwrap_or(&self.current)
    }

    /// The axis-aligned bounds of the effective state.
    pub fn bounds(&self) -> Rect {
        let f = self.effective();
        Rect::from_center(f.x, f.y, f.width, f.height)
    }

    /// The bounds of the committed state, ignoring any open proposal.
    pub fn committed_bounds(&self) -> Rect {
        Rect::from_center(
            self.current.x,
            self.current.y,
            self.current.width,
            self.current.height,
        )
    }

    /// Returns `true` while a proposal is open.
    pub fn has_proposal(&self) -> bool {
        self.proposed.is_some()
    }

    /// Opens (or extends) a proposal translated by `(dx, dy)`.
    pub fn propose_move(&mut self, dx: f64, dy: f64) {
        let mut f = *self.effective();
        f.x += dx;
        f.y += dy;
        self.proposed = Some(f);
    }

    /// Opens (or extends) a proposal applying `orientation` on top of the
    /// effective orientation, swapping the footprint when needed.
    pub fn propose_orientation(&mut self, orientation: Orientation) {
        let mut f = *self.effective();
        f.orientation = f.orientation.then(orientation);
        if orientation.swaps_axes() {
            std::mem::swap(&mut f.width, &mut f.height);
        }
        self.proposed = Some(f);
    }

    /// Makes the open proposal the committed state. No-op without one.
    pub fn commit(&mut self) {
        if let Some(f) = self.proposed.take() {
            self.current = f;
        }
    }

    /// Discards the open proposal.
    pub fn revert(&mut self) {
        self.proposed = None;
    }

    /// Records the committed state as a rollback point.
    pub fn save(&mut self) {
        self.saved = Some(self.current);
    }

    /// Restores the last saved state, discarding any open proposal.
    pub fn restore(&mut self) {
        if let Some(f) = self.saved.take() {
            self.current = f;
        }
        self.proposed = None;
    }

    /// The absolute position of a port offset under the effective state.
    pub fn port_position(&self, dx: f64, dy: f64) -> Point {
        let f = self.effective();
        let (ox, oy) = f.orientation.apply(dx, dy);
        Point::new(f.x + ox, f.y + oy)
    }
}

/// A set of proxies with a cached bounding rectangle.
///
/// The bounds are the even-grid-snapped union of the members' bounds so
/// abutting clusters share grid lines. After each completed plow pass no
/// two clusters' bounds overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Member proxies.
    pub members: Vec<ProxyId>,
    /// Cached even-grid-snapped union of member bounds.
    pub bounds: Rect,
}

impl Cluster {
    /// Creates a singleton cluster for one proxy.
    pub fn singleton(id: ProxyId, bounds: Rect) -> Self {
        Self {
            members: vec![id],
            bounds: bounds.snapped_even(),
        }
    }

    /// Recomputes the cached bounds from member bounds.
    pub fn refresh_bounds(&mut self, bounds_of: impl Fn(ProxyId) -> Rect) {
        let mut iter = self.members.iter();
        let Some(&first) = iter.next() else {
            self.bounds = Rect::zero();
            return;
        };
        let mut union = bounds_of(first);
        for &m in iter {
            union = union.union(&bounds_of(m));
        }
        self.bounds = union.snapped_even();
    }
}

/// Builds one proxy per node, spreading unplaced nodes over a grid so every
/// proxy starts at a definite position.
pub fn build_proxies(netlist: &Netlist) -> Vec<ProxyNode> {
    let n = netlist.node_count();
    if n == 0 {
        return Vec::new();
    }
    let columns = (n as f64).sqrt().ceil() as usize;
    let pitch = netlist
        .nodes
        .iter()
        .map(|node| node.width.max(node.height))
        .fold(1.0_f64, f64::max);

    let mut fallback_slot = 0usize;
    netlist
        .nodes
        .iter()
        .map(|node| {
            let fallback = Point::new(
                (fallback_slot % columns) as f64 * pitch * 2.0,
                (fallback_slot / columns) as f64 * pitch * 2.0,
            );
            if node.placement.is_none() {
                fallback_slot += 1;
            }
            ProxyNode::from_node(node, fallback)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_netlist::Placement;

    fn test_node(width: f64, height: f64, placement: Option<Placement>) -> Node {
        Node {
            id: NodeId::from_raw(0),
            name: "n".to_string(),
            width,
            height,
            ports: Vec::new(),
            placement,
            is_fixed: false,
        }
    }

    #[test]
    fn proxy_from_placed_node() {
        let node = test_node(10.0, 4.0, Some(Placement::at(3.0, 7.0)));
        let proxy = ProxyNode::from_node(&node, Point::new(0.0, 0.0));
        assert_eq!(proxy.current.x, 3.0);
        assert_eq!(proxy.current.y, 7.0);
        assert_eq!(proxy.bounds(), Rect::new(-2.0, 5.0, 8.0, 9.0));
    }

    #[test]
    fn proxy_from_unplaced_node_uses_fallback() {
        let node = test_node(10.0, 4.0, None);
        let proxy = ProxyNode::from_node(&node, Point::new(50.0, 60.0));
        assert_eq!(proxy.current.x, 50.0);
        assert_eq!(proxy.current.y, 60.0);
    }

    #[test]
    fn initial_rotation_swaps_footprint() {
        let node = test_node(
            10.0,
            4.0,
            Some(Placement {
                x: 0.0,
                y: 0.0,
                orientation: Orientation::R90,
            }),
        );
        let proxy = ProxyNode::from_node(&node, Point::new(0.0, 0.0));
        assert_eq!(proxy.current.width, 4.0);
        assert_eq!(proxy.current.height, 10.0);
    }

    #[test]
    fn propose_commit_revert() {
        let node = test_node(10.0, 10.0, Some(Placement::at(0.0, 0.0)));
        let mut proxy = ProxyNode::from_node(&node, Point::new(0.0, 0.0));

        proxy.propose_move(5.0, 0.0);
        assert!(proxy.has_proposal());
        assert_eq!(proxy.effective().x, 5.0);
        assert_eq!(proxy.current.x, 0.0);

        proxy.revert();
        assert!(!proxy.has_proposal());
        assert_eq!(proxy.effective().x, 0.0);

        proxy.propose_move(5.0, 0.0);
        proxy.commit();
        assert!(!proxy.has_proposal());
        assert_eq!(proxy.current.x, 5.0);
    }

    #[test]
    fn proposals_stack_until_commit() {
        let node = test_node(10.0, 10.0, Some(Placement::at(0.0, 0.0)));
        let mut proxy = ProxyNode::from_node(&node, Point::new(0.0, 0.0));
        proxy.propose_move(5.0, 0.0);
        proxy.propose_move(0.0, 3.0);
        assert_eq!(proxy.effective().x, 5.0);
        assert_eq!(proxy.effective().y, 3.0);
        proxy.revert();
        assert_eq!((proxy.current.x, proxy.current.y), (0.0, 0.0));
    }

    #[test]
    fn propose_orientation_swaps_and_composes() {
        let node = test_node(10.0, 4.0, Some(Placement::at(0.0, 0.0)));
        let mut proxy = ProxyNode::from_node(&node, Point::new(0.0, 0.0));
        proxy.propose_orientation(Orientation::R90);
        assert_eq!(proxy.effective().width, 4.0);
        assert_eq!(proxy.effective().height, 10.0);
        assert_eq!(proxy.effective().orientation, Orientation::R90);
        proxy.commit();
        proxy.propose_orientation(Orientation::R90);
        proxy.commit();
        assert_eq!(proxy.current.orientation, Orientation::R180);
        assert_eq!(proxy.current.width, 10.0);
    }

    #[test]
    fn save_restore_rolls_back_sequences() {
        let node = test_node(10.0, 10.0, Some(Placement::at(0.0, 0.0)));
        let mut proxy = ProxyNode::from_node(&node, Point::new(0.0, 0.0));
        proxy.save();
        proxy.propose_move(5.0, 5.0);
        proxy.commit();
        proxy.propose_move(1.0, 0.0);
        proxy.commit();
        assert_eq!(proxy.current.x, 6.0);
        proxy.restore();
        assert_eq!((proxy.current.x, proxy.current.y), (0.0, 0.0));
    }

    #[test]
    fn port_position_tracks_proposal() {
        let node = test_node(10.0, 10.0, Some(Placement::at(0.0, 0.0)));
        let mut proxy = ProxyNode::from_node(&node, Point::new(0.0, 0.0));
        assert_eq!(proxy.port_position(2.0, 1.0), Point::new(2.0, 1.0));
        proxy.propose_orientation(Orientation::MirrorY);
        assert_eq!(proxy.port_position(2.0, 1.0), Point::new(-2.0, 1.0));
    }

    #[test]
    fn cluster_bounds_snap_even() {
        let mut cluster = Cluster::singleton(ProxyId::from_raw(0), Rect::new(1.0, 1.0, 4.0, 3.0));
        assert_eq!(cluster.bounds, Rect::new(0.0, 0.0, 4.0, 4.0));

        cluster.members.push(ProxyId::from_raw(1));
        let rects = [Rect::new(1.0, 1.0, 4.0, 3.0), Rect::new(5.0, 0.0, 9.0, 2.0)];
        cluster.refresh_bounds(|id| rects[id.index()]);
        assert_eq!(cluster.bounds, Rect::new(0.0, 0.0, 10.0, 4.0));
    }

    #[test]
    fn build_proxies_spreads_unplaced() {
        let mut nl = Netlist::new();
        for i in 0..4 {
            nl.add_node(Node {
                id: NodeId::from_raw(0),
                name: format!("n{i}"),
                width: 5.0,
                height: 5.0,
                ports: Vec::new(),
                placement: None,
                is_fixed: false,
            });
        }
        let proxies = build_proxies(&nl);
        assert_eq!(proxies.len(), 4);
        // No two unplaced nodes land on the same fallback slot
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert!(!proxies[i].bounds().overlaps(&proxies[j].bounds()));
            }
        }
    }
}
