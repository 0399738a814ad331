//! Steiner-style port pairing for multi-pin nets.
//!
//! A multi-pin net does not dictate which port pairs are actually wired; the
//! placer wants a minimal set of point-to-point connections approximating the
//! net's required connectivity. This module produces that pairing as a
//! minimum spanning tree over the port positions under Manhattan distance,
//! which matches the HPWL cost model.

use crate::data::Netlist;
use trellis_common::{NetId, Point, PortId};

/// Returns the optimal connection list for a net: `ports - 1` point-to-point
/// pairs forming a minimum spanning tree under Manhattan distance.
///
/// Ports on unplaced nodes are positioned by their raw offsets so the pairing
/// is still defined before any placement exists. Nets with fewer than two
/// ports return an empty list.
pub fn net_pairings(netlist: &Netlist, net_id: NetId) -> Vec<(PortId, PortId)> {
    let net = netlist.net(net_id);
    if net.ports.len() < 2 {
        return Vec::new();
    }

    let positions: Vec<Point> = net
        .ports
        .iter()
        .map(|&p| {
            netlist.port_position(p).unwrap_or_else(|| {
                let port = netlist.port(p);
                Point::new(port.dx, port.dy)
            })
        })
        .collect();

    // Prim's algorithm over the complete graph; nets are small enough that
    // the O(n^2) scan beats a heap.
    let n = net.ports.len();
    let mut in_tree = vec![false; n];
    let mut best_dist = vec![f64::MAX; n];
    let mut best_from = vec![0usize; n];
    let mut pairs = Vec::with_capacity(n - 1);

    in_tree[0] = true;
    for i in 1..n {
        best_dist[i] = manhattan(positions[0], positions[i]);
    }

    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_dist = f64::MAX;
        for i in 0..n {
            if !in_tree[i] && best_dist[i] < next_dist {
                next = i;
                next_dist = best_dist[i];
            }
        }
        if next == usize::MAX {
            break;
        }
        in_tree[next] = true;
        pairs.push((net.ports[best_from[next]], net.ports[next]));
        for i in 0..n {
            if !in_tree[i] {
                let d = manhattan(positions[next], positions[i]);
                if d < best_dist[i] {
                    best_dist[i] = d;
                    best_from[i] = next;
                }
            }
        }
    }

    pairs
}

fn manhattan(a: Point, b: Point) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}
