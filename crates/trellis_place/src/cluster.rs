//! Connection-density clustering.
//!
//! Scores every pair of connected nodes by how exclusively they talk to each
//! other, then greedily unions the densest pairs into clusters of bounded
//! cardinality. The resulting pair ordering also drives the beam search: the
//! densest pairs are merged first.

use std::collections::HashMap;
use trellis_common::NodeId;
use trellis_netlist::{net_pairings, Netlist};

/// A node whose area exceeds this multiple of the median girth squared is a
/// macro: it never joins a cluster and is handled as a singleton.
pub const MACRO_AREA_RATIO: f64 = 100.0;

/// The output of the clustering pass.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Disjoint groups covering every node; each group's members are sorted.
    pub clusters: Vec<Vec<NodeId>>,
    /// Scored node pairs in descending density order. Drives merge order in
    /// the beam search; pairs that were skipped by the size cap still appear.
    pub pair_order: Vec<(NodeId, NodeId)>,
}

/// Maximum cluster cardinality for a netlist of `n` nodes.
pub fn cluster_cap(n: usize) -> usize {
    (n as f64).sqrt().ceil() as usize
}

/// Groups the netlist's nodes into clusters by connection density.
pub fn cluster_nodes(netlist: &Netlist) -> Clustering {
    let n = netlist.node_count();
    if n == 0 {
        return Clustering {
            clusters: Vec::new(),
            pair_order: Vec::new(),
        };
    }

    let macros = macro_flags(netlist);

    // Node-level connection statistics across every net's pairing list.
    // `raw` carries the 1/portsOnNet weight, `between` the plain pairing
    // count per pair, `incident` the pairing count per node.
    let mut raw: HashMap<(NodeId, NodeId), f64> = HashMap::new();
    let mut between: HashMap<(NodeId, NodeId), usize> = HashMap::new();
    let mut incident: HashMap<NodeId, usize> = HashMap::new();
    for net in &netlist.nets {
        let ports_on_net = net.ports.len();
        for (pa, pb) in net_pairings(netlist, net.id) {
            let a = netlist.port(pa).node;
            let b = netlist.port(pb).node;
            if a == b {
                continue;
            }
            let key = ordered(a, b);
            *raw.entry(key).or_insert(0.0) += 1.0 / ports_on_net as f64;
            *between.entry(key).or_insert(0) += 1;
            *incident.entry(a).or_insert(0) += 1;
            *incident.entry(b).or_insert(0) += 1;
        }
    }

    // Exclusivity ratio: of all pairings touching either node, the fraction
    // that link these two specifically.
    let mut scored: Vec<((NodeId, NodeId), f64)> = raw
        .into_iter()
        .map(|((a, b), weight)| {
            let pair_count = between[&(a, b)];
            let touching = incident[&a] + incident[&b] - pair_count;
            ((a, b), weight * pair_count as f64 / touching as f64)
        })
        .collect();
    scored.sort_by(|x, y| y.1.total_cmp(&x.1).then(x.0.cmp(&y.0)));

    let cap = cluster_cap(n);
    let mut uf = UnionFind::new(n);
    for &((a, b), _) in &scored {
        if macros[a.index()] || macros[b.index()] {
            continue;
        }
        let (ra, rb) = (uf.find(a.index()), uf.find(b.index()));
        if ra != rb && uf.size(ra) + uf.size(rb) <= cap {
            uf.union(ra, rb);
        }
    }

    let mut by_root: HashMap<usize, Vec<NodeId>> = HashMap::new();
    for i in 0..n {
        by_root
            .entry(uf.find(i))
            .or_default()
            .push(NodeId::from_raw(i as u32));
    }
    let mut clusters: Vec<Vec<NodeId>> = by_root.into_values().collect();
    for members in &mut clusters {
        members.sort();
    }
    clusters.sort_by_key(|members| members[0]);

    Clustering {
        clusters,
        pair_order: scored.into_iter().map(|(pair, _)| pair).collect(),
    }
}

fn ordered(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn macro_flags(netlist: &Netlist) -> Vec<bool> {
    let mut girths: Vec<f64> = netlist.nodes.iter().map(|node| node.girth()).collect();
    girths.sort_by(f64::total_cmp);
    let median = girths[girths.len() / 2];
    let threshold = MACRO_AREA_RATIO * median * median;
    netlist
        .nodes
        .iter()
        .map(|node| node.width * node.height > threshold)
        .collect()
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn size(&mut self, i: usize) -> usize {
        let root = self.find(i);
        self.size[root]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}
