//! Core netlist data structures.
//!
//! The [`Netlist`] owns flat arenas of nodes, ports, nets, and exports,
//! addressed by the ID newtypes from `trellis_common`. Nodes are immutable
//! during a placement run except for their `placement` field, which the
//! engine writes back when a run completes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trellis_common::{ExportId, NetId, NodeId, Orientation, Point, PortId, Rect};

/// The final position and orientation assigned to a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// X coordinate of the node center.
    pub x: f64,
    /// Y coordinate of the node center.
    pub y: f64,
    /// Rigid orientation of the node.
    pub orientation: Orientation,
}

impl Placement {
    /// A placement at the given center with the identity orientation.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            orientation: Orientation::R0,
        }
    }
}

/// A rectangular cell footprint to be placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// The unique ID of this node.
    pub id: NodeId,
    /// Human-readable node name (e.g., "nand2_3").
    pub name: String,
    /// Footprint width before orientation is applied.
    pub width: f64,
    /// Footprint height before orientation is applied.
    pub height: f64,
    /// Ports on this node.
    pub ports: Vec<PortId>,
    /// The placement assigned to this node (`None` = unplaced).
    pub placement: Option<Placement>,
    /// Whether this node's placement is fixed and must not be moved.
    pub is_fixed: bool,
}

impl Node {
    /// The node's footprint size under the given orientation.
    ///
    /// 90/270-degree orientations swap width and height.
    pub fn oriented_size(&self, orientation: Orientation) -> (f64, f64) {
        if orientation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// The cell dimension perpendicular to a stacking direction: the
    /// shorter of width and height.
    pub fn girth(&self) -> f64 {
        self.width.min(self.height)
    }
}

/// A connection point on a node.
///
/// The offset is measured from the node center, before orientation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    /// The unique ID of this port.
    pub id: PortId,
    /// Human-readable port name (e.g., "A", "Y").
    pub name: String,
    /// The node that owns this port.
    pub node: NodeId,
    /// X offset from the node center.
    pub dx: f64,
    /// Y offset from the node center.
    pub dy: f64,
    /// The net this port is connected to (`None` = unconnected).
    pub net: Option<NetId>,
}

/// A net: an ordered set of ports that must be considered connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    /// The unique ID of this net.
    pub id: NetId,
    /// Human-readable net name (e.g., "clk", "data[3]").
    pub name: String,
    /// The ports on this net, in input order.
    pub ports: Vec<PortId>,
    /// Whether this is a power or ground net.
    pub is_supply: bool,
}

/// An externally visible port that must remain reachable from outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    /// The unique ID of this export.
    pub id: ExportId,
    /// The exported name.
    pub name: String,
    /// The port being exported.
    pub port: PortId,
}

/// The netlist handed to the placement engine.
///
/// Owns all nodes, ports, nets, and exports. Auxiliary name indices are
/// rebuilt after deserialization via [`rebuild_indices`](Self::rebuild_indices).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Netlist {
    /// All nodes.
    pub nodes: Vec<Node>,
    /// All ports.
    pub ports: Vec<Port>,
    /// All nets.
    pub nets: Vec<Net>,
    /// All exports.
    pub exports: Vec<Export>,
    /// Auxiliary index: node name to ID (rebuilt on deserialization).
    #[serde(skip)]
    pub node_by_name: HashMap<String, NodeId>,
    /// Auxiliary index: net name to ID (rebuilt on deserialization).
    #[serde(skip)]
    pub net_by_name: HashMap<String, NetId>,
}

impl Netlist {
    /// Creates an empty netlist.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            ports: Vec::new(),
            nets: Vec::new(),
            exports: Vec::new(),
            node_by_name: HashMap::new(),
            net_by_name: HashMap::new(),
        }
    }

    /// Adds a node and returns its ID.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        node.id = id;
        self.node_by_name.insert(node.name.clone(), id);
        self.nodes.push(node);
        id
    }

    /// Adds a port, linking it onto its owning node, and returns its ID.
    pub fn add_port(&mut self, mut port: Port) -> PortId {
        let id = PortId::from_raw(self.ports.len() as u32);
        port.id = id;
        let node = port.node;
        self.ports.push(port);
        self.nodes[node.index()].ports.push(id);
        id
    }

    /// Adds a net, linking its ports back to it, and returns its ID.
    pub fn add_net(&mut self, mut net: Net) -> NetId {
        let id = NetId::from_raw(self.nets.len() as u32);
        net.id = id;
        self.net_by_name.insert(net.name.clone(), id);
        for &port in &net.ports {
            self.ports[port.index()].net = Some(id);
        }
        self.nets.push(net);
        id
    }

    /// Adds an export and returns its ID.
    pub fn add_export(&mut self, mut export: Export) -> ExportId {
        let id = ExportId::from_raw(self.exports.len() as u32);
        export.id = id;
        self.exports.push(export);
        id
    }

    /// Returns the node with the given ID.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns a mutable reference to the node with the given ID.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Returns the port with the given ID.
    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.index()]
    }

    /// Returns the net with the given ID.
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of nets.
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    /// Returns the number of ports.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Returns whether all nodes have been placed.
    pub fn is_fully_placed(&self) -> bool {
        self.nodes.iter().all(|n| n.placement.is_some())
    }

    /// Returns the number of placed nodes.
    pub fn placed_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.placement.is_some()).count()
    }

    /// The absolute position of a port, or `None` if its node is unplaced.
    pub fn port_position(&self, id: PortId) -> Option<Point> {
        let port = self.port(id);
        let node = self.node(port.node);
        let placement = node.placement?;
        let (dx, dy) = placement.orientation.apply(port.dx, port.dy);
        Some(Point::new(placement.x + dx, placement.y + dy))
    }

    /// The axis-aligned bounds of a placed node, or `None` if unplaced.
    pub fn node_bounds(&self, id: NodeId) -> Option<Rect> {
        let node = self.node(id);
        let placement = node.placement?;
        let (w, h) = node.oriented_size(placement.orientation);
        Some(Rect::from_center(placement.x, placement.y, w, h))
    }

    /// The set of distinct nodes touched by a net.
    pub fn net_nodes(&self, id: NetId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .net(id)
            .ports
            .iter()
            .map(|&p| self.port(p).node)
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// Rebuilds auxiliary indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.node_by_name.clear();
        for (i, node) in self.nodes.iter().enumerate() {
            self.node_by_name
                .insert(node.name.clone(), NodeId::from_raw(i as u32));
        }
        self.net_by_name.clear();
        for (i, net) in self.nets.iter().enumerate() {
            self.net_by_name
                .insert(net.name.clone(), NetId::from_raw(i as u32));
        }
    }
}

impl Default for Netlist {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn square_node(name: &str, size: f64) -> Node {
        Node {
            id: NodeId::from_raw(0),
            name: name.to_string(),
            width: size,
            height: size,
            ports: Vec::new(),
            placement: None,
            is_fixed: false,
        }
    }

    pub(crate) fn center_port(node: NodeId) -> Port {
        Port {
            id: PortId::from_raw(0),
            name: "P".to_string(),
            node,
            dx: 0.0,
            dy: 0.0,
            net: None,
        }
    }

    #[test]
    fn empty_netlist() {
        let nl = Netlist::new();
        assert_eq!(nl.node_count(), 0);
        assert_eq!(nl.net_count(), 0);
        assert!(nl.is_fully_placed());
    }

    #[test]
    fn add_node_and_port() {
        let mut nl = Netlist::new();
        let n = nl.add_node(square_node("a", 10.0));
        let p = nl.add_port(center_port(n));
        assert_eq!(nl.node_count(), 1);
        assert_eq!(nl.port_count(), 1);
        assert_eq!(nl.node(n).ports, vec![p]);
        assert_eq!(nl.port(p).node, n);
        assert!(nl.node_by_name.contains_key("a"));
    }

    #[test]
    fn add_net_links_ports() {
        let mut nl = Netlist::new();
        let a = nl.add_node(square_node("a", 10.0));
        let b = nl.add_node(square_node("b", 10.0));
        let pa = nl.add_port(center_port(a));
        let pb = nl.add_port(center_port(b));
        let net = nl.add_net(Net {
            id: NetId::from_raw(0),
            name: "n0".to_string(),
            ports: vec![pa, pb],
            is_supply: false,
        });
        assert_eq!(nl.port(pa).net, Some(net));
        assert_eq!(nl.port(pb).net, Some(net));
        assert_eq!(nl.net_nodes(net), vec![a, b]);
    }

    #[test]
    fn net_nodes_dedups() {
        let mut nl = Netlist::new();
        let a = nl.add_node(square_node("a", 10.0));
        let p0 = nl.add_port(center_port(a));
        let p1 = nl.add_port(center_port(a));
        let net = nl.add_net(Net {
            id: NetId::from_raw(0),
            name: "loop".to_string(),
            ports: vec![p0, p1],
            is_supply: false,
        });
        assert_eq!(nl.net_nodes(net), vec![a]);
    }

    #[test]
    fn port_position_applies_orientation() {
        let mut nl = Netlist::new();
        let n = nl.add_node(square_node("a", 10.0));
        let p = nl.add_port(Port {
            id: PortId::from_raw(0),
            name: "P".to_string(),
            node: n,
            dx: 3.0,
            dy: 1.0,
            net: None,
        });
        assert_eq!(nl.port_position(p), None);

        nl.node_mut(n).placement = Some(Placement {
            x: 10.0,
            y: 20.0,
            orientation: Orientation::R180,
        });
        assert_eq!(nl.port_position(p), Some(Point::new(7.0, 19.0)));
    }

    #[test]
    fn node_bounds_swap_on_rotation() {
        let mut nl = Netlist::new();
        let n = nl.add_node(Node {
            id: NodeId::from_raw(0),
            name: "tall".to_string(),
            width: 4.0,
            height: 10.0,
            ports: Vec::new(),
            placement: Some(Placement {
                x: 0.0,
                y: 0.0,
                orientation: Orientation::R90,
            }),
            is_fixed: false,
        });
        let bounds = nl.node_bounds(n).unwrap();
        assert_eq!(bounds.width(), 10.0);
        assert_eq!(bounds.height(), 4.0);
    }

    #[test]
    fn placement_tracking() {
        let mut nl = Netlist::new();
        let n = nl.add_node(square_node("a", 10.0));
        assert!(!nl.is_fully_placed());
        assert_eq!(nl.placed_count(), 0);

        nl.node_mut(n).placement = Some(Placement::at(1.0, 2.0));
        assert!(nl.is_fully_placed());
        assert_eq!(nl.placed_count(), 1);
    }

    #[test]
    fn girth_is_shorter_side() {
        let node = Node {
            id: NodeId::from_raw(0),
            name: "g".to_string(),
            width: 4.0,
            height: 10.0,
            ports: Vec::new(),
            placement: None,
            is_fixed: false,
        };
        assert_eq!(node.girth(), 4.0);
        assert_eq!(node.oriented_size(Orientation::R0), (4.0, 10.0));
        assert_eq!(node.oriented_size(Orientation::R270), (10.0, 4.0));
    }

    #[test]
    fn serde_roundtrip_rebuilds_indices() {
        let mut nl = Netlist::new();
        let n = nl.add_node(square_node("cell_a", 10.0));
        let p = nl.add_port(center_port(n));
        nl.add_net(Net {
            id: NetId::from_raw(0),
            name: "net_a".to_string(),
            ports: vec![p],
            is_supply: true,
        });
        nl.add_export(Export {
            id: ExportId::from_raw(0),
            name: "out".to_string(),
            port: p,
        });

        let json = serde_json::to_string(&nl).unwrap();
        let mut restored: Netlist = serde_json::from_str(&json).unwrap();
        restored.rebuild_indices();

        assert_eq!(restored.node_count(), 1);
        assert_eq!(restored.net_count(), 1);
        assert_eq!(restored.exports.len(), 1);
        assert!(restored.node_by_name.contains_key("cell_a"));
        assert!(restored.net_by_name.contains_key("net_a"));
        assert!(restored.net(NetId::from_raw(0)).is_supply);
    }
}
