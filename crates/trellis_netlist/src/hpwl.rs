//! Half-perimeter wire length evaluation.
//!
//! HPWL estimates a net's wiring cost as half the perimeter of the bounding
//! box of its port positions. It is the standard placement metric; minimizing
//! HPWL tends to produce good routability.

use crate::data::Netlist;
use trellis_common::NetId;

/// Computes the total half-perimeter wire length across all nets.
pub fn total_hpwl(netlist: &Netlist) -> f64 {
    let mut total = 0.0;
    for i in 0..netlist.nets.len() {
        total += net_hpwl(netlist, NetId::from_raw(i as u32));
    }
    total
}

/// Computes the HPWL for a single net.
///
/// Ports on unplaced nodes are skipped; a net with fewer than two placed
/// ports contributes zero.
pub fn net_hpwl(netlist: &Netlist, net_id: NetId) -> f64 {
    let net = netlist.net(net_id);

    let mut min_x = f64::MAX;
    let mut max_x = f64::MIN;
    let mut min_y = f64::MAX;
    let mut max_y = f64::MIN;
    let mut placed = 0usize;

    for &port in &net.ports {
        if let Some(p) = netlist.port_position(port) {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
            placed += 1;
        }
    }

    if placed < 2 {
        return 0.0;
    }

    (max_x - min_x) + (max_y - min_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Net, Netlist, Node, Placement, Port};
    use trellis_common::{NetId, NodeId, PortId};

    fn placed_node(name: &str, x: f64, y: f64) -> Node {
        Node {
            id: NodeId::from_raw(0),
            name: name.to_string(),
            width: 10.0,
            height: 10.0,
            ports: Vec::new(),
            placement: Some(Placement::at(x, y)),
            is_fixed: false,
        }
    }

    fn port_at_center(node: NodeId) -> Port {
        Port {
            id: PortId::from_raw(0),
            name: "P".to_string(),
            node,
            dx: 0.0,
            dy: 0.0,
            net: None,
        }
    }

    fn two_node_net(ax: f64, ay: f64, bx: f64, by: f64) -> Netlist {
        let mut nl = Netlist::new();
        let a = nl.add_node(placed_node("a", ax, ay));
        let b = nl.add_node(placed_node("b", bx, by));
        let pa = nl.add_port(port_at_center(a));
        let pb = nl.add_port(port_at_center(b));
        nl.add_net(Net {
            id: NetId::from_raw(0),
            name: "n".to_string(),
            ports: vec![pa, pb],
            is_supply: false,
        });
        nl
    }

    #[test]
    fn hpwl_same_location() {
        let nl = two_node_net(5.0, 5.0, 5.0, 5.0);
        assert_eq!(total_hpwl(&nl), 0.0);
    }

    #[test]
    fn hpwl_horizontal_pair() {
        let nl = two_node_net(0.0, 0.0, 50.0, 0.0);
        assert_eq!(total_hpwl(&nl), 50.0);
    }

    #[test]
    fn hpwl_diagonal_pair() {
        let nl = two_node_net(0.0, 0.0, 30.0, 40.0);
        assert_eq!(total_hpwl(&nl), 70.0);
    }

    #[test]
    fn hpwl_empty_netlist() {
        let nl = Netlist::new();
        assert_eq!(total_hpwl(&nl), 0.0);
    }

    #[test]
    fn hpwl_skips_unplaced() {
        let mut nl = two_node_net(0.0, 0.0, 50.0, 0.0);
        nl.nodes[1].placement = None;
        // Only one placed port remains, so the net contributes nothing
        assert_eq!(total_hpwl(&nl), 0.0);
    }

    #[test]
    fn hpwl_uses_port_offsets() {
        let mut nl = Netlist::new();
        let a = nl.add_node(placed_node("a", 0.0, 0.0));
        let b = nl.add_node(placed_node("b", 20.0, 0.0));
        let pa = nl.add_port(Port {
            id: PortId::from_raw(0),
            name: "E".to_string(),
            node: a,
            dx: 5.0,
            dy: 0.0,
            net: None,
        });
        let pb = nl.add_port(Port {
            id: PortId::from_raw(0),
            name: "W".to_string(),
            node: b,
            dx: -5.0,
            dy: 0.0,
            net: None,
        });
        nl.add_net(Net {
            id: NetId::from_raw(0),
            name: "n".to_string(),
            ports: vec![pa, pb],
            is_supply: false,
        });
        // Port-to-port span is 20 - 5 - 5 = 10
        assert_eq!(total_hpwl(&nl), 10.0);
    }
}
