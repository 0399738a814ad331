//! The Trellis placement engine.
//!
//! Turns a [`Netlist`](trellis_netlist::Netlist) of rectangular cells into a
//! legal, wire-length-optimized arrangement. Two strategies are available:
//! clustered beam search for general footprints, and row/column stacking for
//! netlists whose cells all share one girth. [`place`] resolves the strategy
//! from the [`PlacerConfig`](trellis_config::PlacerConfig), runs it, and
//! writes the final placement back onto every node.

#![warn(missing_docs)]

pub mod beam;
pub mod cluster;
pub mod force;
pub mod freerect;
pub mod plow;
pub mod proxy;
pub mod snapshot;
pub mod spatial;
pub mod stacks;

pub use beam::beam_place;
pub use cluster::{cluster_nodes, Clustering};
pub use force::ForceAccumulator;
pub use freerect::free_rectangles;
pub use plow::plow;
pub use proxy::{build_proxies, Cluster, ProxyNode};
pub use snapshot::SharedVec;
pub use spatial::SpatialIndex;
pub use stacks::{stack_place, uniform_girth};

use std::time::Instant;
use thiserror::Error;
use trellis_common::Rect;
use trellis_config::{PlacerConfig, Strategy};
use trellis_diagnostics::{Diagnostic, DiagnosticSink};
use trellis_netlist::{total_hpwl, Netlist, Placement};

/// Why a placement run failed.
///
/// Degenerate input is rejected before any optimization starts, so a failed
/// run never leaves a partial placement behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaceError {
    /// The netlist contains no nodes.
    #[error("netlist contains no nodes")]
    NoNodes,
    /// Stack derivation produced no usable stacks.
    #[error("row/column placement derived zero stacks")]
    NoStacks,
    /// A net connects fewer than two distinct nodes.
    #[error("net `{0}` connects fewer than two distinct nodes")]
    DegenerateNet(String),
    /// The engine broke one of its own invariants mid-run.
    #[error(transparent)]
    Internal(#[from] trellis_common::InternalError),
}

/// What a completed placement run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSummary {
    /// Number of nodes placed.
    pub node_count: usize,
    /// Total half-perimeter wire length of the result.
    pub hpwl: f64,
    /// Area of the bounding box around all placed nodes.
    pub bounding_area: f64,
    /// Wall-clock time the run took.
    pub elapsed: std::time::Duration,
    /// The strategy that actually ran.
    pub strategy: Strategy,
}

/// Places every node of the netlist and writes the result back.
///
/// Strategy `Auto` picks row/column stacking when all cells share one girth
/// and clustered beam search otherwise. Degenerate input fails before any
/// node is touched; budget exhaustion is not an error, the best placement
/// found so far is kept.
pub fn place(
    netlist: &mut Netlist,
    config: &PlacerConfig,
    sink: &DiagnosticSink,
) -> Result<PlaceSummary, PlaceError> {
    let start = Instant::now();

    if netlist.node_count() == 0 {
        sink.emit(Diagnostic::error("placement skipped: netlist has no nodes"));
        return Err(PlaceError::NoNodes);
    }
    for net in &netlist.nets {
        if netlist.net_nodes(net.id).len() < 2 {
            sink.emit(
                Diagnostic::error(format!(
                    "placement skipped: net `{}` connects fewer than two distinct nodes",
                    net.name
                ))
                .with_note("every net must span at least two nodes"),
            );
            return Err(PlaceError::DegenerateNet(net.name.clone()));
        }
    }

    let strategy = match config.strategy {
        Strategy::Auto => {
            if uniform_girth(netlist).is_some() {
                Strategy::Stacks
            } else {
                Strategy::Beam
            }
        }
        explicit => explicit,
    };

    match strategy {
        Strategy::Stacks => {
            let girth = uniform_girth(netlist)
                .unwrap_or_else(|| netlist.nodes.iter().map(|n| n.girth()).fold(0.0, f64::max));
            if girth <= 0.0 {
                sink.emit(Diagnostic::error(
                    "placement skipped: zero-girth cells derive no stacks",
                ));
                return Err(PlaceError::NoStacks);
            }
            let placements = stack_place(netlist, config);
            for (node, placement) in netlist.nodes.iter_mut().zip(placements) {
                node.placement = Some(placement);
            }
        }
        Strategy::Beam | Strategy::Auto => {
            let clustering = cluster_nodes(netlist);
            sink.emit(Diagnostic::note(format!(
                "clustered {} nodes into {} groups",
                netlist.node_count(),
                clustering.clusters.len()
            )));
            let placed = beam_place(netlist, &clustering, config)?;
            for proxy in &placed {
                let f = &proxy.current;
                netlist.node_mut(proxy.node).placement = Some(Placement {
                    x: f.x,
                    y: f.y,
                    orientation: f.orientation,
                });
            }
        }
    }

    let bounding_area = netlist
        .nodes
        .iter()
        .filter_map(|node| netlist.node_bounds(node.id))
        .reduce(|acc, r| acc.union(&r))
        .map_or(0.0, |r: Rect| r.area());

    Ok(PlaceSummary {
        node_count: netlist.node_count(),
        hpwl: total_hpwl(netlist),
        bounding_area,
        elapsed: start.elapsed(),
        strategy,
    })
}
