//! The netlist data model consumed by the Trellis placement engine.
//!
//! Defines the external contract of the engine: [`Node`]s (rectangular cell
//! footprints with [`Port`]s), [`Net`]s (ordered port sets that must be
//! considered connected), and [`Export`]s (ports that must remain reachable
//! from outside). The [`Netlist`] is the central data structure handed to the
//! placer, which writes a final [`Placement`] back onto every node.

#![warn(missing_docs)]

pub mod data;
pub mod hpwl;
pub mod steiner;

pub use data::{Export, Net, Netlist, Node, Placement, Port};
pub use hpwl::{net_hpwl, total_hpwl};
pub use steiner::net_pairings;
