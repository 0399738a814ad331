//! Shared primitives for the Trellis placement engine.
//!
//! This crate provides the geometry types ([`Point`], [`Rect`]), the
//! orientation group ([`Orientation`]), the opaque ID newtypes used as arena
//! indices throughout the workspace, and the common result/error types.

#![warn(missing_docs)]

pub mod geom;
pub mod ids;
pub mod orient;
pub mod result;

pub use geom::{Point, Rect};
pub use ids::{ClusterId, ExportId, NetId, NodeId, PortId, ProxyId};
pub use orient::Orientation;
pub use result::{InternalError, TrellisResult};
