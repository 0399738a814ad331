//! Opaque ID newtypes for placement entities.
//!
//! [`NodeId`], [`PortId`], [`NetId`], [`ExportId`], [`ProxyId`], and
//! [`ClusterId`] are thin `u32` wrappers used as arena indices. They are
//! `Copy`, `Hash`, and `Serialize`/`Deserialize`.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the index as a `usize` for slice access.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a node (a rectangular cell footprint).
    NodeId
);

define_id!(
    /// Opaque, copyable ID for a port on a node.
    PortId
);

define_id!(
    /// Opaque, copyable ID for a net.
    NetId
);

define_id!(
    /// Opaque, copyable ID for an export (an externally visible port).
    ExportId
);

define_id!(
    /// Opaque, copyable ID for a proxy node owned by the engine.
    ProxyId
);

define_id!(
    /// Opaque, copyable ID for a cluster of proxy nodes.
    ClusterId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn node_id_roundtrip() {
        let id = NodeId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
        assert_eq!(id.index(), 42);
    }

    #[test]
    fn id_equality() {
        let a = NetId::from_raw(3);
        let b = NetId::from_raw(3);
        let c = NetId::from_raw(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn id_ordering() {
        assert!(NodeId::from_raw(1) < NodeId::from_raw(2));
    }

    #[test]
    fn id_hash_in_set() {
        let mut set = HashSet::new();
        set.insert(ProxyId::from_raw(1));
        set.insert(ProxyId::from_raw(2));
        set.insert(ProxyId::from_raw(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = ClusterId::from_raw(55);
        let json = serde_json::to_string(&id).unwrap();
        let restored: ClusterId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn id_display() {
        let id = PortId::from_raw(7);
        assert_eq!(format!("{id}"), "7");
    }
}
