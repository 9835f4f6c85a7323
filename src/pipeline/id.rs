//! Identity types for the orchestrator.
//!
//! All IDs are newtypes over `u32`. `NodeId` and `BranchId` serve as direct
//! array indices into their owning vectors, providing O(1) lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into `Graph::nodes`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeId(INVALID)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Compact pad identifier. High 20 bits = node index, low 12 bits = pad index.
/// Supports up to ~1M nodes with 4096 pads each.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PadId(pub u32);

impl PadId {
    const PAD_BITS: u32 = 12;
    const PAD_MASK: u32 = (1 << Self::PAD_BITS) - 1;

    pub fn new(node: NodeId, pad_index: u16) -> Self {
        debug_assert!(pad_index < (1 << Self::PAD_BITS) as u16);
        Self((node.0 << Self::PAD_BITS) | (pad_index as u32 & Self::PAD_MASK))
    }

    #[inline]
    pub fn node(self) -> NodeId {
        NodeId(self.0 >> Self::PAD_BITS)
    }

    #[inline]
    pub fn pad_index(self) -> u16 {
        (self.0 & Self::PAD_MASK) as u16
    }
}

impl fmt::Debug for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PadId(node={}, pad={})", self.node().0, self.pad_index())
    }
}

/// Index into `Graph::branches`.
///
/// Live sources occupy `0..source_count` in configuration order; the
/// synthetic fallback takes the next id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(pub u32);

impl BranchId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchId({})", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch {}", self.0)
    }
}
