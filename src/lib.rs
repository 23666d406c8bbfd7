//! Adaptive quadtrees on bounded integer grids.
//!
//! A [`QuadTree`] partitions a rectangular region of `W x H` cells into
//! axis-aligned subrectangles and associates each cell position with zero or
//! more values. Whether a rectangle is subdivided is decided by a
//! caller-supplied predicate, so the same structure serves as a sparse object
//! index (split where objects cluster) or as a region compressor (merge where
//! cells agree). The tree re-splits and re-merges itself after every
//! [`QuadTree::add`] and [`QuadTree::remove`] to keep its canonical shape.
//!
//! # Design Advantages
//!
//! - Every logical node has a [`NodeId`] derivable from its depth and any
//!   interior position via [`pack`]. Point lookup is a binary search over
//!   depth instead of a walk from the root, and the parent of a node is one
//!   hash lookup away.
//! - Nodes live in an internal arena; child links are plain `u32` indices, so
//!   any pointers are completely local to the data structure and destruction
//!   is a bulk free.
//! - The smallest node covering a rectangle is found by the same id binary
//!   search, which makes directional neighbour enumeration cheap enough for
//!   per-frame pathfinding queries.
//! - Leaf lifecycle hooks report every leaf created or destroyed by a
//!   structural change, which keeps derived caches (render lists, portal
//!   graphs) in sync without diffing the tree.
//!
//! # Performance
//!
//! - point lookup with [`QuadTree::find`]: O(log depth)
//! - smallest covering node: O(log depth)
//! - neighbour enumeration: O(log depth + k) for k reported leaves
//! - add/remove: O(log depth) plus the size of the structural change
//! - iteration: O(nodes)
//!
//! The region is limited to `2^29 - 1` cells per side and the tree to depth
//! 29, which is what the 6/29/29 bit layout of [`NodeId`] can address.

mod codec;
mod neighbor;
mod node;
mod rect;
mod store;
mod tree;

pub use codec::{pack, NodeId, MAX_DEPTH, MAX_SIDE};
pub use neighbor::Direction;
pub use node::{Node, Object, Objects};
pub use rect::Rect;
pub use tree::{NodePtr, QuadTree, SplitStopper};

#[cfg(test)]
mod proptests;

/// Distance of a node from the root. The root has depth 0.
pub type Depth = u8;

/// A linear index of a child relative to its parent: 0 NW, 1 NE, 2 SW, 3 SE.
pub type ChildIndex = u8;

use ahash::AHashMap;

type SmallKeyHashMap<K, V> = AHashMap<K, V>;
