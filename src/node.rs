use crate::rect::Rect;
use crate::store::{AllocPtr, EMPTY_PTR};
use crate::tree::NodePtr;
use crate::{ChildIndex, Depth};

use ahash::AHashSet;

/// A value anchored at a grid position.
///
/// Two objects are equal iff position and value both match; the same cell may
/// host any number of distinct values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Object<T> {
    pub x: i32,
    pub y: i32,
    pub value: T,
}

/// The container leaf nodes store their objects in.
pub type Objects<T> = AHashSet<Object<T>>;

/// A single tree node covering a rectangle of cells.
///
/// Leaves hold objects and have no children; internal nodes have at least one
/// child and hold nothing.
#[derive(Clone, Debug)]
pub struct Node<T> {
    pub(crate) is_leaf: bool,
    pub(crate) d: Depth,
    pub(crate) rect: Rect,
    /// Children ordered NW, NE, SW, SE. [`EMPTY_PTR`] marks a quadrant the
    /// canonical split left degenerate.
    pub(crate) children: [AllocPtr; 4],
    /// Non-empty only on leaves.
    pub(crate) objects: Objects<T>,
}

impl<T> Node<T> {
    pub(crate) fn new(is_leaf: bool, d: Depth, rect: Rect) -> Self {
        Self {
            is_leaf,
            d,
            rect,
            children: [EMPTY_PTR; 4],
            objects: Objects::default(),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    #[inline]
    pub fn depth(&self) -> Depth {
        self.d
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// The link to child `i` (0 NW, 1 NE, 2 SW, 3 SE), resolvable through
    /// [`QuadTree::node`](crate::QuadTree::node).
    #[inline]
    pub fn child(&self, i: ChildIndex) -> Option<NodePtr> {
        let ptr = self.children[i as usize];
        (ptr != EMPTY_PTR).then(|| NodePtr(ptr))
    }

    /// Iterates the objects stored in this node. Empty unless the node is a
    /// leaf.
    #[inline]
    pub fn objects(&self) -> impl Iterator<Item = &Object<T>> {
        self.objects.iter()
    }

    /// The number of objects stored in this node.
    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
