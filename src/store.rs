use crate::codec::{NodeId, MAX_DEPTH};
use crate::node::Node;
use crate::{Depth, SmallKeyHashMap};

use slab::Slab;

/// Points to a node slot owned by the store's internal arena.
pub(crate) type AllocPtr = u32;

/// An [`AllocPtr`] that doesn't point to anything.
pub(crate) const EMPTY_PTR: AllocPtr = AllocPtr::MAX;

/// Owns every live node and keeps the id index and population counters in
/// lockstep with the tree structure.
///
/// The arena assigns each node an [`AllocPtr`]; the hashed index maps the
/// node's packed [`NodeId`] to that slot so that lookups by id stay O(1).
/// Every create and destroy goes through [`insert`](NodeStore::insert) and
/// [`remove`](NodeStore::remove), which is what keeps the two views
/// consistent.
#[derive(Debug)]
pub(crate) struct NodeStore<T> {
    arena: Slab<Node<T>>,
    index: SmallKeyHashMap<NodeId, AllocPtr>,
    num_leaves: usize,
    /// How many live nodes sit at every depth. Drives `maxd` maintenance on
    /// removal.
    depth_table: [u32; MAX_DEPTH as usize + 1],
    maxd: Depth,
}

impl<T> NodeStore<T> {
    pub fn new() -> Self {
        Self {
            arena: Slab::new(),
            index: SmallKeyHashMap::default(),
            num_leaves: 0,
            depth_table: [0; MAX_DEPTH as usize + 1],
            maxd: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// The deepest depth that still has a live node.
    #[inline]
    pub fn maxd(&self) -> Depth {
        self.maxd
    }

    pub fn insert(&mut self, id: NodeId, node: Node<T>) -> AllocPtr {
        debug_assert!(node.d <= MAX_DEPTH);
        if node.is_leaf {
            self.num_leaves += 1;
        }
        self.depth_table[node.d as usize] += 1;
        self.maxd = self.maxd.max(node.d);
        let ptr = self.arena.insert(node) as AllocPtr;
        let evicted = self.index.insert(id, ptr);
        debug_assert!(evicted.is_none(), "node id {id:#x} is already live");
        ptr
    }

    pub fn remove(&mut self, id: NodeId, ptr: AllocPtr) -> Node<T> {
        self.index.remove(&id);
        let node = self.arena.remove(ptr as usize);
        if node.is_leaf {
            self.num_leaves -= 1;
        }
        self.depth_table[node.d as usize] -= 1;
        if node.d == self.maxd {
            // The deepest stratum may have emptied out; walk maxd down to
            // the next populated one.
            while self.maxd > 0 && self.depth_table[self.maxd as usize] == 0 {
                self.maxd -= 1;
            }
        }
        node
    }

    #[inline]
    pub fn lookup(&self, id: NodeId) -> Option<AllocPtr> {
        self.index.get(&id).copied()
    }

    #[inline]
    pub fn get(&self, ptr: AllocPtr) -> Option<&Node<T>> {
        self.arena.get(ptr as usize)
    }

    /// Panicking access for pointers the tree structure vouches for.
    #[inline]
    pub fn node(&self, ptr: AllocPtr) -> &Node<T> {
        &self.arena[ptr as usize]
    }

    #[inline]
    pub fn node_mut(&mut self, ptr: AllocPtr) -> &mut Node<T> {
        &mut self.arena[ptr as usize]
    }

    /// Flips a leaf into an internal node, keeping the leaf counter honest.
    pub fn flip_to_branch(&mut self, ptr: AllocPtr) {
        let node = &mut self.arena[ptr as usize];
        debug_assert!(node.is_leaf);
        node.is_leaf = false;
        self.num_leaves -= 1;
    }

    /// Flips an internal node back into a leaf.
    pub fn flip_to_leaf(&mut self, ptr: AllocPtr) {
        let node = &mut self.arena[ptr as usize];
        debug_assert!(!node.is_leaf);
        node.is_leaf = true;
        self.num_leaves += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node<T>> {
        self.arena.iter().map(|(_, node)| node)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rect::Rect;

    fn leaf(d: Depth) -> Node<()> {
        Node::new(true, d, Rect::new(0, 0, 0, 0))
    }

    #[test]
    fn counters_follow_insert_and_remove() {
        let mut store = NodeStore::new();
        let a = store.insert(1, leaf(0));
        let b = store.insert(2, leaf(1));
        let c = store.insert(3, leaf(2));
        assert_eq!(store.len(), 3);
        assert_eq!(store.num_leaves(), 3);
        assert_eq!(store.maxd(), 2);
        assert_eq!(store.lookup(2), Some(b));

        store.remove(3, c);
        assert_eq!(store.maxd(), 1);
        store.remove(2, b);
        assert_eq!(store.maxd(), 0);
        store.remove(1, a);
        assert_eq!(store.len(), 0);
        assert_eq!(store.num_leaves(), 0);
        assert_eq!(store.lookup(2), None);
    }

    #[test]
    fn maxd_skips_emptied_strata() {
        let mut store = NodeStore::new();
        let a = store.insert(1, leaf(0));
        let b = store.insert(2, leaf(4));
        assert_eq!(store.maxd(), 4);
        store.remove(2, b);
        // Depths 1..=3 were never populated; maxd must fall straight to 0.
        assert_eq!(store.maxd(), 0);
        store.remove(1, a);
    }

    #[test]
    fn flips_track_the_leaf_count() {
        let mut store = NodeStore::new();
        let a = store.insert(1, leaf(0));
        assert_eq!(store.num_leaves(), 1);
        store.flip_to_branch(a);
        assert_eq!(store.num_leaves(), 0);
        assert!(!store.node(a).is_leaf);
        store.flip_to_leaf(a);
        assert_eq!(store.num_leaves(), 1);
    }
}
