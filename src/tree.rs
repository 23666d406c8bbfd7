use crate::codec::{pack, NodeId, MAX_SIDE};
use crate::neighbor::{Direction, EDGE_DESCENT};
use crate::node::{Node, Object, Objects};
use crate::rect::Rect;
use crate::store::{AllocPtr, NodeStore, EMPTY_PTR};
use crate::Depth;

use smallvec::SmallVec;
use std::fmt;
use std::hash::Hash;
use std::mem;
use tracing::{debug, trace};

/// Uniquely and stably identifies an occupied node in the [`QuadTree`]
/// (until that node is destroyed by a merge). Resolve it with
/// [`QuadTree::node`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NodePtr(pub(crate) AllocPtr);

/// Decides when a rectangle should stop splitting and stay a leaf.
///
/// Called with the rectangle's width, height and the number of objects
/// inside it; returning `true` keeps the rectangle whole. A single cell
/// never splits, whatever the function says.
///
/// Examples:
/// 1. split until regions are small, ignoring occupancy:
///    `|w, h, _| w <= 10 && h <= 10`
/// 2. split crowded regions: `|_, _, n| n < 10`
/// 3. split partially occupied regions: `|w, h, n| n == 0 || (w * h) as usize == n`
pub type SplitStopper = Box<dyn Fn(i32, i32, usize) -> bool>;

type LeafHook<T> = Box<dyn FnMut(&Node<T>)>;

/// An adaptive quadtree over a `w x h` cell region.
///
/// Rows are `x` in `0..h`, columns `y` in `0..w`; the root rectangle is
/// `(0, 0, h - 1, w - 1)`. Values of type `T` are anchored at cell positions
/// and live in the leaves. After construction (and optional hook
/// registration) call [`build`](QuadTree::build) exactly once, then mutate
/// through [`add`](QuadTree::add) and [`remove`](QuadTree::remove); the tree
/// re-splits and re-merges itself around every change.
pub struct QuadTree<T> {
    w: i32,
    h: i32,
    store: NodeStore<T>,
    root: AllocPtr,
    stop: SplitStopper,
    leaf_created: Option<LeafHook<T>>,
    leaf_removed: Option<LeafHook<T>>,
    num_objects: usize,
}

impl<T: Eq + Hash> fmt::Debug for QuadTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadTree")
            .field("w", &self.w)
            .field("h", &self.h)
            .field("nodes", &self.num_nodes())
            .field("leaves", &self.num_leaf_nodes())
            .field("objects", &self.num_objects())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl<T: Eq + Hash> QuadTree<T> {
    /// Creates an empty tree over a `w x h` region. No nodes exist until
    /// [`build`](QuadTree::build) runs.
    ///
    /// Panics if either side is zero, negative or larger than [`MAX_SIDE`].
    pub fn new(w: i32, h: i32, stop: impl Fn(i32, i32, usize) -> bool + 'static) -> Self {
        assert!(w > 0 && w <= MAX_SIDE, "region width out of range");
        assert!(h > 0 && h <= MAX_SIDE, "region height out of range");
        Self {
            w,
            h,
            store: NodeStore::new(),
            root: EMPTY_PTR,
            stop: Box::new(stop),
            leaf_created: None,
            leaf_removed: None,
            num_objects: 0,
        }
    }

    /// Registers a hook invoked after a structural change produces a new
    /// leaf. The hook must not mutate the tree.
    pub fn on_leaf_created(&mut self, hook: impl FnMut(&Node<T>) + 'static) {
        self.leaf_created = Some(Box::new(hook));
    }

    /// Registers a hook invoked after a structural change destroys a leaf or
    /// turns it into an internal node. The hook must not mutate the tree.
    pub fn on_leaf_removed(&mut self, hook: impl FnMut(&Node<T>) + 'static) {
        self.leaf_removed = Some(Box::new(hook));
    }

    /// Allocates the root leaf over the whole region and drives the initial
    /// split. Must be called exactly once, before any other operation.
    pub fn build(&mut self) {
        assert!(self.store.len() == 0, "build on a non-empty tree");
        debug!(w = self.w, h = self.h, "building quadtree");
        let rect = Rect::new(0, 0, self.h - 1, self.w - 1);
        let root = self.create_node(true, 0, rect);
        self.root = root;
        self.fire_created(root);
        self.try_split_down(root);
    }

    /// Adds `value` at position `(x, y)`, splitting the surrounding leaf
    /// when the predicate calls for it.
    ///
    /// Does nothing if the position is out of range or the exact object is
    /// already present.
    pub fn add(&mut self, x: i32, y: i32, value: T) {
        if !self.in_bounds(x, y) {
            return;
        }
        let Some(ptr) = self.find_leaf(x, y) else {
            return;
        };
        if !self.store.node_mut(ptr).objects.insert(Object { x, y, value }) {
            return;
        }
        self.num_objects += 1;
        // A single insertion moves one node across at most one predicate
        // threshold: either its leaf can now split, or its parent can now
        // merge. Never both.
        if !self.try_split_down(ptr) {
            self.try_merge_up(ptr);
        }
    }

    /// Removes the object `value` at position `(x, y)`, merging the
    /// surrounding leaf into its parent when the predicate allows it.
    ///
    /// Does nothing if the position is out of range or no such object
    /// exists.
    pub fn remove(&mut self, x: i32, y: i32, value: T) {
        if !self.in_bounds(x, y) {
            return;
        }
        let Some(ptr) = self.find_leaf(x, y) else {
            return;
        };
        if !self.store.node_mut(ptr).objects.remove(&Object { x, y, value }) {
            return;
        }
        self.num_objects -= 1;
        if !self.try_merge_up(ptr) {
            self.try_split_down(ptr);
        }
    }

    /// Returns the leaf whose rectangle contains `(x, y)`, or `None` when
    /// the position is out of range.
    ///
    /// Binary search over depth: probing the packed id of the position at a
    /// guessed depth either misses (guess too deep), hits an internal node
    /// (too shallow) or hits the answer.
    pub fn find(&self, x: i32, y: i32) -> Option<&Node<T>> {
        if !self.in_bounds(x, y) {
            return None;
        }
        self.find_leaf(x, y).map(|ptr| self.store.node(ptr))
    }

    /// Resolves a child link taken from [`Node::child`].
    #[inline]
    pub fn node(&self, ptr: NodePtr) -> Option<&Node<T>> {
        self.store.get(ptr.0)
    }

    /// Returns the live node with the given packed id, if any.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node<T>> {
        self.store.lookup(id).map(|ptr| self.store.node(ptr))
    }

    /// Calls `collect` for every object inside the query rectangle. The
    /// corners are inclusive; an inverted rectangle collects nothing.
    pub fn query_range(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        mut collect: impl FnMut(i32, i32, &T),
    ) {
        if x1 > x2 || y1 > y2 || self.root == EMPTY_PTR {
            return;
        }
        let query = Rect::new(x1, y1, x2, y2);
        // Start from the smallest node enclosing the whole query; the root
        // still works whenever the corners leave the region.
        let start = self
            .covering_ptr(x1, y1, x2, y2, self.store.maxd())
            .unwrap_or(self.root);
        self.collect_in(start, query, &mut collect);
    }

    /// Returns the deepest node whose rectangle contains both corners, or
    /// `None` when either corner is out of range.
    pub fn find_smallest_node_covering_range(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    ) -> Option<&Node<T>> {
        self.covering_ptr(x1, y1, x2, y2, self.store.maxd())
            .map(|ptr| self.store.node(ptr))
    }

    /// Calls `visit` for every leaf adjacent to `node` in direction `dir`.
    ///
    /// A diagonal direction has at most one neighbour: the leaf containing
    /// the off-corner cell. A cardinal direction resolves the smallest node
    /// covering the strip just outside the shared edge, then walks its
    /// subtree along the facing edge. Directions that leave the region visit
    /// nothing.
    pub fn find_neighbour_leaves(
        &self,
        node: &Node<T>,
        dir: Direction,
        mut visit: impl FnMut(&Node<T>),
    ) {
        let Rect { x1, y1, x2, y2 } = node.rect;
        if !dir.is_cardinal() {
            let (x, y) = match dir {
                Direction::NorthWest => (x1 - 1, y1 - 1),
                Direction::NorthEast => (x1 - 1, y2 + 1),
                Direction::SouthEast => (x2 + 1, y2 + 1),
                Direction::SouthWest => (x2 + 1, y1 - 1),
                _ => unreachable!(),
            };
            if let Some(leaf) = self.find(x, y) {
                visit(leaf);
            }
            return;
        }
        // The two cells just outside the shared edge, at the node's own
        // corners. Their covering node sits at the node's depth or above and
        // spans the whole edge.
        let ((px1, py1), (px2, py2)) = match dir {
            Direction::North => ((x1 - 1, y1), (x1 - 1, y2)),
            Direction::South => ((x2 + 1, y1), (x2 + 1, y2)),
            Direction::West => ((x1, y1 - 1), (x2, y1 - 1)),
            Direction::East => ((x1, y2 + 1), (x2, y2 + 1)),
            _ => unreachable!(),
        };
        let Some(cover) = self.covering_ptr(px1, py1, px2, py2, node.d) else {
            return;
        };
        self.collect_edge_leaves(cover, dir.opposite(), &mut visit);
    }

    /// Calls `collect` for every object in the subtree under `node`.
    pub fn query_node(&self, node: &Node<T>, mut collect: impl FnMut(i32, i32, &T)) {
        self.collect_subtree(node, &mut collect);
    }

    /// Visits every live node, leaves and internals alike, in unspecified
    /// order. The visitor must not mutate the tree.
    pub fn for_each_node(&self, mut visit: impl FnMut(&Node<T>)) {
        for node in self.store.iter() {
            visit(node);
        }
    }

    /// Visits every leaf in unspecified order.
    pub fn for_each_leaf(&self, mut visit: impl FnMut(&Node<T>)) {
        for node in self.store.iter() {
            if node.is_leaf {
                visit(node);
            }
        }
    }

    /// The current maximum depth of the tree.
    #[inline]
    pub fn depth(&self) -> Depth {
        self.store.maxd()
    }

    /// The total number of objects in the tree.
    #[inline]
    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    /// The number of live nodes, leaves and internals alike.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.store.len()
    }

    /// The number of leaves.
    #[inline]
    pub fn num_leaf_nodes(&self) -> usize {
        self.store.num_leaves()
    }

    /// The region width (columns).
    #[inline]
    pub fn width(&self) -> i32 {
        self.w
    }

    /// The region height (rows).
    #[inline]
    pub fn height(&self) -> i32 {
        self.h
    }

    // ~~~~~~~~~~~ internals ~~~~~~~~~~~~

    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.h && y >= 0 && y < self.w
    }

    #[inline]
    fn id_of(&self, d: Depth, x: i32, y: i32) -> NodeId {
        pack(d as u64, x as u64, y as u64, self.w as u64, self.h as u64)
    }

    /// Whether a rectangle holding `n` objects must be an internal node. A
    /// single cell never is; otherwise the stop predicate has the last word.
    fn splittable(&self, rect: Rect, n: usize) -> bool {
        if rect.is_cell() {
            return false;
        }
        !(self.stop)(rect.width(), rect.height(), n)
    }

    fn create_node(&mut self, is_leaf: bool, d: Depth, rect: Rect) -> AllocPtr {
        let id = self.id_of(d, rect.x1, rect.y1);
        self.store.insert(id, Node::new(is_leaf, d, rect))
    }

    fn erase_node(&mut self, ptr: AllocPtr) {
        let (d, rect) = {
            let node = self.store.node(ptr);
            (node.d, node.rect)
        };
        let id = self.id_of(d, rect.x1, rect.y1);
        self.store.remove(id, ptr);
    }

    /// The parent of a non-root node: one pack and one hash lookup away.
    fn parent_of(&self, ptr: AllocPtr) -> AllocPtr {
        let node = self.store.node(ptr);
        let id = self.id_of(node.d - 1, node.rect.x1, node.rect.y1);
        self.store
            .lookup(id)
            .expect("non-root node has a parent in the store")
    }

    fn find_leaf(&self, x: i32, y: i32) -> Option<AllocPtr> {
        let (mut l, mut r) = (0i32, self.store.maxd() as i32);
        while l <= r {
            let d = ((l + r) >> 1) as Depth;
            match self.store.lookup(self.id_of(d, x, y)) {
                // No node this deep contains the position: too deep.
                None => r = d as i32 - 1,
                Some(ptr) => {
                    if self.store.node(ptr).is_leaf {
                        return Some(ptr);
                    }
                    // An internal ancestor: the leaf sits below it.
                    l = d as i32 + 1;
                }
            }
        }
        None
    }

    /// Binary search for the deepest node, no deeper than `dmax`, containing
    /// both corners. Symmetric in the two corners.
    fn covering_ptr(&self, x1: i32, y1: i32, x2: i32, y2: i32, dmax: Depth) -> Option<AllocPtr> {
        if !self.in_bounds(x1, y1) || !self.in_bounds(x2, y2) {
            return None;
        }
        let (mut l, mut r) = (0i32, dmax as i32);
        let mut best = None;
        while l <= r {
            let d = ((l + r) >> 1) as Depth;
            if self.id_of(d, x1, y1) == self.id_of(d, x2, y2) {
                if let Some(ptr) = self.store.lookup(self.id_of(d, x1, y1)) {
                    best = Some(ptr);
                    l = d as i32 + 1;
                    continue;
                }
            }
            r = d as i32 - 1;
        }
        best
    }

    /// Splits a leaf that the predicate no longer accepts, recursively, until
    /// every descendant is an acceptable leaf. Returns whether anything
    /// changed.
    fn try_split_down(&mut self, ptr: AllocPtr) -> bool {
        let (rect, d, n, is_leaf) = {
            let node = self.store.node(ptr);
            (node.rect, node.d, node.objects.len(), node.is_leaf)
        };
        if !is_leaf || !self.splittable(rect, n) {
            return false;
        }
        trace!(depth = d, ?rect, n, "splitting leaf");
        let mut created: SmallVec<[AllocPtr; 8]> = SmallVec::new();
        self.split_node(ptr, &mut created);
        self.fire_removed(ptr);
        for leaf in created {
            self.fire_created(leaf);
        }
        true
    }

    /// Replaces a node's objects with up to four children built over the
    /// canonical quadrants. The node ends up internal either way.
    fn split_node(&mut self, ptr: AllocPtr, created: &mut SmallVec<[AllocPtr; 8]>) {
        let (rect, d, was_leaf) = {
            let node = self.store.node(ptr);
            (node.rect, node.d, node.is_leaf)
        };
        let mut upstream = mem::take(&mut self.store.node_mut(ptr).objects);
        for (i, quad) in rect.split().into_iter().enumerate() {
            let child = match quad {
                Some(sub) => self.split_into(d + 1, sub, &mut upstream, created),
                None => EMPTY_PTR,
            };
            self.store.node_mut(ptr).children[i] = child;
        }
        // The quadrants partition the rectangle; nothing may be left over.
        debug_assert!(upstream.is_empty());
        if was_leaf {
            self.store.flip_to_branch(ptr);
        }
    }

    /// Builds the node for one quadrant, stealing the objects that fall
    /// inside it from the upstream bucket, and keeps splitting while the
    /// predicate demands it.
    fn split_into(
        &mut self,
        d: Depth,
        rect: Rect,
        upstream: &mut Objects<T>,
        created: &mut SmallVec<[AllocPtr; 8]>,
    ) -> AllocPtr {
        let (bucket, rest): (Objects<T>, Objects<T>) =
            upstream.drain().partition(|o| rect.contains(o.x, o.y));
        *upstream = rest;
        if !self.splittable(rect, bucket.len()) {
            let ptr = self.create_node(true, d, rect);
            self.store.node_mut(ptr).objects = bucket;
            created.push(ptr);
            ptr
        } else {
            // An internal node holds the bucket only until split_node deals
            // it out to the quadrants below.
            let ptr = self.create_node(false, d, rect);
            self.store.node_mut(ptr).objects = bucket;
            self.split_node(ptr, created);
            ptr
        }
    }

    /// Collapses the parent of a leaf whose sibling population no longer
    /// justifies the split, cascading towards the root. Returns whether
    /// anything changed.
    fn try_merge_up(&mut self, ptr: AllocPtr) -> bool {
        let mut current = ptr;
        let mut merged = false;
        loop {
            if current == self.root || !self.store.node(current).is_leaf {
                break;
            }
            let parent = self.parent_of(current);
            let (prect, pd, children) = {
                let node = self.store.node(parent);
                (node.rect, node.d, node.children)
            };
            // Mergeable only when every present child is a leaf and their
            // combined population keeps the parent rectangle whole.
            let mut total = 0usize;
            let mut all_leaves = true;
            for &child in &children {
                if child == EMPTY_PTR {
                    continue;
                }
                let node = self.store.node(child);
                if !node.is_leaf {
                    all_leaves = false;
                    break;
                }
                total += node.objects.len();
            }
            if !all_leaves || self.splittable(prect, total) {
                break;
            }
            trace!(depth = pd, rect = ?prect, total, "merging children into leaf");
            for &child in &children {
                if child == EMPTY_PTR {
                    continue;
                }
                let objs = mem::take(&mut self.store.node_mut(child).objects);
                self.store.node_mut(parent).objects.extend(objs);
            }
            self.store.node_mut(parent).children = [EMPTY_PTR; 4];
            self.store.flip_to_leaf(parent);
            for &child in &children {
                if child == EMPTY_PTR {
                    continue;
                }
                self.fire_removed(child);
                self.erase_node(child);
            }
            self.fire_created(parent);
            merged = true;
            current = parent;
        }
        merged
    }

    fn collect_in<F: FnMut(i32, i32, &T)>(&self, ptr: AllocPtr, query: Rect, collect: &mut F) {
        let node = self.store.node(ptr);
        if !node.rect.overlaps(query) {
            return;
        }
        if node.is_leaf {
            for o in &node.objects {
                if query.contains(o.x, o.y) {
                    collect(o.x, o.y, &o.value);
                }
            }
            return;
        }
        for &child in &node.children {
            if child != EMPTY_PTR {
                self.collect_in(child, query, collect);
            }
        }
    }

    fn collect_subtree<F: FnMut(i32, i32, &T)>(&self, node: &Node<T>, collect: &mut F) {
        if node.is_leaf {
            for o in &node.objects {
                collect(o.x, o.y, &o.value);
            }
            return;
        }
        for &child in &node.children {
            if child != EMPTY_PTR {
                self.collect_subtree(self.store.node(child), collect);
            }
        }
    }

    /// Walks a subtree visiting the leaves on one cardinal edge, steered by
    /// the descent table keyed on which children exist.
    fn collect_edge_leaves<F: FnMut(&Node<T>)>(
        &self,
        ptr: AllocPtr,
        edge: Direction,
        visit: &mut F,
    ) {
        let node = self.store.node(ptr);
        if node.is_leaf {
            visit(node);
            return;
        }
        let c = node.children;
        let flag = usize::from(c[0] != EMPTY_PTR)
            | usize::from(c[1] != EMPTY_PTR) << 1
            | usize::from(c[2] != EMPTY_PTR) << 2;
        for &i in EDGE_DESCENT[flag][edge as usize] {
            let child = c[i as usize];
            if child != EMPTY_PTR {
                self.collect_edge_leaves(child, edge, visit);
            }
        }
    }

    fn fire_created(&mut self, ptr: AllocPtr) {
        if let Some(mut hook) = self.leaf_created.take() {
            hook(self.store.node(ptr));
            self.leaf_created = Some(hook);
        }
    }

    fn fire_removed(&mut self, ptr: AllocPtr) {
        if let Some(mut hook) = self.leaf_removed.take() {
            hook(self.store.node(ptr));
            self.leaf_removed = Some(hook);
        }
    }
}

#[cfg(test)]
impl<T: Eq + Hash> QuadTree<T> {
    /// Checks the full invariant set against a root-down walk. Test builds
    /// only.
    pub(crate) fn assert_invariants(&self) {
        if self.root == EMPTY_PTR {
            assert_eq!(self.num_nodes(), 0);
            return;
        }
        let mut seen = 0usize;
        let mut leaves = 0usize;
        let mut objects = 0usize;
        let mut maxd: Depth = 0;
        let mut stack = vec![self.root];
        while let Some(ptr) = stack.pop() {
            let node = self.store.node(ptr);
            seen += 1;
            maxd = maxd.max(node.d);
            let id = self.id_of(node.d, node.rect.x1, node.rect.y1);
            assert_eq!(self.store.lookup(id), Some(ptr), "node not indexed under its id");
            if node.is_leaf {
                leaves += 1;
                objects += node.objects.len();
                assert!(node.children.iter().all(|&c| c == EMPTY_PTR), "leaf with children");
                assert!(
                    node.rect.is_cell() || !self.splittable(node.rect, node.objects.len()),
                    "leaf the predicate wants split"
                );
                for o in &node.objects {
                    assert!(node.rect.contains(o.x, o.y), "object outside its leaf");
                }
            } else {
                assert!(node.objects.is_empty(), "internal node holding objects");
                assert!(
                    node.children.iter().any(|&c| c != EMPTY_PTR),
                    "internal node with no children"
                );
                assert!(
                    self.splittable(node.rect, self.count_subtree_objects(ptr)),
                    "internal node the predicate wants merged"
                );
                for (i, quad) in node.rect.split().into_iter().enumerate() {
                    let child = node.children[i];
                    match quad {
                        Some(rect) => {
                            assert_ne!(child, EMPTY_PTR, "missing child on a live quadrant");
                            let cn = self.store.node(child);
                            assert_eq!(cn.rect, rect, "child rect off the canonical split");
                            assert_eq!(cn.d, node.d + 1);
                            stack.push(child);
                        }
                        None => assert_eq!(child, EMPTY_PTR, "child link on a degenerate quadrant"),
                    }
                }
            }
        }
        assert_eq!(seen, self.num_nodes(), "store holds unreachable nodes");
        assert_eq!(leaves, self.num_leaf_nodes(), "stale leaf count");
        assert_eq!(objects, self.num_objects(), "stale object count");
        assert_eq!(maxd, self.depth(), "stale max depth");
    }

    fn count_subtree_objects(&self, ptr: AllocPtr) -> usize {
        let node = self.store.node(ptr);
        if node.is_leaf {
            return node.objects.len();
        }
        node.children
            .iter()
            .filter(|&&c| c != EMPTY_PTR)
            .map(|&c| self.count_subtree_objects(c))
            .sum()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
