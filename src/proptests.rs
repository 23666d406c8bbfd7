use std::collections::HashSet;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::{Direction, QuadTree, Rect};

const GRID_W: i32 = 10;
const GRID_H: i32 = 8;

/// A position and value to add or remove, kept inside the grid so that most
/// actions land.
#[derive(Debug, Clone)]
struct Placement {
    x: i32,
    y: i32,
    value: u8,
}

impl Arbitrary for Placement {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: ()) -> Self::Strategy {
        // Few distinct values so removals frequently hit live objects and
        // cells host duplicates.
        (0..GRID_H, 0..GRID_W, 0..4u8)
            .prop_map(|(x, y, value)| Placement { x, y, value })
            .boxed()
    }
}

/// Actions to drive against both the tree and the model.
#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Add(Placement),
    Remove(Placement),
}

fn ssf1(w: i32, h: i32, n: usize) -> bool {
    (w <= 2 && h <= 2) || n <= 1
}

fn ssf2(w: i32, h: i32, n: usize) -> bool {
    n == 0 || (w * h) as usize == n
}

/// Test harness executing actions against the tree and a flat model set.
struct Test {
    tree: QuadTree<u8>,
    model: HashSet<(i32, i32, u8)>,
}

impl Test {
    fn new(stop: fn(i32, i32, usize) -> bool) -> Self {
        let mut tree = QuadTree::new(GRID_W, GRID_H, stop);
        tree.build();
        Self {
            tree,
            model: HashSet::new(),
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Add(p) => {
                self.tree.add(p.x, p.y, p.value);
                self.model.insert((p.x, p.y, p.value));
            }
            Action::Remove(p) => {
                self.tree.remove(p.x, p.y, p.value);
                self.model.remove(&(p.x, p.y, p.value));
            }
        }
        self.tree.assert_invariants();
        assert_eq!(
            self.tree.num_objects(),
            self.model.len(),
            "object count diverged from the model"
        );
    }

    fn run(stop: fn(i32, i32, usize) -> bool, actions: Vec<Action>) -> Self {
        let mut test = Test::new(stop);
        for action in actions {
            test.execute(action);
        }
        test
    }

    /// Queries the whole region, asserting no object is reported twice.
    fn full_query(&self) -> HashSet<(i32, i32, u8)> {
        let mut out = HashSet::new();
        self.tree.query_range(0, 0, GRID_H - 1, GRID_W - 1, |x, y, v| {
            assert!(out.insert((x, y, *v)), "object reported twice");
        });
        out
    }
}

/// Whether leaf `b` is a neighbour of leaf `a` in direction `dir`, straight
/// from the adjacency definition.
fn adjacent(dir: Direction, a: Rect, b: Rect) -> bool {
    let cols = b.y1 <= a.y2 && b.y2 >= a.y1;
    let rows = b.x1 <= a.x2 && b.x2 >= a.x1;
    match dir {
        Direction::North => b.x2 + 1 == a.x1 && cols,
        Direction::South => b.x1 == a.x2 + 1 && cols,
        Direction::West => b.y2 + 1 == a.y1 && rows,
        Direction::East => b.y1 == a.y2 + 1 && rows,
        Direction::NorthWest => b.contains(a.x1 - 1, a.y1 - 1),
        Direction::NorthEast => b.contains(a.x1 - 1, a.y2 + 1),
        Direction::SouthEast => b.contains(a.x2 + 1, a.y2 + 1),
        Direction::SouthWest => b.contains(a.x2 + 1, a.y1 - 1),
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn invariants_hold_under_an_occupancy_predicate(
        actions in prop::collection::vec(any::<Action>(), 1..80)
    ) {
        let test = Test::run(ssf1, actions);
        prop_assert_eq!(test.full_query(), test.model);
    }

    #[test]
    fn invariants_hold_under_a_saturation_predicate(
        actions in prop::collection::vec(any::<Action>(), 1..80)
    ) {
        let test = Test::run(ssf2, actions);
        prop_assert_eq!(test.full_query(), test.model);
    }

    #[test]
    fn find_returns_the_containing_leaf(
        actions in prop::collection::vec(any::<Action>(), 1..60)
    ) {
        let test = Test::run(ssf2, actions);
        for x in 0..GRID_H {
            for y in 0..GRID_W {
                let node = test.tree.find(x, y).expect("every cell has a leaf");
                prop_assert!(node.is_leaf());
                prop_assert!(node.rect().contains(x, y));
            }
        }
    }

    #[test]
    fn range_queries_match_a_linear_scan(
        actions in prop::collection::vec(any::<Action>(), 1..60),
        corners in (0..GRID_H, 0..GRID_W, 0..GRID_H, 0..GRID_W)
    ) {
        let test = Test::run(ssf1, actions);
        let (a, b, c, d) = corners;
        let (x1, x2) = (a.min(c), a.max(c));
        let (y1, y2) = (b.min(d), b.max(d));

        let mut got = HashSet::new();
        test.tree.query_range(x1, y1, x2, y2, |x, y, v| {
            assert!(got.insert((x, y, *v)), "object reported twice");
        });
        let expected: HashSet<_> = test
            .model
            .iter()
            .copied()
            .filter(|&(x, y, _)| x >= x1 && x <= x2 && y >= y1 && y <= y2)
            .collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn add_remove_round_trip_restores_the_shape(
        actions in prop::collection::vec(any::<Action>(), 1..60),
        p in any::<Placement>()
    ) {
        let mut test = Test::run(ssf2, actions);
        prop_assume!(!test.model.contains(&(p.x, p.y, p.value)));

        let before = (
            test.tree.num_nodes(),
            test.tree.num_leaf_nodes(),
            test.tree.depth(),
            test.tree.num_objects(),
        );
        test.tree.add(p.x, p.y, p.value);
        test.tree.assert_invariants();
        test.tree.remove(p.x, p.y, p.value);
        test.tree.assert_invariants();
        let after = (
            test.tree.num_nodes(),
            test.tree.num_leaf_nodes(),
            test.tree.depth(),
            test.tree.num_objects(),
        );
        prop_assert_eq!(before, after);
    }

    #[test]
    fn neighbours_match_a_linear_scan(
        actions in prop::collection::vec(any::<Action>(), 1..40)
    ) {
        let test = Test::run(ssf2, actions);
        let mut leaves = Vec::new();
        test.tree.for_each_leaf(|n| leaves.push(n.rect()));

        for &rect in &leaves {
            let node = test.tree.find(rect.x1, rect.y1).expect("leaf corner resolves");
            for dir in Direction::ALL {
                let mut got = HashSet::new();
                test.tree.find_neighbour_leaves(node, dir, |m| {
                    assert!(got.insert(m.rect()), "leaf reported twice");
                });
                let expected: HashSet<Rect> = leaves
                    .iter()
                    .copied()
                    .filter(|&m| adjacent(dir, rect, m))
                    .collect();
                prop_assert_eq!(&got, &expected, "direction {:?} of {:?}", dir, rect);
            }
        }
    }

    #[test]
    fn cardinal_neighbours_are_symmetric(
        actions in prop::collection::vec(any::<Action>(), 1..40)
    ) {
        let test = Test::run(ssf1, actions);
        let mut leaves = Vec::new();
        test.tree.for_each_leaf(|n| leaves.push(n.rect()));

        for &rect in &leaves {
            let node = test.tree.find(rect.x1, rect.y1).expect("leaf corner resolves");
            for dir in Direction::CARDINAL {
                let mut reported = Vec::new();
                test.tree.find_neighbour_leaves(node, dir, |m| reported.push(m.rect()));
                for other in reported {
                    let back = test.tree.find(other.x1, other.y1).expect("leaf corner resolves");
                    let mut sees_us = false;
                    test.tree.find_neighbour_leaves(back, dir.opposite(), |m| {
                        sees_us |= m.rect() == rect;
                    });
                    prop_assert!(sees_us, "{:?} missing from {:?} of {:?}", rect, dir.opposite(), other);
                }
            }
        }
    }
}
