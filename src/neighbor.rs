use crate::ChildIndex;

/// A direction from a node towards its neighbours.
///
/// The four cardinal directions name a shared edge, the four diagonal ones a
/// shared corner. Discriminants are chosen so that the opposite of a
/// direction is its value XOR 2.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    NorthWest = 4,
    NorthEast = 5,
    SouthEast = 6,
    SouthWest = 7,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::NorthWest,
        Direction::NorthEast,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    pub const CARDINAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    #[inline]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
            Direction::NorthEast => Direction::SouthWest,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
        }
    }

    #[inline]
    pub(crate) fn is_cardinal(self) -> bool {
        (self as u8) < 4
    }
}

/// Which children to descend into when collecting the leaves along one edge
/// of a subtree.
///
/// The outer index is a 3-bit presence flag over children 0, 1, 2 (bit 0 set
/// when child 0 exists, and so on; child 3's presence is implied). The inner
/// index is the cardinal edge being collected. Only four flag values occur in
/// a well-formed tree: 0b001 (the lone NW child of a parent that could not
/// split either axis), 0b011 (a one-row parent), 0b101 (a one-column parent)
/// and 0b111 (a full split). The rest stay empty and are never hit.
pub(crate) const EDGE_DESCENT: [[&[ChildIndex]; 4]; 8] = [
    [&[], &[], &[], &[]],
    [&[0], &[0], &[0], &[0]],
    [&[], &[], &[], &[]],
    [&[0, 1], &[1], &[0, 1], &[0]],
    [&[], &[], &[], &[]],
    [&[0], &[0, 2], &[2], &[0, 2]],
    [&[], &[], &[], &[]],
    [&[0, 1], &[1, 3], &[2, 3], &[0, 2]],
];
