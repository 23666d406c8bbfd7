/// An axis-aligned rectangle of grid cells, stored as the inclusive
/// upper-left corner `(x1, y1)` and lower-right corner `(x2, y2)`.
///
/// `x` indexes rows and `y` indexes columns:
///
/// ```text
///     (x1,y1) +---------------+
///             |               |
///             +---------------+ (x2,y2)
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    #[inline]
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Number of columns spanned.
    #[inline]
    pub fn width(&self) -> i32 {
        self.y2 - self.y1 + 1
    }

    /// Number of rows spanned.
    #[inline]
    pub fn height(&self) -> i32 {
        self.x2 - self.x1 + 1
    }

    /// True for a single-cell rectangle.
    #[inline]
    pub fn is_cell(&self) -> bool {
        self.x1 == self.x2 && self.y1 == self.y2
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Inclusive AABB overlap test.
    #[inline]
    pub fn overlaps(&self, other: Rect) -> bool {
        self.x1 <= other.x2 && self.x2 >= other.x1 && self.y1 <= other.y2 && self.y2 >= other.y1
    }

    /// The canonical midpoint split into up to four quadrants, ordered
    /// NW, NE, SW, SE:
    ///
    /// ```text
    ///     y1    y3       y2
    ///  x1 -+------+------+-
    ///      |  0   |  1   |
    ///  x3  |    * |      |
    ///     -+------+------+-
    ///      |  2   |  3   |
    ///  x2 -+------+------+-
    /// ```
    ///
    /// Quadrants that would be degenerate (a one-row or one-column parent
    /// has only two) come back as `None`.
    pub fn split(&self) -> [Option<Rect>; 4] {
        let Rect { x1, y1, x2, y2 } = *self;
        let x3 = x1 + (x2 - x1) / 2;
        let y3 = y1 + (y2 - y1) / 2;
        let rows = x3 + 1 <= x2;
        let cols = y3 + 1 <= y2;
        [
            Some(Rect::new(x1, y1, x3, y3)),
            cols.then(|| Rect::new(x1, y3 + 1, x3, y2)),
            rows.then(|| Rect::new(x3 + 1, y1, x2, y3)),
            (rows && cols).then(|| Rect::new(x3 + 1, y3 + 1, x2, y2)),
        ]
    }
}
