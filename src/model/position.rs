//! Planar coordinates and the four-quadrant relation between them.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A point on the simulation plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance.
    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Quadrant in which `self` lies as seen from `other`.
    ///
    /// Comparisons are strict: sharing an x or y coordinate with `other`
    /// places `self` in no quadrant at all.
    pub fn direction_from(&self, other: &Position) -> Option<Direction> {
        use std::cmp::Ordering::{Greater, Less};
        match (self.x.partial_cmp(&other.x)?, self.y.partial_cmp(&other.y)?) {
            (Greater, Greater) => Some(Direction::NE),
            (Less, Greater) => Some(Direction::NW),
            (Greater, Less) => Some(Direction::SE),
            (Less, Less) => Some(Direction::SW),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ============================================================================
// Direction
// ============================================================================

/// One of the four overlay quadrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    NE,
    NW,
    SE,
    SW,
}

impl Direction {
    /// Fixed iteration order used by directional propagation and slot scans.
    pub const ALL: [Direction; 4] = [Direction::NE, Direction::NW, Direction::SE, Direction::SW];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::NE => Direction::SW,
            Direction::NW => Direction::SE,
            Direction::SE => Direction::NW,
            Direction::SW => Direction::NE,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::NE => 0,
            Direction::NW => 1,
            Direction::SE => 2,
            Direction::SW => 3,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::NE => "NE",
            Direction::NW => "NW",
            Direction::SE => "SE",
            Direction::SW => "SW",
        };
        f.write_str(name)
    }
}

// ============================================================================
// DirectionSet
// ============================================================================

/// A set of quadrants, always iterated in `Direction::ALL` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionSet(SmallVec<[Direction; 4]>);

impl DirectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(direction: Direction) -> Self {
        let mut set = Self::new();
        set.insert(direction);
        set
    }

    /// Returns false if the direction was already present.
    pub fn insert(&mut self, direction: Direction) -> bool {
        match self.0.binary_search(&direction) {
            Ok(_) => false,
            Err(at) => {
                self.0.insert(at, direction);
                true
            }
        }
    }

    pub fn union(&mut self, other: &DirectionSet) {
        for d in other.iter() {
            self.insert(d);
        }
    }

    pub fn contains(&self, direction: Direction) -> bool {
        self.0.binary_search(&direction).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut set = Self::new();
        for d in iter {
            set.insert(d);
        }
        set
    }
}

impl fmt::Display for DirectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, d) in self.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{d}")?;
        }
        write!(f, "}}")
    }
}
