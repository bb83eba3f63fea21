//! # Registry Service
//!
//! The directory every node registers with on startup. Registration hands
//! back the node's initial overlay neighbours: for each quadrant, the
//! nearest registered node that both nodes can sense.
//!
//! ## Implementations
//!
//! | Registry | Module | Description |
//! |----------|--------|-------------|
//! | `MemoryRegistry` | `memory` | In-process, readers-writer locked |

pub mod memory;

use async_trait::async_trait;

use crate::model::{Direction, NodeDescriptor, Position};
use crate::Result;

pub use memory::MemoryRegistry;

// ============================================================================
// Geographical zones
// ============================================================================

/// A region of the plane, used by `find_by_zone`.
pub trait GeographicalZone: Send + Sync {
    fn contains(&self, position: &Position) -> bool;
}

/// Axis-aligned rectangle, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectangularZone {
    pub min: Position,
    pub max: Position,
}

impl RectangularZone {
    pub fn new(a: Position, b: Position) -> Self {
        Self {
            min: Position::new(a.x.min(b.x), a.y.min(b.y)),
            max: Position::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }
}

impl GeographicalZone for RectangularZone {
    fn contains(&self, p: &Position) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Disc around a centre, boundary inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularZone {
    pub centre: Position,
    pub radius: f64,
}

impl GeographicalZone for CircularZone {
    fn contains(&self, p: &Position) -> bool {
        self.centre.distance(p) <= self.radius
    }
}

/// Any position predicate as a zone.
pub struct PredicateZone<F>(pub F);

impl<F> GeographicalZone for PredicateZone<F>
where
    F: Fn(&Position) -> bool + Send + Sync,
{
    fn contains(&self, p: &Position) -> bool {
        (self.0)(p)
    }
}

// ============================================================================
// RegistryService Trait
// ============================================================================

/// The registry contract.
///
/// Reads may run in parallel; registration and removal are exclusive and
/// neighbour computation observes a consistent snapshot.
#[async_trait]
pub trait RegistryService: Send + Sync + 'static {
    // ========================================================================
    // Membership
    // ========================================================================

    /// Insert `descriptor` and return its neighbours, at most one per
    /// quadrant, in `Direction::ALL` order.
    ///
    /// Fails with `Error::AlreadyRegistered` if the identifier is present.
    async fn register(&self, descriptor: NodeDescriptor) -> Result<Vec<NodeDescriptor>>;

    /// Remove a node. Silent if absent.
    async fn unregister(&self, id: &str) -> Result<()>;

    async fn registered(&self, id: &str) -> Result<bool>;

    // ========================================================================
    // Lookup
    // ========================================================================

    async fn find_by_identifier(&self, id: &str) -> Result<Option<NodeDescriptor>>;

    /// All nodes located in `zone`.
    async fn find_by_zone(&self, zone: &dyn GeographicalZone) -> Result<Vec<NodeDescriptor>>;

    /// Nearest other node in `direction` from `descriptor` within
    /// `descriptor`'s range.
    async fn find_new_neighbour(
        &self,
        descriptor: &NodeDescriptor,
        direction: Direction,
    ) -> Result<Option<NodeDescriptor>>;
}
