//! Outbound overlay slots, one per quadrant.
//!
//! Each slot is `Empty` or `Connected(peer)` behind its own lock. Guards
//! never escape these methods, so no lock is held across a remote call.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{Direction, NodeDescriptor};
use crate::network::SensorNodeP2P;

/// An open overlay edge.
#[derive(Clone)]
pub(crate) struct PeerLink {
    pub descriptor: NodeDescriptor,
    pub handle: Arc<dyn SensorNodeP2P>,
}

#[derive(Default)]
pub(crate) struct QuadrantSlots {
    slots: [RwLock<Option<PeerLink>>; 4],
}

impl QuadrantSlots {
    pub fn get(&self, direction: Direction) -> Option<PeerLink> {
        self.slots[direction.index()].read().clone()
    }

    /// Install `link`, returning the edge it displaced.
    pub fn replace(&self, direction: Direction, link: PeerLink) -> Option<PeerLink> {
        self.slots[direction.index()].write().replace(link)
    }

    pub fn clear(&self, direction: Direction) -> Option<PeerLink> {
        self.slots[direction.index()].write().take()
    }

    /// Empty the slot only if it still holds `peer_id`.
    pub fn clear_if(&self, direction: Direction, peer_id: &str) -> Option<PeerLink> {
        let mut slot = self.slots[direction.index()].write();
        if slot.as_ref().is_some_and(|link| link.descriptor.id == peer_id) {
            slot.take()
        } else {
            None
        }
    }

    /// Connected slots in `Direction::ALL` order.
    pub fn snapshot(&self) -> Vec<(Direction, PeerLink)> {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.get(d).map(|link| (d, link)))
            .collect()
    }

    pub fn drain(&self) -> Vec<(Direction, PeerLink)> {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.clear(d).map(|link| (d, link)))
            .collect()
    }

    pub fn neighbours(&self) -> Vec<NodeDescriptor> {
        self.snapshot().into_iter().map(|(_, link)| link.descriptor).collect()
    }
}
