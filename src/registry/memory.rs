//! In-memory registry.
//!
//! Descriptors live in a `BTreeMap` keyed by identifier behind a single
//! `RwLock`. Neighbour computation for a new node splits the registered
//! nodes into fixed-size chunks, scans the chunks on a bounded rayon pool
//! and reduces the per-chunk winners. Ties on distance break by ascending
//! identifier, so the outcome does not depend on chunking or scheduling.
//! A chunk whose scan panics fails the registration.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::{GeographicalZone, RegistryService};
use crate::model::{Direction, NodeDescriptor};
use crate::{Error, Result};

/// Nodes handed to one scan worker.
pub const DEFAULT_CHUNK_SIZE: usize = 32;

/// Threads in the scan pool.
pub const DEFAULT_SCAN_WORKERS: usize = 4;

// ============================================================================
// MemoryRegistry
// ============================================================================

/// In-process node directory.
#[derive(Clone)]
pub struct MemoryRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    nodes: RwLock<BTreeMap<String, NodeDescriptor>>,
    chunk_size: usize,
    scan_workers: usize,
    /// Built by the first scan that spans more than one chunk.
    scan_pool: OnceLock<Option<ThreadPool>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_scan_pool(DEFAULT_CHUNK_SIZE, DEFAULT_SCAN_WORKERS)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self::with_scan_pool(chunk_size, DEFAULT_SCAN_WORKERS)
    }

    /// Scan chunks of `chunk_size` nodes on at most `workers` threads.
    pub fn with_scan_pool(chunk_size: usize, workers: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                nodes: RwLock::new(BTreeMap::new()),
                chunk_size: chunk_size.max(1),
                scan_workers: workers.max(1),
                scan_pool: OnceLock::new(),
            }),
        }
    }

    /// Without a pool, chunks are scanned on the caller's thread.
    fn scan_pool(&self) -> Option<&ThreadPool> {
        self.inner
            .scan_pool
            .get_or_init(|| {
                let built = ThreadPoolBuilder::new()
                    .num_threads(self.inner.scan_workers)
                    .thread_name(|i| format!("registry-scan-{i}"))
                    .build();
                match built {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        warn!(error = %e, "scan pool unavailable, scanning inline");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Up to four neighbours of `node` among `candidates`, in `Direction::ALL` order.
    fn compute_neighbours(
        &self,
        node: &NodeDescriptor,
        candidates: &[&NodeDescriptor],
    ) -> Result<Vec<NodeDescriptor>> {
        let chunk_size = self.inner.chunk_size;
        if candidates.len() <= chunk_size {
            return Ok(scan_chunk(node, candidates).into_neighbours());
        }
        let best = scan_chunks(self.scan_pool(), candidates, chunk_size, |chunk| scan_chunk(node, chunk))?;
        Ok(best.into_neighbours())
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Neighbour scan
// ============================================================================

/// Best candidate per quadrant, indexed by `Direction::index`.
#[derive(Default)]
struct QuadrantBest<'a> {
    slots: [Option<(f64, &'a NodeDescriptor)>; 4],
}

impl<'a> QuadrantBest<'a> {
    fn offer(&mut self, direction: Direction, distance: f64, candidate: &'a NodeDescriptor) {
        let slot = &mut self.slots[direction.index()];
        let better = match slot {
            None => true,
            Some((best, current)) => {
                distance < *best || (distance == *best && candidate.id < current.id)
            }
        };
        if better {
            *slot = Some((distance, candidate));
        }
    }

    fn absorb(&mut self, other: QuadrantBest<'a>) {
        for direction in Direction::ALL {
            if let Some((distance, candidate)) = other.slots[direction.index()] {
                self.offer(direction, distance, candidate);
            }
        }
    }

    fn into_neighbours(self) -> Vec<NodeDescriptor> {
        self.slots.into_iter().flatten().map(|(_, d)| d.clone()).collect()
    }
}

fn scan_chunk<'a>(node: &NodeDescriptor, chunk: &[&'a NodeDescriptor]) -> QuadrantBest<'a> {
    let mut best = QuadrantBest::default();
    for &candidate in chunk {
        if candidate.id == node.id || !node.in_mutual_range(candidate) {
            continue;
        }
        if let Some(direction) = candidate.position.direction_from(&node.position) {
            best.offer(direction, node.distance(candidate), candidate);
        }
    }
    best
}

/// Reduce the per-chunk winners of `scan` over `candidates`.
fn scan_chunks<'a, F>(
    pool: Option<&ThreadPool>,
    candidates: &[&'a NodeDescriptor],
    chunk_size: usize,
    scan: F,
) -> Result<QuadrantBest<'a>>
where
    F: Fn(&[&'a NodeDescriptor]) -> QuadrantBest<'a> + Sync,
{
    let guarded = |chunk: &[&'a NodeDescriptor]| {
        panic::catch_unwind(AssertUnwindSafe(|| scan(chunk))).map_err(|_| {
            Error::Overlay(format!("neighbour scan failed on a chunk of {} nodes", chunk.len()))
        })
    };
    let partials: Vec<Result<QuadrantBest<'a>>> = match pool {
        Some(pool) => pool.install(|| candidates.par_chunks(chunk_size).map(guarded).collect()),
        None => candidates.chunks(chunk_size).map(guarded).collect(),
    };
    let mut best = QuadrantBest::default();
    for partial in partials {
        best.absorb(partial?);
    }
    Ok(best)
}

// ============================================================================
// RegistryService impl
// ============================================================================

#[async_trait]
impl RegistryService for MemoryRegistry {
    async fn register(&self, descriptor: NodeDescriptor) -> Result<Vec<NodeDescriptor>> {
        let mut nodes = self.inner.nodes.write();
        if nodes.contains_key(&descriptor.id) {
            return Err(Error::AlreadyRegistered(descriptor.id));
        }
        let scanned = {
            let candidates: Vec<&NodeDescriptor> = nodes.values().collect();
            self.compute_neighbours(&descriptor, &candidates)
        };
        let neighbours = match scanned {
            Ok(neighbours) => neighbours,
            Err(e) => {
                warn!(node = %descriptor.id, error = %e, "registration aborted");
                return Err(e);
            }
        };
        info!(
            node = %descriptor.id,
            position = %descriptor.position,
            neighbours = neighbours.len(),
            "node registered"
        );
        nodes.insert(descriptor.id.clone(), descriptor);
        Ok(neighbours)
    }

    async fn unregister(&self, id: &str) -> Result<()> {
        if self.inner.nodes.write().remove(id).is_some() {
            info!(node = %id, "node unregistered");
        }
        Ok(())
    }

    async fn registered(&self, id: &str) -> Result<bool> {
        Ok(self.inner.nodes.read().contains_key(id))
    }

    async fn find_by_identifier(&self, id: &str) -> Result<Option<NodeDescriptor>> {
        Ok(self.inner.nodes.read().get(id).cloned())
    }

    async fn find_by_zone(&self, zone: &dyn GeographicalZone) -> Result<Vec<NodeDescriptor>> {
        Ok(self
            .inner
            .nodes
            .read()
            .values()
            .filter(|d| zone.contains(&d.position))
            .cloned()
            .collect())
    }

    async fn find_new_neighbour(
        &self,
        descriptor: &NodeDescriptor,
        direction: Direction,
    ) -> Result<Option<NodeDescriptor>> {
        let nodes = self.inner.nodes.read();
        let mut best: Option<(f64, &NodeDescriptor)> = None;
        for candidate in nodes.values() {
            if candidate.id == descriptor.id
                || candidate.position.direction_from(&descriptor.position) != Some(direction)
            {
                continue;
            }
            let distance = descriptor.distance(candidate);
            if distance > descriptor.range {
                continue;
            }
            // Values are visited in identifier order, so strict `<` keeps the smallest id on ties.
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, candidate));
            }
        }
        let found = best.map(|(_, d)| d.clone());
        debug!(
            node = %descriptor.id,
            quadrant = %direction,
            found = ?found.as_ref().map(|d| d.id.as_str()),
            "replacement neighbour lookup"
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::registry::RectangularZone;
    use pretty_assertions::assert_eq;

    fn node(id: &str, x: f64, y: f64, range: f64) -> NodeDescriptor {
        NodeDescriptor::new(id, Position::new(x, y), range).unwrap()
    }

    fn ids(nodes: &[NodeDescriptor]) -> Vec<&str> {
        nodes.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_register_returns_nearest_per_quadrant() {
        let registry = MemoryRegistry::new();
        for d in [
            node("ne-far", 4.0, 4.0, 10.0),
            node("ne-near", 1.0, 1.0, 10.0),
            node("nw", -2.0, 1.0, 10.0),
            node("axis", 0.0, 3.0, 10.0),
        ] {
            registry.register(d).await.unwrap();
        }
        let neighbours = registry.register(node("me", 0.0, 0.0, 10.0)).await.unwrap();
        assert_eq!(ids(&neighbours), vec!["ne-near", "nw"]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let registry = MemoryRegistry::new();
        registry.register(node("n1", 0.0, 0.0, 1.0)).await.unwrap();
        let err = registry.register(node("n1", 5.0, 5.0, 1.0)).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(id) if id == "n1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_range_is_mutual() {
        let registry = MemoryRegistry::new();
        registry.register(node("short", 3.0, 3.0, 1.0)).await.unwrap();
        let neighbours = registry.register(node("long", 0.0, 0.0, 10.0)).await.unwrap();
        assert!(neighbours.is_empty());
    }

    #[tokio::test]
    async fn test_ties_break_by_identifier() {
        let registry = MemoryRegistry::new();
        registry.register(node("b", 1.0, 2.0, 10.0)).await.unwrap();
        registry.register(node("a", 2.0, 1.0, 10.0)).await.unwrap();
        let neighbours = registry.register(node("me", 0.0, 0.0, 10.0)).await.unwrap();
        assert_eq!(ids(&neighbours), vec!["a"]);
    }

    #[tokio::test]
    async fn test_chunked_scan_matches_single_chunk() {
        let chunked = MemoryRegistry::with_chunk_size(3);
        let single = MemoryRegistry::with_chunk_size(1000);
        for i in 0..40 {
            let angle = i as f64 * 0.7;
            let radius = 1.0 + (i % 7) as f64;
            let d = node(&format!("n{i:02}"), radius * angle.cos(), radius * angle.sin(), 6.0);
            chunked.register(d.clone()).await.unwrap();
            single.register(d).await.unwrap();
        }
        let me = node("me", 0.25, 0.5, 6.0);
        let a = chunked.register(me.clone()).await.unwrap();
        let b = single.register(me).await.unwrap();
        assert_eq!(ids(&a), ids(&b));
        assert!(!a.is_empty());
    }

    #[test]
    fn test_panicking_chunk_fails_the_scan() {
        let registry = MemoryRegistry::with_scan_pool(2, 2);
        let nodes: Vec<NodeDescriptor> =
            (0..6).map(|i| node(&format!("n{i}"), 1.0 + i as f64, 1.0, 10.0)).collect();
        let candidates: Vec<&NodeDescriptor> = nodes.iter().collect();
        let me = node("me", 0.0, 0.0, 10.0);

        for pool in [registry.scan_pool(), None] {
            let failed = scan_chunks(pool, &candidates, 2, |chunk| {
                if chunk.iter().any(|d| d.id == "n3") {
                    panic!("corrupt descriptor");
                }
                scan_chunk(&me, chunk)
            });
            assert!(matches!(failed, Err(Error::Overlay(_))));

            let best = scan_chunks(pool, &candidates, 2, |chunk| scan_chunk(&me, chunk)).unwrap();
            assert_eq!(ids(&best.into_neighbours()), vec!["n0"]);
        }
    }

    #[tokio::test]
    async fn test_lookup_and_unregister() {
        let registry = MemoryRegistry::new();
        registry.register(node("n1", 0.0, 0.0, 1.0)).await.unwrap();
        assert!(registry.registered("n1").await.unwrap());
        assert_eq!(registry.find_by_identifier("n1").await.unwrap().unwrap().id, "n1");

        registry.unregister("n1").await.unwrap();
        registry.unregister("n1").await.unwrap();
        assert!(!registry.registered("n1").await.unwrap());
        assert!(registry.find_by_identifier("n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_zone() {
        let registry = MemoryRegistry::new();
        for d in [node("a", 0.0, 0.0, 1.0), node("b", 5.0, 5.0, 1.0), node("c", 1.0, 1.0, 1.0)] {
            registry.register(d).await.unwrap();
        }
        let zone = RectangularZone::new(Position::new(-1.0, -1.0), Position::new(2.0, 2.0));
        let found = registry.find_by_zone(&zone).await.unwrap();
        assert_eq!(ids(&found), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_find_new_neighbour_uses_own_range_only() {
        let registry = MemoryRegistry::new();
        registry.register(node("tiny", 2.0, 2.0, 0.5)).await.unwrap();
        registry.register(node("far", 9.0, 9.0, 50.0)).await.unwrap();
        let me = node("me", 0.0, 0.0, 5.0);
        registry.register(me.clone()).await.unwrap();

        let found = registry.find_new_neighbour(&me, Direction::NE).await.unwrap();
        assert_eq!(found.map(|d| d.id), Some("tiny".to_string()));
        assert!(registry.find_new_neighbour(&me, Direction::SW).await.unwrap().is_none());
    }
}
