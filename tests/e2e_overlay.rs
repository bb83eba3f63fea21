//! Overlay construction and upkeep: registration, reciprocal edges,
//! displacement, replacement and departure.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sensor_mesh::execution::ExecutionState;
use sensor_mesh::query::ast::*;
use sensor_mesh::registry::CircularZone;
use sensor_mesh::{
    Direction, Error, MemoryRegistry, Network, NodeDescriptor, Position, RecordingObserver,
    RegistryService, Request, RequestContinuation, SensorNode, SensorNodeP2P,
};

// ============================================================================
// Setup
// ============================================================================

struct Overlay {
    registry: Arc<MemoryRegistry>,
    network: Network,
    observer: Arc<RecordingObserver>,
    nodes: Vec<SensorNode>,
}

impl Overlay {
    async fn build(layout: &[(&str, f64, f64)], range: f64) -> Self {
        let mut overlay = Self {
            registry: Arc::new(MemoryRegistry::new()),
            network: Network::new(),
            observer: Arc::new(RecordingObserver::new()),
            nodes: Vec::new(),
        };
        for (id, x, y) in layout {
            let descriptor = NodeDescriptor::new(*id, Position::new(*x, *y), range).unwrap();
            let node = SensorNode::builder(descriptor, overlay.registry.clone(), overlay.network.clone())
                .sensor("heat", *x)
                .observer(overlay.observer.clone())
                .build();
            node.publish().unwrap();
            node.join_overlay().await.unwrap();
            overlay.nodes.push(node);
        }
        overlay
    }

    fn node(&self, id: &str) -> &SensorNode {
        self.nodes.iter().find(|n| n.id() == id).unwrap()
    }

    fn neighbour(&self, id: &str, direction: Direction) -> Option<String> {
        self.node(id).neighbour(direction).map(|d| d.id)
    }

    fn has_edge(&self, from: &str, to: &str) -> bool {
        self.observer.connections().contains(&(from.to_string(), to.to_string()))
    }

    /// Every slot edge has its reverse edge in the opposite quadrant.
    fn assert_symmetric(&self) {
        for node in &self.nodes {
            for direction in Direction::ALL {
                if let Some(peer) = node.neighbour(direction) {
                    assert_eq!(
                        self.neighbour(&peer.id, direction.opposite()).as_deref(),
                        Some(node.id()),
                        "{} -{direction}-> {} has no reverse edge",
                        node.id(),
                        peer.id
                    );
                }
            }
        }
    }
}

const PATH: [(&str, f64, f64); 3] = [("a", 0.0, 0.0), ("b", 1.0, 1.0), ("c", 2.0, 2.0)];
const RING: [(&str, f64, f64); 4] = [("p0", 0.0, 0.0), ("p1", 2.0, 1.0), ("p2", 1.0, 3.0), ("p3", -1.0, 2.0)];

// ============================================================================
// 1. Joining
// ============================================================================

#[tokio::test]
async fn test_join_opens_reciprocal_edges() {
    let overlay = Overlay::build(&PATH, 5.0).await;
    assert_eq!(overlay.neighbour("a", Direction::NE).as_deref(), Some("b"));
    assert_eq!(overlay.neighbour("b", Direction::SW).as_deref(), Some("a"));
    assert_eq!(overlay.neighbour("b", Direction::NE).as_deref(), Some("c"));
    assert_eq!(overlay.neighbour("c", Direction::SW).as_deref(), Some("b"));
    assert!(overlay.has_edge("a", "b") && overlay.has_edge("b", "a"));
    assert_eq!(overlay.registry.len(), 3);
}

#[tokio::test]
async fn test_displaced_peer_drops_reverse_edge() {
    let overlay = Overlay::build(&RING[..3], 5.0).await;
    // p2 took p0's NE slot from p1
    assert_eq!(overlay.neighbour("p0", Direction::NE).as_deref(), Some("p2"));
    assert!(overlay.neighbour("p1", Direction::SW).is_none());
    assert!(!overlay.has_edge("p0", "p1"));
    assert!(!overlay.has_edge("p1", "p0"));
    assert_eq!(overlay.neighbour("p1", Direction::NW).as_deref(), Some("p2"));
    overlay.assert_symmetric();
}

#[tokio::test]
async fn test_ring_edges_are_symmetric() {
    let overlay = Overlay::build(&RING, 5.0).await;
    overlay.assert_symmetric();
    // p3 took p2's SW slot from p0, which kept only its NW edge to p3
    assert_eq!(overlay.neighbour("p2", Direction::SW).as_deref(), Some("p3"));
    assert_eq!(overlay.neighbour("p2", Direction::SE).as_deref(), Some("p1"));
    assert_eq!(overlay.neighbour("p3", Direction::SE).as_deref(), Some("p0"));
    let p0: Vec<String> = overlay.node("p0").neighbours().into_iter().map(|d| d.id).collect();
    assert_eq!(p0, vec!["p3"]);

    let mut edges = overlay.observer.connections();
    edges.sort();
    let expected: Vec<(String, String)> = [
        ("p0", "p3"), ("p1", "p2"), ("p2", "p1"), ("p2", "p3"), ("p3", "p0"), ("p3", "p2"),
    ]
    .into_iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();
    assert_eq!(edges, expected);
}

#[tokio::test]
async fn test_neighbour_invariants_hold_on_grid() {
    let mut layout = Vec::new();
    for i in 0..6 {
        for j in 0..6 {
            let x = i as f64 * 1.3 + if j % 2 == 0 { 0.0 } else { 0.6 };
            let y = j as f64 * 1.1 + i as f64 * 0.05;
            layout.push((format!("g{i}{j}"), x, y));
        }
    }
    let layout: Vec<(&str, f64, f64)> = layout.iter().map(|(id, x, y)| (id.as_str(), *x, *y)).collect();
    let overlay = Overlay::build(&layout, 2.0).await;

    for node in &overlay.nodes {
        for direction in Direction::ALL {
            if let Some(peer) = node.neighbour(direction) {
                assert!(node.descriptor().distance(&peer) <= 2.0);
                assert_eq!(peer.position.direction_from(&node.position()), Some(direction));
            }
        }
    }
    overlay.assert_symmetric();
}

#[tokio::test]
async fn test_duplicate_identifier_stays_out() {
    let overlay = Overlay::build(&PATH, 5.0).await;
    let clone = NodeDescriptor::new("b", Position::new(9.0, 9.0), 5.0).unwrap();
    let registry: Arc<dyn RegistryService> = overlay.registry.clone();
    let impostor = SensorNode::builder(clone, registry, Network::new()).build();

    let err = impostor.join_overlay().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRegistered(id) if id == "b"));
    assert!(impostor.neighbours().is_empty());
}

#[tokio::test]
async fn test_find_by_zone() {
    let overlay = Overlay::build(&RING, 5.0).await;
    let zone = CircularZone { centre: Position::new(0.0, 1.0), radius: 1.5 };
    let found = overlay.registry.find_by_zone(&zone).await.unwrap();
    let ids: Vec<String> = found.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["p0", "p3"]);
}

// ============================================================================
// 2. Leaving
// ============================================================================

#[tokio::test]
async fn test_leaving_node_is_replaced() {
    let overlay = Overlay::build(&PATH, 5.0).await;
    let b = overlay.node("b");
    b.leave_overlay().await.unwrap();

    assert!(!overlay.registry.registered("b").await.unwrap());
    assert!(!overlay.network.is_published(&b.descriptor().p2p));
    assert!(b.neighbours().is_empty());
    assert_eq!(overlay.neighbour("a", Direction::NE).as_deref(), Some("c"));
    assert_eq!(overlay.neighbour("c", Direction::SW).as_deref(), Some("a"));

    let result = overlay
        .node("a")
        .query(Request::new(gquery(fgather("heat"), fcont(rbase(), 5.0))))
        .await
        .unwrap();
    assert_eq!(result.gathered_nodes(), vec!["a", "c"]);
}

#[tokio::test]
async fn test_leaving_end_of_path_leaves_slot_empty() {
    let overlay = Overlay::build(&PATH, 5.0).await;
    overlay.node("c").leave_overlay().await.unwrap();
    assert!(overlay.neighbour("b", Direction::NE).is_none());
    assert!(!overlay.has_edge("b", "c"));
}

#[tokio::test]
async fn test_departed_node_refuses_peer_calls() {
    let overlay = Overlay::build(&PATH, 5.0).await;
    let b = overlay.node("b");
    b.leave_overlay().await.unwrap();

    let request = Request::new(gquery(fgather("heat"), econt()));
    let continuation = RequestContinuation::new(request, ExecutionState::new(false));
    assert!(matches!(SensorNodeP2P::execute(b, continuation).await, Err(Error::Transport(_))));

    let a = overlay.node("a").descriptor().clone();
    assert!(matches!(b.ask4_connection(a).await, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_disconnection_from_stranger_is_ignored() {
    let overlay = Overlay::build(&PATH, 5.0).await;
    let stranger = NodeDescriptor::new("x", Position::new(1.5, 1.5), 5.0).unwrap();
    overlay.node("a").ask4_disconnection(stranger).await.unwrap();
    assert_eq!(overlay.neighbour("a", Direction::NE).as_deref(), Some("b"));
}

#[tokio::test]
async fn test_departure_leaves_no_stale_edge() {
    let overlay = Overlay::build(&RING, 5.0).await;
    overlay.node("p2").leave_overlay().await.unwrap();

    // p1 replaced p2 with p3, which in turn displaced p0
    assert_eq!(overlay.neighbour("p1", Direction::NW).as_deref(), Some("p3"));
    assert_eq!(overlay.neighbour("p3", Direction::SE).as_deref(), Some("p1"));
    assert!(overlay.node("p0").neighbours().is_empty());
    for node in overlay.nodes.iter().filter(|n| n.id() != "p2") {
        assert!(node.neighbours().iter().all(|d| d.id != "p2"), "{} still holds p2", node.id());
        assert!(!overlay.has_edge(node.id(), "p2"));
    }
    overlay.assert_symmetric();

    let result = overlay
        .node("p1")
        .query(Request::new(gquery(fgather("heat"), fcont(rbase(), 10.0))))
        .await
        .unwrap();
    assert_eq!(result.gathered_nodes(), vec!["p1", "p3"]);
}
