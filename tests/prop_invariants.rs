//! Property-based tests for result merging, quadrant geometry, neighbour
//! selection and propagation bounds.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use sensor_mesh::query::ast::*;
use sensor_mesh::{
    Direction, MemoryRegistry, Network, NodeDescriptor, Position, QueryResult, RecordingObserver,
    RegistryService, Request, ResultKind, SensorData, SensorNode,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

fn result_strategy() -> impl Strategy<Value = QueryResult> {
    let kind = prop_oneof![Just(None), Just(Some(ResultKind::Gather)), Just(Some(ResultKind::Boolean))];
    let readings = prop::collection::vec((0..4u8, 0..3u8, 0..5u8), 0..6);
    let positives = prop::collection::vec(0..5u8, 0..4);
    (kind, readings, positives).prop_map(|(kind, readings, positives)| {
        let mut result = QueryResult::new();
        if let Some(kind) = kind {
            result.mark(kind);
        }
        result.add_gathered(
            readings
                .into_iter()
                .map(|(n, s, v)| SensorData::new(format!("n{n}"), format!("s{s}"), v as f64)),
        );
        for n in positives {
            result.add_positive_node(format!("n{n}"));
        }
        result
    })
}

/// Up to `max` nodes on distinct lattice points, scaled so that ranges of a
/// few units give sparse but connected overlays.
fn layout_strategy(max: usize) -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::hash_set((0..12i32, 0..12i32), 2..max).prop_map(|points| {
        points
            .into_iter()
            .map(|(x, y)| (x as f64 * 0.7, y as f64 * 0.6))
            .collect()
    })
}

fn descriptors(layout: &[(f64, f64)], range: f64) -> Vec<NodeDescriptor> {
    layout
        .iter()
        .enumerate()
        .map(|(i, (x, y))| NodeDescriptor::new(format!("v{i:02}"), Position::new(*x, *y), range).unwrap())
        .collect()
}

async fn deploy(
    layout: &[(f64, f64)],
    range: f64,
    observer: Arc<RecordingObserver>,
) -> Vec<SensorNode> {
    let registry = Arc::new(MemoryRegistry::new());
    let network = Network::new();
    let mut nodes = Vec::new();
    for descriptor in descriptors(layout, range) {
        let node = SensorNode::builder(descriptor, registry.clone(), network.clone())
            .sensor("heat", 1.0)
            .observer(observer.clone())
            .build();
        node.publish().unwrap();
        node.join_overlay().await.unwrap();
        nodes.push(node);
    }
    nodes
}

/// Nodes a flood from `nodes[0]` has to reach: the initiator, then every
/// overlay neighbour of a reached node that lies within `radius` of the initiator.
fn flood_closure(nodes: &[SensorNode], radius: f64) -> Vec<String> {
    let anchor = nodes[0].position();
    let by_id: HashMap<&str, &SensorNode> = nodes.iter().map(|n| (n.id(), n)).collect();
    let mut reached = vec![nodes[0].id().to_owned()];
    let mut frontier = vec![&nodes[0]];
    while let Some(node) = frontier.pop() {
        for peer in node.neighbours() {
            if anchor.distance(&peer.position) <= radius && !reached.contains(&peer.id) {
                frontier.push(by_id[peer.id.as_str()]);
                reached.push(peer.id);
            }
        }
    }
    reached.sort();
    reached
}

fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::NE), Just(Direction::NW), Just(Direction::SE), Just(Direction::SW)]
}

// =============================================================================
// Tests without parameters (outside proptest! macro)
// =============================================================================

#[test]
fn prop_merge_with_empty_is_identity() {
    let mut result = QueryResult::new();
    result.mark(ResultKind::Boolean);
    result.add_positive_node("n1");
    assert_eq!(result.clone().merged(&QueryResult::new()), result);
    assert_eq!(QueryResult::new().merged(&result), result);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_merge_is_commutative(a in result_strategy(), b in result_strategy()) {
        prop_assert_eq!(a.clone().merged(&b), b.clone().merged(&a));
    }

    #[test]
    fn prop_merge_is_idempotent(a in result_strategy()) {
        prop_assert_eq!(a.clone().merged(&a), a);
    }

    #[test]
    fn prop_merge_is_associative(a in result_strategy(), b in result_strategy(), c in result_strategy()) {
        let left = a.clone().merged(&b).merged(&c);
        let right = a.merged(&b.merged(&c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn prop_direction_is_antisymmetric(
        ax in -100.0f64..100.0, ay in -100.0f64..100.0,
        bx in -100.0f64..100.0, by in -100.0f64..100.0,
    ) {
        prop_assume!(ax != bx && ay != by);
        let (a, b) = (Position::new(ax, ay), Position::new(bx, by));
        let forward = a.direction_from(&b).unwrap();
        let backward = b.direction_from(&a).unwrap();
        prop_assert_eq!(backward, forward.opposite());
    }

    #[test]
    fn prop_registry_picks_nearest_in_mutual_range(layout in layout_strategy(24), range in 0.8f64..3.0) {
        let all = descriptors(&layout, range);
        runtime().block_on(async {
            let registry = MemoryRegistry::with_chunk_size(4);
            for (i, node) in all.iter().enumerate() {
                let neighbours = registry.register(node.clone()).await.unwrap();
                let mut seen = Vec::new();
                for peer in &neighbours {
                    let quadrant = peer.position.direction_from(&node.position).unwrap();
                    prop_assert!(!seen.contains(&quadrant));
                    seen.push(quadrant);
                    prop_assert!(node.distance(peer) <= range.min(peer.range));
                    // nothing registered earlier is strictly closer in that quadrant
                    for other in &all[..i] {
                        if other.position.direction_from(&node.position) == Some(quadrant)
                            && node.in_mutual_range(other)
                        {
                            prop_assert!(node.distance(other) >= node.distance(peer));
                        }
                    }
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_flood_evaluates_each_node_at_most_once(layout in layout_strategy(14), radius in 0.5f64..6.0) {
        let observer = Arc::new(RecordingObserver::new());
        runtime().block_on(async {
            let nodes = deploy(&layout, 1.6, observer.clone()).await;
            observer.clear();
            let result = nodes[0]
                .query(Request::new(gquery(fgather("heat"), fcont(rbase(), radius))))
                .await
                .unwrap();
            let anchor = nodes[0].position();
            for node in &nodes {
                let evaluations = observer.evaluations(node.id());
                prop_assert!(evaluations <= 1);
                if node.id() != nodes[0].id() && evaluations == 1 {
                    prop_assert!(anchor.distance(&node.position()) <= radius);
                }
            }
            prop_assert_eq!(result.gathered().len(), result.gathered_nodes().len());

            let mut gathered: Vec<String> = result.gathered_nodes().into_iter().map(String::from).collect();
            gathered.sort();
            prop_assert_eq!(gathered, flood_closure(&nodes, radius));
            Ok(())
        })?;
    }

    #[test]
    fn prop_overlay_edges_are_symmetric(layout in layout_strategy(16), range in 1.0f64..4.0) {
        let observer = Arc::new(RecordingObserver::new());
        runtime().block_on(async {
            let nodes = deploy(&layout, range, observer).await;
            let by_id: HashMap<&str, &SensorNode> = nodes.iter().map(|n| (n.id(), n)).collect();
            for node in &nodes {
                for direction in Direction::ALL {
                    if let Some(peer) = node.neighbour(direction) {
                        let back = by_id[peer.id.as_str()].neighbour(direction.opposite()).map(|d| d.id);
                        prop_assert_eq!(back.as_deref(), Some(node.id()));
                    }
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_directional_respects_hop_budget(
        layout in layout_strategy(14),
        first in direction_strategy(),
        second in direction_strategy(),
        max_hops in 0u32..5,
    ) {
        let observer = Arc::new(RecordingObserver::new());
        runtime().block_on(async {
            let nodes = deploy(&layout, 1.6, observer.clone()).await;
            let query = gquery(fgather("heat"), dcont(rdirs(first, fdirs(second)), max_hops));
            let result = nodes[0].query(Request::new(query)).await.unwrap();
            prop_assert!(result.gathered_nodes().len() as u32 <= max_hops + 1);
            prop_assert_eq!(result.gathered_nodes()[0], nodes[0].id());
            Ok(())
        })?;
    }
}
