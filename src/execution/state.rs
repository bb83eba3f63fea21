//! Per-request evaluation context.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{QueryResult, ResultKind};
use crate::model::{DirectionSet, NodeDescriptor, Position, SensorData};
use crate::query::Request;
use crate::{Error, Result};

// ============================================================================
// ProcessingNode
// ============================================================================

/// What the evaluator may see of the node currently running the query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingNode {
    pub id: String,
    pub position: Position,
    pub neighbours: Vec<NodeDescriptor>,
    pub sensors: HashMap<String, SensorData>,
}

impl ProcessingNode {
    pub fn new(
        id: impl Into<String>,
        position: Position,
        neighbours: Vec<NodeDescriptor>,
        sensors: impl IntoIterator<Item = SensorData>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            neighbours,
            sensors: sensors.into_iter().map(|s| (s.sensor_id.clone(), s)).collect(),
        }
    }

    pub fn sensor(&self, sensor_id: &str) -> Result<&SensorData> {
        self.sensors.get(sensor_id).ok_or_else(|| Error::NoSuchSensor {
            node: self.id.clone(),
            sensor: sensor_id.to_owned(),
        })
    }
}

// ============================================================================
// PropagationMode
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PropagationMode {
    #[default]
    Unset,
    Flooding { anchor: Position, max_distance: f64 },
    Directional { directions: DirectionSet, max_hops: u32 },
}

// ============================================================================
// ExecutionState
// ============================================================================

/// Mutable context of one request on one node.
///
/// Cloning deep-copies the result and the direction set and shares the
/// processing-node view, which each receiving node replaces with its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(skip)]
    processing_node: Arc<ProcessingNode>,
    result: QueryResult,
    mode: PropagationMode,
    /// Number of nodes that evaluated a directional continuation so far.
    hops: u32,
    continuation: bool,
    asynchronous: bool,
}

impl ExecutionState {
    pub fn new(asynchronous: bool) -> Self {
        Self { asynchronous, ..Self::default() }
    }

    pub fn for_request(request: &Request) -> Self {
        Self::new(request.asynchronous)
    }

    pub fn processing_node(&self) -> &ProcessingNode {
        &self.processing_node
    }

    pub fn set_processing_node(&mut self, node: Arc<ProcessingNode>) {
        self.processing_node = node;
    }

    pub fn is_asynchronous(&self) -> bool { self.asynchronous }

    // ---- result ------------------------------------------------------------

    pub fn result(&self) -> &QueryResult { &self.result }
    pub fn into_result(self) -> QueryResult { self.result }

    pub fn add_to_current_result(&mut self, other: &QueryResult) {
        self.result.merge(other);
    }

    pub fn add_gathered(&mut self, data: Vec<SensorData>) {
        self.result.add_gathered(data);
    }

    pub fn add_positive_node(&mut self, id: impl Into<String>) {
        self.result.add_positive_node(id);
    }

    pub fn mark_result(&mut self, kind: ResultKind) {
        self.result.mark(kind);
    }

    pub fn reset_result(&mut self) {
        self.result = QueryResult::new();
    }

    /// Copy for handing to a neighbour, optionally with an empty result.
    pub fn fork(&self, reset_result: bool) -> Self {
        let mut copy = self.clone();
        if reset_result {
            copy.reset_result();
        }
        copy
    }

    // ---- continuation ------------------------------------------------------

    pub fn is_continuation_set(&self) -> bool { self.continuation }

    pub fn clear_continuation(&mut self) {
        self.continuation = false;
    }

    pub fn mode(&self) -> &PropagationMode { &self.mode }
    pub fn is_flooding(&self) -> bool { matches!(self.mode, PropagationMode::Flooding { .. }) }
    pub fn is_directional(&self) -> bool { matches!(self.mode, PropagationMode::Directional { .. }) }

    /// Switch to directional mode and count this node as a hop.
    pub fn set_directional(&mut self, directions: DirectionSet, max_hops: u32) {
        self.continuation = true;
        self.mode = PropagationMode::Directional { directions, max_hops };
        self.hops += 1;
    }

    /// Switch to flooding mode. An anchor installed upstream is kept.
    pub fn set_flooding(&mut self, anchor: Position, max_distance: f64) {
        self.continuation = true;
        if !self.is_flooding() {
            self.mode = PropagationMode::Flooding { anchor, max_distance };
        }
    }

    // ---- directional -------------------------------------------------------

    pub fn directions(&self) -> Option<&DirectionSet> {
        match &self.mode {
            PropagationMode::Directional { directions, .. } => Some(directions),
            _ => None,
        }
    }

    pub fn max_hops(&self) -> Option<u32> {
        match self.mode {
            PropagationMode::Directional { max_hops, .. } => Some(max_hops),
            _ => None,
        }
    }

    pub fn hops(&self) -> u32 { self.hops }

    /// Edges crossed since the initiator.
    pub fn hops_travelled(&self) -> u32 {
        self.hops.saturating_sub(1)
    }

    pub fn no_more_hops(&self) -> bool {
        match self.max_hops() {
            Some(max) => self.hops_travelled() >= max,
            None => true,
        }
    }

    // ---- flooding ----------------------------------------------------------

    pub fn anchor(&self) -> Option<Position> {
        match self.mode {
            PropagationMode::Flooding { anchor, .. } => Some(anchor),
            _ => None,
        }
    }

    pub fn max_distance(&self) -> Option<f64> {
        match self.mode {
            PropagationMode::Flooding { max_distance, .. } => Some(max_distance),
            _ => None,
        }
    }

    pub fn within_flood_radius(&self, position: &Position) -> bool {
        match self.mode {
            PropagationMode::Flooding { anchor, max_distance } => anchor.distance(position) <= max_distance,
            _ => false,
        }
    }
}

// ============================================================================
// RequestContinuation
// ============================================================================

/// A request forwarded to a peer together with the sender's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContinuation {
    pub request: Request,
    pub state: ExecutionState,
}

impl RequestContinuation {
    pub fn new(request: Request, state: ExecutionState) -> Self {
        Self { request, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;

    #[test]
    fn test_hop_budget() {
        let mut state = ExecutionState::new(false);
        assert!(state.no_more_hops());

        state.set_directional(DirectionSet::single(Direction::NE), 2);
        assert_eq!(state.hops_travelled(), 0);
        assert!(!state.no_more_hops());

        state.set_directional(DirectionSet::single(Direction::NE), 2);
        assert!(!state.no_more_hops());

        state.set_directional(DirectionSet::single(Direction::NE), 2);
        assert_eq!(state.hops(), 3);
        assert!(state.no_more_hops());
    }

    #[test]
    fn test_flood_anchor_is_kept() {
        let mut state = ExecutionState::new(false);
        state.set_flooding(Position::new(0.0, 0.0), 3.0);
        state.set_flooding(Position::new(10.0, 10.0), 30.0);
        assert_eq!(state.anchor(), Some(Position::new(0.0, 0.0)));
        assert_eq!(state.max_distance(), Some(3.0));
        assert!(state.within_flood_radius(&Position::new(3.0, 0.0)));
        assert!(!state.within_flood_radius(&Position::new(3.0, 0.1)));
    }

    #[test]
    fn test_fork_isolates_result() {
        let mut state = ExecutionState::new(true);
        state.mark_result(ResultKind::Boolean);
        state.add_positive_node("n1");

        let mut reset = state.fork(true);
        assert!(reset.result().is_empty());
        assert!(reset.is_asynchronous());
        reset.add_positive_node("n2");

        let kept = state.fork(false);
        assert_eq!(kept.result().positive_nodes(), ["n1".to_string()]);
        assert_eq!(state.result().positive_nodes(), ["n1".to_string()]);
    }

    #[test]
    fn test_missing_sensor() {
        let node = ProcessingNode::new("n1", Position::new(0.0, 0.0), vec![], vec![]);
        assert!(matches!(node.sensor("heat"), Err(Error::NoSuchSensor { .. })));
    }
}
