//! Observer hook for visualising the overlay.
//!
//! Nodes report what they do to an optional `NetworkObserver`. Node logic
//! never depends on the observer being present.

use parking_lot::Mutex;
use tracing::debug;

/// Receives overlay and evaluation events.
pub trait NetworkObserver: Send + Sync {
    fn add_node(&self, id: &str, x: f64, y: f64);
    fn add_connection(&self, from: &str, to: &str);
    fn remove_connection(&self, from: &str, to: &str);
    /// A query travels along the edge `from -> to`.
    fn start_light_animation(&self, from: &str, to: &str);
    /// Node `id` evaluated a query.
    fn toggle_node_blinking(&self, id: &str);
    fn reset_nodes_blink(&self);
}

// ============================================================================
// TracingObserver
// ============================================================================

/// Renders observer events as `debug` records under the `sensor_mesh::observer` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl NetworkObserver for TracingObserver {
    fn add_node(&self, id: &str, x: f64, y: f64) {
        debug!(node = %id, x, y, "observer: add node");
    }

    fn add_connection(&self, from: &str, to: &str) {
        debug!(from = %from, to = %to, "observer: add connection");
    }

    fn remove_connection(&self, from: &str, to: &str) {
        debug!(from = %from, to = %to, "observer: remove connection");
    }

    fn start_light_animation(&self, from: &str, to: &str) {
        debug!(from = %from, to = %to, "observer: light animation");
    }

    fn toggle_node_blinking(&self, id: &str) {
        debug!(node = %id, "observer: blink");
    }

    fn reset_nodes_blink(&self) {
        debug!("observer: reset blink");
    }
}

// ============================================================================
// RecordingObserver
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    AddNode { id: String, x: f64, y: f64 },
    AddConnection { from: String, to: String },
    RemoveConnection { from: String, to: String },
    LightAnimation { from: String, to: String },
    Blink { id: String },
    ResetBlink,
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObserverEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// How many times `id` evaluated a query since the last `clear`.
    pub fn evaluations(&self, id: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ObserverEvent::Blink { id: node } if node == id))
            .count()
    }

    /// Edges currently drawn, replaying adds and removes in order.
    pub fn connections(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = Vec::new();
        for event in self.events.lock().iter() {
            match event {
                ObserverEvent::AddConnection { from, to } => {
                    let edge = (from.clone(), to.clone());
                    if !edges.contains(&edge) {
                        edges.push(edge);
                    }
                }
                ObserverEvent::RemoveConnection { from, to } => {
                    edges.retain(|(f, t)| !(f == from && t == to));
                }
                _ => {}
            }
        }
        edges
    }

    fn push(&self, event: ObserverEvent) {
        self.events.lock().push(event);
    }
}

impl NetworkObserver for RecordingObserver {
    fn add_node(&self, id: &str, x: f64, y: f64) {
        self.push(ObserverEvent::AddNode { id: id.into(), x, y });
    }

    fn add_connection(&self, from: &str, to: &str) {
        self.push(ObserverEvent::AddConnection { from: from.into(), to: to.into() });
    }

    fn remove_connection(&self, from: &str, to: &str) {
        self.push(ObserverEvent::RemoveConnection { from: from.into(), to: to.into() });
    }

    fn start_light_animation(&self, from: &str, to: &str) {
        self.push(ObserverEvent::LightAnimation { from: from.into(), to: to.into() });
    }

    fn toggle_node_blinking(&self, id: &str) {
        self.push(ObserverEvent::Blink { id: id.into() });
    }

    fn reset_nodes_blink(&self) {
        self.push(ObserverEvent::ResetBlink);
    }
}
