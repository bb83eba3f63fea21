//! # sensor-mesh — Geographic Sensor Network Simulator
//!
//! Sensor nodes spread over a plane form a four-quadrant peer-to-peer overlay
//! (NE / NW / SE / SW), and clients run declarative queries that the nodes
//! evaluate cooperatively, either by *flooding* within a radius or by
//! *directional* traversal with a hop budget.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `RegistryService`, `SensorNodeP2P`, `RequestingService`
//!    and `RequestResultSink` are the contracts between components
//! 2. **Clean DTOs**: `Position`, `SensorData`, `NodeDescriptor`, `Request`
//!    and `QueryResult` cross all boundaries and are serialisable
//! 3. **Evaluation owns nothing**: the query AST evaluates against an
//!    `ExecutionState`; every mutation goes through the state's API
//! 4. **Capabilities, not ownership**: a node never owns a peer, it holds a
//!    handle resolved through the `Network` directory
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sensor_mesh::{MemoryRegistry, Network, NodeDescriptor, Position, SensorNode};
//! use sensor_mesh::query::ast::{econt, fgather, gquery};
//! use sensor_mesh::Request;
//!
//! # async fn example() -> sensor_mesh::Result<()> {
//! let registry = Arc::new(MemoryRegistry::new());
//! let network = Network::new();
//!
//! let descriptor = NodeDescriptor::new("n1", Position::new(1.0, 1.0), 5.0)?;
//! let node = SensorNode::builder(descriptor, registry, network.clone())
//!     .sensor("heat", 42.0)
//!     .build();
//! node.publish()?;
//! node.join_overlay().await?;
//!
//! let result = node.query(Request::new(gquery(fgather("heat"), econt()))).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! | Component | Module | Description |
//! |-----------|--------|-------------|
//! | Primitives | `model` | Positions, quadrants, sensor data, descriptors |
//! | Query language | `query` | AST, constructors and local evaluation |
//! | Execution | `execution` | `ExecutionState`, `QueryResult`, continuations |
//! | Registry | `registry` | Node directory and quadrant-neighbour computation |
//! | Transport | `network` | Endpoint directory, protocols, wire encoding |
//! | Node engine | `node` | Local evaluation, propagation, overlay upkeep |
//! | Client | `client` | Request scheduling and async result merging |
//! | Clock | `clock` | Accelerated simulation clock |
//! | Simulation | `simulation` | Grid deployment and timeline driver |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod query;
pub mod execution;
pub mod registry;
pub mod network;
pub mod node;
pub mod client;
pub mod observer;
pub mod clock;
pub mod config;
pub mod simulation;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Position, Direction, DirectionSet, SensorValue, SensorData,
    NodeDescriptor, EndpointDescriptor, ConnectionInfo,
};

// ============================================================================
// Re-exports: Query language and execution
// ============================================================================

pub use query::{Query, Request, RequestId};
pub use execution::{QueryResult, ResultKind, ExecutionState, RequestContinuation};

// ============================================================================
// Re-exports: Services
// ============================================================================

pub use registry::{RegistryService, MemoryRegistry, GeographicalZone};
pub use network::{Network, SensorNodeP2P, RequestingService, RequestResultSink};
pub use node::SensorNode;
pub use client::Client;
pub use observer::{NetworkObserver, TracingObserver, RecordingObserver};
pub use clock::{AcceleratedClock, ClockServer};
pub use config::SimulationConfig;
pub use simulation::{Simulation, SimulationReport};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No such sensor: '{sensor}' on node {node}")]
    NoSuchSensor { node: String, sensor: String },

    #[error("Type error: sensor '{sensor}' expected {expected}, got {got}")]
    WrongType { sensor: String, expected: String, got: String },

    #[error("Overlay error: {0}")]
    Overlay(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {millis} ms calling {target}")]
    Timeout { target: String, millis: u64 },

    #[error("Wire encoding error: {0}")]
    Wire(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
