//! Query execution state and results.
//!
//! An `ExecutionState` travels with a request from node to node. Each node
//! swaps in its own `ProcessingNode` view, evaluates the query into the
//! state's `QueryResult`, and reads the propagation mode the continuation
//! left behind.

pub mod result;
pub mod state;

pub use result::{QueryResult, ResultKind};
pub use state::{ExecutionState, ProcessingNode, PropagationMode, RequestContinuation};
