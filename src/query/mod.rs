//! # Query Language
//!
//! Declarative queries evaluated node by node across the overlay.
//!
//! | Sub-language | Type | Yields |
//! |--------------|------|--------|
//! | Random | `Rand` | a real number |
//! | Comparison | `CExp` | a boolean |
//! | Boolean | `BExp` | a boolean |
//! | Gather | `Gather` | an ordered list of sensor readings |
//! | Direction | `Dirs` | a set of quadrants |
//! | Continuation | `Cont` | propagation settings on the state |
//!
//! A `Query` pairs a gather list or boolean predicate with a continuation.

pub mod ast;
pub mod eval;
pub mod request;

pub use ast::{Query, Gather, BExp, CExp, CompareOp, Rand, Dirs, Cont, Base};
pub use eval::Evaluate;
pub use request::{Request, RequestId};
