//! Local evaluation of the query AST.
//!
//! Evaluation only reads the processing node exposed by the state; every
//! change goes through the `ExecutionState` API. Sensor lookups fail with
//! `Error::NoSuchSensor` or `Error::WrongType`, which a query turns into an
//! empty local contribution.

use tracing::warn;

use super::ast::{BExp, Base, CExp, Cont, Dirs, Gather, Query, Rand};
use crate::execution::{ExecutionState, QueryResult, ResultKind};
use crate::model::{DirectionSet, Position, SensorData};
use crate::{Error, Result};

/// An AST node that yields a value on the current processing node.
pub trait Evaluate {
    type Output;

    fn eval(&self, state: &ExecutionState) -> Result<Self::Output>;
}

impl Evaluate for Rand {
    type Output = f64;

    fn eval(&self, state: &ExecutionState) -> Result<f64> {
        match self {
            Rand::Const(v) => Ok(*v),
            Rand::Sensor(id) => {
                let datum = state.processing_node().sensor(id)?;
                datum.value.as_number().ok_or_else(|| Error::WrongType {
                    sensor: id.clone(),
                    expected: "NUMBER".into(),
                    got: datum.value.type_name().into(),
                })
            }
        }
    }
}

impl Evaluate for CExp {
    type Output = bool;

    fn eval(&self, state: &ExecutionState) -> Result<bool> {
        Ok(self.op.apply(self.left.eval(state)?, self.right.eval(state)?))
    }
}

impl Evaluate for BExp {
    type Output = bool;

    fn eval(&self, state: &ExecutionState) -> Result<bool> {
        match self {
            BExp::Compare(c) => c.eval(state),
            BExp::Sensor(id) => {
                let datum = state.processing_node().sensor(id)?;
                datum.value.as_bool().ok_or_else(|| Error::WrongType {
                    sensor: id.clone(),
                    expected: "BOOLEAN".into(),
                    got: datum.value.type_name().into(),
                })
            }
            BExp::And(l, r) => Ok(l.eval(state)? && r.eval(state)?),
            BExp::Or(l, r) => Ok(l.eval(state)? || r.eval(state)?),
            BExp::Not(b) => Ok(!b.eval(state)?),
        }
    }
}

impl Evaluate for Gather {
    type Output = Vec<SensorData>;

    fn eval(&self, state: &ExecutionState) -> Result<Vec<SensorData>> {
        match self {
            Gather::Single(id) => Ok(vec![state.processing_node().sensor(id)?.clone()]),
            Gather::Chain(id, rest) => {
                let mut data = vec![state.processing_node().sensor(id)?.clone()];
                data.extend(rest.eval(state)?);
                Ok(data)
            }
        }
    }
}

impl Evaluate for Dirs {
    type Output = DirectionSet;

    fn eval(&self, state: &ExecutionState) -> Result<DirectionSet> {
        match self {
            Dirs::Single(d) => Ok(DirectionSet::single(*d)),
            Dirs::Chain(d, rest) => {
                let mut set = rest.eval(state)?;
                set.insert(*d);
                Ok(set)
            }
        }
    }
}

impl Evaluate for Base {
    type Output = Position;

    fn eval(&self, state: &ExecutionState) -> Result<Position> {
        match self {
            Base::Absolute(p) => Ok(*p),
            Base::Relative => Ok(state.processing_node().position),
        }
    }
}

// ============================================================================
// Continuations and queries
// ============================================================================

impl Cont {
    /// Install this continuation's propagation settings on the state.
    pub fn apply(&self, state: &mut ExecutionState) -> Result<()> {
        match self {
            Cont::Empty => state.clear_continuation(),
            Cont::Directional { dirs, max_hops } => {
                let directions = dirs.eval(state)?;
                state.set_directional(directions, *max_hops);
            }
            Cont::Flooding { base, max_distance } => {
                let anchor = base.eval(state)?;
                state.set_flooding(anchor, *max_distance);
            }
        }
        Ok(())
    }
}

impl Query {
    /// Evaluate on the state's processing node and return the running result.
    pub fn eval(&self, state: &mut ExecutionState) -> QueryResult {
        match self {
            Query::Gather { gather, cont } => {
                state.mark_result(ResultKind::Gather);
                match gather.eval(state) {
                    Ok(data) => state.add_gathered(data),
                    Err(e) => warn!(node = %state.processing_node().id, error = %e, "gather evaluation failed"),
                }
                apply_continuation(cont, state);
            }
            Query::Boolean { bexp, cont } => {
                let positive = bexp.eval(state).unwrap_or_else(|e| {
                    warn!(node = %state.processing_node().id, error = %e, "boolean evaluation failed");
                    false
                });
                if positive {
                    let id = state.processing_node().id.clone();
                    state.add_positive_node(id);
                }
                apply_continuation(cont, state);
                state.mark_result(ResultKind::Boolean);
            }
        }
        state.result().clone()
    }
}

fn apply_continuation(cont: &Cont, state: &mut ExecutionState) {
    if let Err(e) = cont.apply(state) {
        warn!(node = %state.processing_node().id, error = %e, "continuation failed, not propagating");
        state.clear_continuation();
    }
}
