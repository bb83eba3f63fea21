//! Query AST (Abstract Syntax Tree)
//!
//! These types are pure data: no behavior beyond `Display`, no node
//! references, no propagation logic. Evaluation lives in `eval`.
//!
//! The lower-case constructor functions at the bottom of this module mirror
//! the textual form of the language, so a query reads like it prints:
//!
//! ```rust
//! use sensor_mesh::query::ast::*;
//!
//! let q = gquery(rgather("heat", fgather("smoke")), fcont(abase(1.0, 1.0), 3.0));
//! assert_eq!(q.to_string(), r#"GQuery(RGather("heat", FGather("smoke")), FCont(ABase(1, 1), 3))"#);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Direction, Position};

/// Top-level query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// GQuery: collect sensor readings.
    Gather { gather: Gather, cont: Cont },
    /// BQuery: collect the identifiers of nodes satisfying a predicate.
    Boolean { bexp: BExp, cont: Cont },
}

impl Query {
    pub fn continuation(&self) -> &Cont {
        match self {
            Query::Gather { cont, .. } | Query::Boolean { cont, .. } => cont,
        }
    }
}

/// Sensors to read on each visited node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gather {
    /// FGather(sensor)
    Single(String),
    /// RGather(sensor, rest)
    Chain(String, Box<Gather>),
}

/// Boolean expression over local sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BExp {
    /// CExpBExp(comparison)
    Compare(CExp),
    /// SBExp(sensor): a boolean-valued sensor
    Sensor(String),
    And(Box<BExp>, Box<BExp>),
    Or(Box<BExp>, Box<BExp>),
    Not(Box<BExp>),
}

/// Relational comparison between two numeric operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CExp {
    pub op: CompareOp,
    pub left: Rand,
    pub right: Rand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// >
    Gt,
    /// >=
    Ge,
    /// <
    Lt,
    /// <=
    Le,
    /// =
    Eq,
    /// <>
    Ne,
}

impl CompareOp {
    /// Exact comparison, no tolerance.
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }

    fn constructor(self) -> &'static str {
        match self {
            CompareOp::Gt => "GCExp",
            CompareOp::Ge => "GeqCExp",
            CompareOp::Lt => "LCExp",
            CompareOp::Le => "LeqCExp",
            CompareOp::Eq => "EqCExp",
            CompareOp::Ne => "NeqCExp",
        }
    }
}

/// Numeric operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rand {
    /// CRand(constant)
    Const(f64),
    /// SRand(sensor)
    Sensor(String),
}

/// Set of quadrants for directional propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dirs {
    /// FDirs(direction)
    Single(Direction),
    /// RDirs(direction, rest)
    Chain(Direction, Box<Dirs>),
}

/// Continuation: decides how, and whether, a query propagates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cont {
    /// ECont: stop here.
    Empty,
    /// DCont(dirs, maxHops)
    Directional { dirs: Dirs, max_hops: u32 },
    /// FCont(base, maxDistance)
    Flooding { base: Base, max_distance: f64 },
}

/// Flood anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Base {
    /// ABase(position)
    Absolute(Position),
    /// RBase: the position of the node evaluating it
    Relative,
}

// ============================================================================
// Constructors
// ============================================================================

pub fn gquery(gather: Gather, cont: Cont) -> Query { Query::Gather { gather, cont } }
pub fn bquery(bexp: BExp, cont: Cont) -> Query { Query::Boolean { bexp, cont } }

pub fn fgather(sensor: impl Into<String>) -> Gather { Gather::Single(sensor.into()) }
pub fn rgather(sensor: impl Into<String>, rest: Gather) -> Gather {
    Gather::Chain(sensor.into(), Box::new(rest))
}

pub fn cexp(comparison: CExp) -> BExp { BExp::Compare(comparison) }
pub fn sbexp(sensor: impl Into<String>) -> BExp { BExp::Sensor(sensor.into()) }
pub fn and(left: BExp, right: BExp) -> BExp { BExp::And(Box::new(left), Box::new(right)) }
pub fn or(left: BExp, right: BExp) -> BExp { BExp::Or(Box::new(left), Box::new(right)) }
pub fn not(inner: BExp) -> BExp { BExp::Not(Box::new(inner)) }

pub fn compare(op: CompareOp, left: Rand, right: Rand) -> CExp { CExp { op, left, right } }
pub fn gt(left: Rand, right: Rand) -> CExp { compare(CompareOp::Gt, left, right) }
pub fn ge(left: Rand, right: Rand) -> CExp { compare(CompareOp::Ge, left, right) }
pub fn lt(left: Rand, right: Rand) -> CExp { compare(CompareOp::Lt, left, right) }
pub fn le(left: Rand, right: Rand) -> CExp { compare(CompareOp::Le, left, right) }
pub fn eq(left: Rand, right: Rand) -> CExp { compare(CompareOp::Eq, left, right) }
pub fn ne(left: Rand, right: Rand) -> CExp { compare(CompareOp::Ne, left, right) }

pub fn crand(value: f64) -> Rand { Rand::Const(value) }
pub fn srand(sensor: impl Into<String>) -> Rand { Rand::Sensor(sensor.into()) }

pub fn fdirs(direction: Direction) -> Dirs { Dirs::Single(direction) }
pub fn rdirs(direction: Direction, rest: Dirs) -> Dirs { Dirs::Chain(direction, Box::new(rest)) }

pub fn econt() -> Cont { Cont::Empty }
pub fn dcont(dirs: Dirs, max_hops: u32) -> Cont { Cont::Directional { dirs, max_hops } }
pub fn fcont(base: Base, max_distance: f64) -> Cont { Cont::Flooding { base, max_distance } }

pub fn abase(x: f64, y: f64) -> Base { Base::Absolute(Position::new(x, y)) }
pub fn rbase() -> Base { Base::Relative }

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Gather { gather, cont } => write!(f, "GQuery({gather}, {cont})"),
            Query::Boolean { bexp, cont } => write!(f, "BQuery({bexp}, {cont})"),
        }
    }
}

impl fmt::Display for Gather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gather::Single(s) => write!(f, "FGather({s:?})"),
            Gather::Chain(s, rest) => write!(f, "RGather({s:?}, {rest})"),
        }
    }
}

impl fmt::Display for BExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BExp::Compare(c) => write!(f, "CExpBExp({c})"),
            BExp::Sensor(s) => write!(f, "SBExp({s:?})"),
            BExp::And(l, r) => write!(f, "AndBExp({l}, {r})"),
            BExp::Or(l, r) => write!(f, "OrBExp({l}, {r})"),
            BExp::Not(b) => write!(f, "NotBExp({b})"),
        }
    }
}

impl fmt::Display for CExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.op.constructor(), self.left, self.right)
    }
}

impl fmt::Display for Rand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rand::Const(v) => write!(f, "CRand({v})"),
            Rand::Sensor(s) => write!(f, "SRand({s:?})"),
        }
    }
}

impl fmt::Display for Dirs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dirs::Single(d) => write!(f, "FDirs({d})"),
            Dirs::Chain(d, rest) => write!(f, "RDirs({d}, {rest})"),
        }
    }
}

impl fmt::Display for Cont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cont::Empty => write!(f, "ECont"),
            Cont::Directional { dirs, max_hops } => write!(f, "DCont({dirs}, {max_hops})"),
            Cont::Flooding { base, max_distance } => write!(f, "FCont({base}, {max_distance})"),
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Base::Absolute(p) => write!(f, "ABase({}, {})", p.x, p.y),
            Base::Relative => write!(f, "RBase"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_boolean_query() {
        let q = bquery(
            and(cexp(gt(srand("heat"), crand(40.0))), not(sbexp("ice"))),
            dcont(rdirs(Direction::NE, fdirs(Direction::SW)), 2),
        );
        assert_eq!(
            q.to_string(),
            r#"BQuery(AndBExp(CExpBExp(GCExp(SRand("heat"), CRand(40))), NotBExp(SBExp("ice"))), DCont(RDirs(NE, FDirs(SW)), 2))"#
        );
    }

    #[test]
    fn test_compare_ops_are_exact() {
        assert!(CompareOp::Gt.apply(2.0, 1.0));
        assert!(!CompareOp::Gt.apply(1.0, 1.0));
        assert!(CompareOp::Ge.apply(1.0, 1.0));
        assert!(CompareOp::Lt.apply(1.0, 2.0));
        assert!(CompareOp::Le.apply(2.0, 2.0));
        assert!(CompareOp::Eq.apply(0.5, 0.5));
        assert!(!CompareOp::Eq.apply(0.1 + 0.2, 0.3));
        assert!(CompareOp::Ne.apply(0.1 + 0.2, 0.3));
    }

    #[test]
    fn test_query_survives_json() {
        let q = gquery(rgather("heat", fgather("smoke")), fcont(rbase(), 2.5));
        let json = serde_json::to_string(&q).unwrap();
        let back: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
