//! Node and endpoint descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Position;
use crate::{Error, Result};

/// Address of an inbound endpoint in the `Network` directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub uri: String,
}

impl EndpointDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Where a client receives asynchronous partial results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub identifier: String,
    pub endpoint: EndpointDescriptor,
}

impl ConnectionInfo {
    pub fn new(identifier: impl Into<String>, endpoint: EndpointDescriptor) -> Self {
        Self { identifier: identifier.into(), endpoint }
    }
}

/// Registry entry for a sensor node. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub position: Position,
    pub range: f64,
    /// Endpoint serving client requests.
    pub requesting: EndpointDescriptor,
    /// Endpoint serving peer-to-peer traffic.
    pub p2p: EndpointDescriptor,
}

impl NodeDescriptor {
    /// Validated descriptor with endpoints derived from the identifier.
    pub fn new(id: impl Into<String>, position: Position, range: f64) -> Result<Self> {
        let id = id.into();
        let requesting = EndpointDescriptor::new(format!("{id}-requesting"));
        let p2p = EndpointDescriptor::new(format!("{id}-p2p"));
        Self::with_endpoints(id, position, range, requesting, p2p)
    }

    pub fn with_endpoints(
        id: impl Into<String>,
        position: Position,
        range: f64,
        requesting: EndpointDescriptor,
        p2p: EndpointDescriptor,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!("malformed node identifier '{id}'")));
        }
        if !position.is_finite() {
            return Err(Error::Config(format!("node {id}: position {position} is not finite")));
        }
        if !range.is_finite() || range <= 0.0 {
            return Err(Error::Config(format!("node {id}: range must be positive, got {range}")));
        }
        Ok(Self { id, position, range, requesting, p2p })
    }

    pub fn distance(&self, other: &NodeDescriptor) -> f64 {
        self.position.distance(&other.position)
    }

    /// Both nodes can sense each other.
    pub fn in_mutual_range(&self, other: &NodeDescriptor) -> bool {
        let d = self.distance(other);
        d <= self.range && d <= other.range
    }
}
