//! Query results and their merge laws.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::SensorData;

/// Which kind of query produced a result.
///
/// Ordered so that merging a tagged result into an untagged one keeps the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResultKind {
    Gather,
    Boolean,
}

/// Result of a query, partial or complete.
///
/// Both collections are de-duplicated and keep first-insertion order.
/// Equality ignores that order, so results assembled from asynchronous
/// partials compare equal to the synchronous result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    kind: Option<ResultKind>,
    gathered: Vec<SensorData>,
    positive_nodes: Vec<String>,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> Option<ResultKind> { self.kind }
    pub fn is_gather_request(&self) -> bool { self.kind == Some(ResultKind::Gather) }
    pub fn is_boolean_request(&self) -> bool { self.kind == Some(ResultKind::Boolean) }

    pub fn gathered(&self) -> &[SensorData] { &self.gathered }
    pub fn positive_nodes(&self) -> &[String] { &self.positive_nodes }

    /// No readings and no positive nodes.
    pub fn is_empty(&self) -> bool {
        self.gathered.is_empty() && self.positive_nodes.is_empty()
    }

    pub fn mark(&mut self, kind: ResultKind) {
        self.kind = self.kind.max(Some(kind));
    }

    pub fn add_gathered<I: IntoIterator<Item = SensorData>>(&mut self, data: I) {
        for datum in data {
            if !self.gathered.contains(&datum) {
                self.gathered.push(datum);
            }
        }
    }

    pub fn add_positive_node(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.positive_nodes.contains(&id) {
            self.positive_nodes.push(id);
        }
    }

    /// Union `other` into `self`, appending what is new.
    pub fn merge(&mut self, other: &QueryResult) {
        if let Some(kind) = other.kind {
            self.mark(kind);
        }
        self.add_gathered(other.gathered.iter().cloned());
        for id in &other.positive_nodes {
            self.add_positive_node(id.as_str());
        }
    }

    pub fn merged(mut self, other: &QueryResult) -> Self {
        self.merge(other);
        self
    }

    /// Distinct node identifiers that contributed readings, in order.
    pub fn gathered_nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = Vec::new();
        for datum in &self.gathered {
            if !nodes.contains(&datum.node_id.as_str()) {
                nodes.push(&datum.node_id);
            }
        }
        nodes
    }
}

impl PartialEq for QueryResult {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.gathered.len() == other.gathered.len()
            && self.positive_nodes.len() == other.positive_nodes.len()
            && self.gathered.iter().all(|d| other.gathered.contains(d))
            && self.positive_nodes.iter().all(|n| other.positive_nodes.contains(n))
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(ResultKind::Gather) => write!(f, "gathered [")?,
            Some(ResultKind::Boolean) => write!(f, "positive [")?,
            None => write!(f, "empty [")?,
        }
        let mut first = true;
        for datum in &self.gathered {
            if !first { write!(f, ", ")?; }
            first = false;
            write!(f, "{datum}")?;
        }
        for node in &self.positive_nodes {
            if !first { write!(f, ", ")?; }
            first = false;
            write!(f, "{node}")?;
        }
        write!(f, "]")
    }
}
