//! Requests sent from clients to nodes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Query;
use crate::model::ConnectionInfo;

/// Opaque request identifier, fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId { fn from(v: &str) -> Self { Self(v.to_owned()) } }
impl From<String> for RequestId { fn from(v: String) -> Self { Self(v) } }

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A query addressed to the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub query: Query,
    /// Reply endpoint, required for asynchronous requests.
    pub client: Option<ConnectionInfo>,
    pub asynchronous: bool,
}

impl Request {
    /// Synchronous request: the result travels back along the call chain.
    pub fn new(query: Query) -> Self {
        Self { id: RequestId::fresh(), query, client: None, asynchronous: false }
    }

    /// Asynchronous request: every visited node ships its partial result to `client`.
    pub fn new_async(query: Query, client: ConnectionInfo) -> Self {
        Self { id: RequestId::fresh(), query, client: Some(client), asynchronous: true }
    }

    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }
}
