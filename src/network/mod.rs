//! # Network
//!
//! The protocols nodes and clients speak, and the in-process directory
//! that resolves endpoint URIs to callable handles.
//!
//! | Protocol | Offered by | Operations |
//! |----------|------------|------------|
//! | `SensorNodeP2P` | nodes, to peers | `execute`, `execute_async`, `ask4_connection`, `ask4_disconnection` |
//! | `RequestingService` | nodes, to clients | `execute`, `execute_async` |
//! | `RequestResultSink` | clients, to nodes | `accept_request_result` |
//!
//! Handles obtained through `Network::connect_*` apply the network's call
//! timeout and, when wire encoding is on, push every argument and reply
//! through its JSON form.

pub mod wire;
mod remote;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::execution::{QueryResult, RequestContinuation};
use crate::model::{EndpointDescriptor, NodeDescriptor};
use crate::query::{Request, RequestId};
use crate::{Error, Result};

use remote::{RemotePeer, RemoteRequesting, RemoteSink};

// ============================================================================
// Protocols
// ============================================================================

/// Peer-to-peer protocol between overlay neighbours.
#[async_trait]
pub trait SensorNodeP2P: Send + Sync + 'static {
    /// Evaluate a forwarded request and return the aggregated result of
    /// this node and everything it propagated to. A request this node has
    /// already processed yields an empty result.
    async fn execute(&self, continuation: RequestContinuation) -> Result<QueryResult>;

    /// Evaluate a forwarded request in the background; partial results go
    /// to the request's client.
    async fn execute_async(&self, continuation: RequestContinuation) -> Result<()>;

    /// Accept an overlay edge from `peer`. No reciprocal request is made.
    async fn ask4_connection(&self, peer: NodeDescriptor) -> Result<()>;

    /// `peer` is leaving: drop its edge and look for a replacement.
    async fn ask4_disconnection(&self, peer: NodeDescriptor) -> Result<()>;
}

/// Client-facing query protocol.
#[async_trait]
pub trait RequestingService: Send + Sync + 'static {
    async fn execute(&self, request: Request) -> Result<QueryResult>;

    /// Accepts the request and returns at once.
    async fn execute_async(&self, request: Request) -> Result<()>;
}

/// Client reply endpoint for asynchronous requests.
#[async_trait]
pub trait RequestResultSink: Send + Sync + 'static {
    async fn accept_request_result(&self, request_id: RequestId, result: QueryResult) -> Result<()>;
}

// ============================================================================
// Network directory
// ============================================================================

/// Transport behaviour applied to every resolved handle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkSettings {
    /// Upper bound on a single remote call. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Round-trip arguments and replies through JSON.
    pub wire_encoding: bool,
}

/// In-process endpoint directory.
#[derive(Clone)]
pub struct Network {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    settings: NetworkSettings,
    peers: RwLock<HashMap<String, Arc<dyn SensorNodeP2P>>>,
    requesting: RwLock<HashMap<String, Arc<dyn RequestingService>>>,
    sinks: RwLock<HashMap<String, Arc<dyn RequestResultSink>>>,
}

impl Network {
    pub fn new() -> Self {
        Self::with_settings(NetworkSettings::default())
    }

    pub fn with_settings(settings: NetworkSettings) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                settings,
                peers: RwLock::new(HashMap::new()),
                requesting: RwLock::new(HashMap::new()),
                sinks: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> NetworkSettings {
        self.inner.settings
    }

    // ---- publication -------------------------------------------------------

    pub fn publish_peer(&self, endpoint: &EndpointDescriptor, handle: Arc<dyn SensorNodeP2P>) -> Result<()> {
        publish(&self.inner.peers, endpoint, handle)
    }

    pub fn publish_requesting(
        &self,
        endpoint: &EndpointDescriptor,
        handle: Arc<dyn RequestingService>,
    ) -> Result<()> {
        publish(&self.inner.requesting, endpoint, handle)
    }

    pub fn publish_sink(&self, endpoint: &EndpointDescriptor, handle: Arc<dyn RequestResultSink>) -> Result<()> {
        publish(&self.inner.sinks, endpoint, handle)
    }

    /// Withdraw whatever is published at `endpoint`.
    pub fn unpublish(&self, endpoint: &EndpointDescriptor) {
        self.inner.peers.write().remove(&endpoint.uri);
        self.inner.requesting.write().remove(&endpoint.uri);
        self.inner.sinks.write().remove(&endpoint.uri);
        debug!(endpoint = %endpoint, "endpoint withdrawn");
    }

    pub fn is_published(&self, endpoint: &EndpointDescriptor) -> bool {
        self.inner.peers.read().contains_key(&endpoint.uri)
            || self.inner.requesting.read().contains_key(&endpoint.uri)
            || self.inner.sinks.read().contains_key(&endpoint.uri)
    }

    // ---- resolution --------------------------------------------------------

    pub fn connect_peer(&self, endpoint: &EndpointDescriptor) -> Result<Arc<dyn SensorNodeP2P>> {
        let target = resolve(&self.inner.peers, endpoint)?;
        Ok(Arc::new(RemotePeer::new(endpoint, target, self.settings())))
    }

    pub fn connect_requesting(&self, endpoint: &EndpointDescriptor) -> Result<Arc<dyn RequestingService>> {
        let target = resolve(&self.inner.requesting, endpoint)?;
        Ok(Arc::new(RemoteRequesting::new(endpoint, target, self.settings())))
    }

    pub fn connect_sink(&self, endpoint: &EndpointDescriptor) -> Result<Arc<dyn RequestResultSink>> {
        let target = resolve(&self.inner.sinks, endpoint)?;
        Ok(Arc::new(RemoteSink::new(endpoint, target, self.settings())))
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

fn publish<T: ?Sized>(
    table: &RwLock<HashMap<String, Arc<T>>>,
    endpoint: &EndpointDescriptor,
    handle: Arc<T>,
) -> Result<()> {
    let mut table = table.write();
    if table.contains_key(&endpoint.uri) {
        return Err(Error::Config(format!("endpoint {endpoint} is already published")));
    }
    table.insert(endpoint.uri.clone(), handle);
    debug!(endpoint = %endpoint, "endpoint published");
    Ok(())
}

fn resolve<T: ?Sized>(table: &RwLock<HashMap<String, Arc<T>>>, endpoint: &EndpointDescriptor) -> Result<Arc<T>> {
    table
        .read()
        .get(&endpoint.uri)
        .cloned()
        .ok_or_else(|| Error::Transport(format!("no endpoint published at {endpoint}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Inbox {
        received: Mutex<Vec<RequestId>>,
    }

    #[async_trait]
    impl RequestResultSink for Inbox {
        async fn accept_request_result(&self, request_id: RequestId, _result: QueryResult) -> Result<()> {
            self.received.lock().push(request_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_resolve_unpublish() {
        let network = Network::new();
        let endpoint = EndpointDescriptor::new("c1-inbound");
        let inbox = Arc::new(Inbox::default());

        network.publish_sink(&endpoint, inbox.clone()).unwrap();
        assert!(matches!(network.publish_sink(&endpoint, inbox.clone()), Err(Error::Config(_))));
        assert!(network.is_published(&endpoint));

        let sink = network.connect_sink(&endpoint).unwrap();
        sink.accept_request_result(RequestId::from("r1"), QueryResult::new()).await.unwrap();
        assert_eq!(inbox.received.lock().as_slice(), &[RequestId::from("r1")]);

        network.unpublish(&endpoint);
        assert!(matches!(network.connect_sink(&endpoint), Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_unknown_peer_is_a_transport_error() {
        let network = Network::new();
        let err = network.connect_peer(&EndpointDescriptor::new("nowhere")).err().unwrap();
        assert!(matches!(err, Error::Transport(_)));
    }
}
