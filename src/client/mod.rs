//! # Client Driver
//!
//! A client locates its node through the registry, publishes an inbound
//! endpoint for asynchronous replies, and issues requests at clock-aligned
//! instants. Partial results arriving for an asynchronous request are
//! folded into one `QueryResult` per request id; after the drain window
//! `merge_and_print` reports and releases it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::clock::AcceleratedClock;
use crate::execution::QueryResult;
use crate::model::{ConnectionInfo, EndpointDescriptor, NodeDescriptor};
use crate::network::{Network, RequestResultSink, RequestingService};
use crate::query::{Query, Request, RequestId};
use crate::registry::RegistryService;
use crate::{Error, Result};

// ============================================================================
// Plans and outcomes
// ============================================================================

/// A request the client issues at a given simulated instant.
#[derive(Debug, Clone)]
pub struct PlannedRequest {
    pub at: DateTime<Utc>,
    pub query: Query,
    pub asynchronous: bool,
}

/// What a client does during a simulation run.
#[derive(Debug, Clone)]
pub struct ClientPlan {
    /// Node the client sends its requests to.
    pub node: String,
    pub connect_at: DateTime<Utc>,
    pub requests: Vec<PlannedRequest>,
    /// Simulated time to wait for asynchronous partial results.
    pub drain_window: TimeDelta,
}

/// The reported result of one request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub client: String,
    pub request_id: RequestId,
    pub query: Query,
    pub asynchronous: bool,
    pub result: QueryResult,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    info: ConnectionInfo,
    registry: Arc<dyn RegistryService>,
    network: Network,
    target: RwLock<Option<Target>>,
    /// Merged partial results keyed by request id.
    results: DashMap<RequestId, QueryResult>,
}

#[derive(Clone)]
struct Target {
    descriptor: NodeDescriptor,
    handle: Arc<dyn RequestingService>,
}

impl Client {
    pub fn new(id: impl Into<String>, registry: Arc<dyn RegistryService>, network: Network) -> Self {
        let id = id.into();
        let endpoint = EndpointDescriptor::new(format!("{id}-inbound"));
        Self {
            inner: Arc::new(ClientInner {
                info: ConnectionInfo::new(id, endpoint),
                registry,
                network,
                target: RwLock::new(None),
                results: DashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str { &self.inner.info.identifier }
    pub fn connection_info(&self) -> &ConnectionInfo { &self.inner.info }

    pub fn node(&self) -> Option<NodeDescriptor> {
        self.inner.target.read().as_ref().map(|t| t.descriptor.clone())
    }

    /// Publish the inbound endpoint that receives asynchronous partial results.
    pub fn open_inbound(&self) -> Result<()> {
        self.inner.network.publish_sink(&self.inner.info.endpoint, Arc::new(self.clone()))
    }

    pub fn close_inbound(&self) {
        self.inner.network.unpublish(&self.inner.info.endpoint);
    }

    /// Look `node_id` up in the registry and connect to its requesting endpoint.
    pub async fn connect(&self, node_id: &str) -> Result<NodeDescriptor> {
        let descriptor = self
            .inner
            .registry
            .find_by_identifier(node_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {node_id}")))?;
        let handle = self.inner.network.connect_requesting(&descriptor.requesting)?;
        *self.inner.target.write() = Some(Target { descriptor: descriptor.clone(), handle });
        info!(client = %self.id(), node = %node_id, "client connected");
        Ok(descriptor)
    }

    fn target(&self) -> Result<Target> {
        self.inner
            .target
            .read()
            .clone()
            .ok_or_else(|| Error::NotFound(format!("client {} is not connected to a node", self.id())))
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub async fn execute(&self, query: Query) -> Result<QueryResult> {
        self.send(Request::new(query)).await
    }

    async fn send(&self, request: Request) -> Result<QueryResult> {
        let target = self.target()?;
        let (id, query) = (request.id.clone(), request.query.clone());
        let result = target.handle.execute(request).await?;
        info!(client = %self.id(), request = %id, query = %query, result = %result, "sync result");
        Ok(result)
    }

    /// Send an asynchronous request and return its id.
    pub async fn execute_async(&self, query: Query) -> Result<RequestId> {
        let target = self.target()?;
        let request = Request::new_async(query, self.inner.info.clone());
        let id = request.id.clone();
        self.inner.results.entry(id.clone()).or_default();
        if let Err(e) = target.handle.execute_async(request).await {
            self.inner.results.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Fold a partial result into the running result of its request.
    pub fn accept_partial(&self, request_id: RequestId, partial: QueryResult) {
        self.inner
            .results
            .entry(request_id)
            .and_modify(|merged| merged.merge(&partial))
            .or_insert_with(|| partial.clone());
    }

    /// The partial results received so far, merged.
    pub fn merge_results(&self, request_id: &RequestId) -> Option<QueryResult> {
        self.inner.results.get(request_id).map(|r| r.value().clone())
    }

    /// Report and release the merged result of `request_id`.
    pub fn merge_and_print(&self, request_id: &RequestId) -> QueryResult {
        let merged = self
            .inner
            .results
            .remove(request_id)
            .map(|(_, r)| r)
            .unwrap_or_default();
        info!(client = %self.id(), request = %request_id, result = %merged, "async result");
        merged
    }

    // ========================================================================
    // Scheduled run
    // ========================================================================

    /// Follow `plan` on `clock`: connect, then issue each request at its
    /// instant. Asynchronous requests are merged after the drain window.
    pub async fn run(&self, clock: &AcceleratedClock, plan: &ClientPlan) -> Result<Vec<RequestOutcome>> {
        clock.sleep_until_instant(plan.connect_at).await;
        self.connect(&plan.node).await?;

        let mut outcomes = Vec::with_capacity(plan.requests.len());
        for planned in &plan.requests {
            clock.sleep_until_instant(planned.at).await;
            let outcome = if planned.asynchronous {
                let drained_at = planned.at.checked_add_signed(plan.drain_window).ok_or_else(|| {
                    Error::Config(format!("drain window {} overflows the timeline", plan.drain_window))
                })?;
                match self.execute_async(planned.query.clone()).await {
                    Ok(id) => {
                        clock.sleep_until_instant(drained_at).await;
                        let result = self.merge_and_print(&id);
                        Some((id, result))
                    }
                    Err(e) => {
                        warn!(client = %self.id(), error = %e, "asynchronous request failed");
                        None
                    }
                }
            } else {
                let request = Request::new(planned.query.clone());
                let request_id = request.id.clone();
                match self.send(request).await {
                    Ok(result) => Some((request_id, result)),
                    Err(e) => {
                        warn!(client = %self.id(), error = %e, "synchronous request failed");
                        None
                    }
                }
            };
            if let Some((request_id, result)) = outcome {
                outcomes.push(RequestOutcome {
                    client: self.id().to_owned(),
                    request_id,
                    query: planned.query.clone(),
                    asynchronous: planned.asynchronous,
                    result,
                });
            }
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl RequestResultSink for Client {
    async fn accept_request_result(&self, request_id: RequestId, result: QueryResult) -> Result<()> {
        self.accept_partial(request_id, result);
        Ok(())
    }
}
