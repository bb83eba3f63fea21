//! Client-side handles returned by `Network::connect_*`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{wire, NetworkSettings, RequestResultSink, RequestingService, SensorNodeP2P};
use crate::execution::{QueryResult, RequestContinuation};
use crate::model::{EndpointDescriptor, NodeDescriptor};
use crate::query::{Request, RequestId};
use crate::{Error, Result};

async fn call<T>(uri: &str, timeout: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| Error::Timeout {
            target: uri.to_owned(),
            millis: limit.as_millis() as u64,
        })?,
        None => fut.await,
    }
}

// ============================================================================
// Peer
// ============================================================================

pub(super) struct RemotePeer {
    uri: String,
    target: Arc<dyn SensorNodeP2P>,
    settings: NetworkSettings,
}

impl RemotePeer {
    pub(super) fn new(endpoint: &EndpointDescriptor, target: Arc<dyn SensorNodeP2P>, settings: NetworkSettings) -> Self {
        Self { uri: endpoint.uri.clone(), target, settings }
    }
}

#[async_trait]
impl SensorNodeP2P for RemotePeer {
    async fn execute(&self, continuation: RequestContinuation) -> Result<QueryResult> {
        let continuation = wire::transfer(continuation, self.settings.wire_encoding)?;
        let result = call(&self.uri, self.settings.call_timeout, self.target.execute(continuation)).await?;
        wire::transfer(result, self.settings.wire_encoding)
    }

    async fn execute_async(&self, continuation: RequestContinuation) -> Result<()> {
        let continuation = wire::transfer(continuation, self.settings.wire_encoding)?;
        call(&self.uri, self.settings.call_timeout, self.target.execute_async(continuation)).await
    }

    async fn ask4_connection(&self, peer: NodeDescriptor) -> Result<()> {
        let peer = wire::transfer(peer, self.settings.wire_encoding)?;
        call(&self.uri, self.settings.call_timeout, self.target.ask4_connection(peer)).await
    }

    async fn ask4_disconnection(&self, peer: NodeDescriptor) -> Result<()> {
        let peer = wire::transfer(peer, self.settings.wire_encoding)?;
        call(&self.uri, self.settings.call_timeout, self.target.ask4_disconnection(peer)).await
    }
}

// ============================================================================
// Requesting
// ============================================================================

pub(super) struct RemoteRequesting {
    uri: String,
    target: Arc<dyn RequestingService>,
    settings: NetworkSettings,
}

impl RemoteRequesting {
    pub(super) fn new(
        endpoint: &EndpointDescriptor,
        target: Arc<dyn RequestingService>,
        settings: NetworkSettings,
    ) -> Self {
        Self { uri: endpoint.uri.clone(), target, settings }
    }
}

#[async_trait]
impl RequestingService for RemoteRequesting {
    async fn execute(&self, request: Request) -> Result<QueryResult> {
        let request = wire::transfer(request, self.settings.wire_encoding)?;
        let result = call(&self.uri, self.settings.call_timeout, self.target.execute(request)).await?;
        wire::transfer(result, self.settings.wire_encoding)
    }

    async fn execute_async(&self, request: Request) -> Result<()> {
        let request = wire::transfer(request, self.settings.wire_encoding)?;
        call(&self.uri, self.settings.call_timeout, self.target.execute_async(request)).await
    }
}

// ============================================================================
// Result sink
// ============================================================================

pub(super) struct RemoteSink {
    uri: String,
    target: Arc<dyn RequestResultSink>,
    settings: NetworkSettings,
}

impl RemoteSink {
    pub(super) fn new(
        endpoint: &EndpointDescriptor,
        target: Arc<dyn RequestResultSink>,
        settings: NetworkSettings,
    ) -> Self {
        Self { uri: endpoint.uri.clone(), target, settings }
    }
}

#[async_trait]
impl RequestResultSink for RemoteSink {
    async fn accept_request_result(&self, request_id: RequestId, result: QueryResult) -> Result<()> {
        let result = wire::transfer(result, self.settings.wire_encoding)?;
        call(&self.uri, self.settings.call_timeout, self.target.accept_request_result(request_id, result)).await
    }
}
