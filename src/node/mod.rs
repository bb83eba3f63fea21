//! # Sensor Node Engine
//!
//! A `SensorNode` answers client requests and forwarded peer requests. For
//! every request it evaluates the query against its own sensors, then
//! follows whatever continuation the query left on the `ExecutionState`:
//!
//! - **Flooding**: forward to every connected neighbour whose position lies
//!   within the flood radius of the anchor.
//! - **Directional**: try the connected neighbours of the advertised
//!   quadrants in NE, NW, SE, SW order and stop at the first one that takes
//!   the request, until the hop budget is spent.
//!
//! Synchronous requests merge the neighbours' replies into the result that
//! travels back along the call chain. Asynchronous requests fan out and every
//! visited node ships its own partial result to the client's inbound
//! endpoint.
//!
//! A node records each request id before evaluating it. A forwarded request
//! whose id is already recorded is answered with an empty result and goes
//! no further, which cuts cycles in the overlay.
//!
//! ## Overlay upkeep
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `join_overlay` | register, then connect to each returned neighbour |
//! | `connect_to_neighbour` | replace the quadrant's edge, tell the displaced peer, optionally ask the new peer to reciprocate |
//! | `ask4_connection` | accept an edge from a peer |
//! | `ask4_disconnection` | drop the peer's edge; if the peer left, look for a replacement |
//! | `leave_overlay` | unregister, notify every neighbour, close both pools |
//!
//! A displaced peer does not search for a replacement. Only a departure
//! does, so a displacement never sets off a chain of further displacements.

mod pool;
mod slots;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::clock::AcceleratedClock;
use crate::execution::{ExecutionState, ProcessingNode, QueryResult, RequestContinuation};
use crate::model::{Direction, NodeDescriptor, Position, SensorData, SensorValue};
use crate::network::{Network, RequestingService, SensorNodeP2P};
use crate::observer::NetworkObserver;
use crate::query::{Request, RequestId};
use crate::registry::RegistryService;
use crate::{Error, Result};

pub use pool::{WorkerPool, MAX_OVERLAY_WORKERS};
use slots::{PeerLink, QuadrantSlots};

/// Worker threads per node unless configured otherwise.
pub const DEFAULT_THREADS: usize = 5;

// ============================================================================
// Builder
// ============================================================================

pub struct SensorNodeBuilder {
    descriptor: NodeDescriptor,
    registry: Arc<dyn RegistryService>,
    network: Network,
    sensors: Vec<SensorData>,
    threads: usize,
    observer: Option<Arc<dyn NetworkObserver>>,
}

impl SensorNodeBuilder {
    /// Add a sensor reading taken by this node.
    pub fn sensor(mut self, sensor_id: impl Into<String>, value: impl Into<SensorValue>) -> Self {
        let datum = SensorData::new(self.descriptor.id.clone(), sensor_id, value);
        self.sensors.push(datum);
        self
    }

    pub fn sensors(mut self, data: impl IntoIterator<Item = SensorData>) -> Self {
        self.sensors.extend(data);
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn NetworkObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> SensorNode {
        let (overlay_pool, query_pool) = WorkerPool::split(self.threads);
        SensorNode {
            inner: Arc::new(NodeInner {
                sensors: self.sensors.into_iter().map(|s| (s.sensor_id.clone(), s)).collect(),
                descriptor: self.descriptor,
                registry: self.registry,
                network: self.network,
                observer: self.observer,
                slots: QuadrantSlots::default(),
                processed: DashSet::new(),
                overlay_pool,
                query_pool,
                departed: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// SensorNode
// ============================================================================

/// How a continuation spreads over its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fanout {
    /// Flooding: every target.
    All,
    /// Directional: targets in order until one accepts.
    First,
}

#[derive(Clone)]
pub struct SensorNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    descriptor: NodeDescriptor,
    sensors: HashMap<String, SensorData>,
    registry: Arc<dyn RegistryService>,
    network: Network,
    observer: Option<Arc<dyn NetworkObserver>>,
    slots: QuadrantSlots,
    /// Request ids this node has evaluated.
    processed: DashSet<RequestId>,
    /// Peer traffic: forwarded requests and overlay maintenance.
    overlay_pool: WorkerPool,
    /// Client traffic.
    query_pool: WorkerPool,
    departed: AtomicBool,
}

impl SensorNode {
    pub fn builder(
        descriptor: NodeDescriptor,
        registry: Arc<dyn RegistryService>,
        network: Network,
    ) -> SensorNodeBuilder {
        SensorNodeBuilder {
            descriptor,
            registry,
            network,
            sensors: Vec::new(),
            threads: DEFAULT_THREADS,
            observer: None,
        }
    }

    pub fn id(&self) -> &str { &self.inner.descriptor.id }
    pub fn descriptor(&self) -> &NodeDescriptor { &self.inner.descriptor }
    pub fn position(&self) -> Position { self.inner.descriptor.position }

    /// Current overlay neighbours in `Direction::ALL` order.
    pub fn neighbours(&self) -> Vec<NodeDescriptor> {
        self.inner.slots.neighbours()
    }

    pub fn neighbour(&self, direction: Direction) -> Option<NodeDescriptor> {
        self.inner.slots.get(direction).map(|link| link.descriptor)
    }

    pub fn has_processed(&self, request_id: &RequestId) -> bool {
        self.inner.processed.contains(request_id)
    }

    pub fn sensor_readings(&self) -> Vec<SensorData> {
        self.inner.sensors.values().cloned().collect()
    }

    fn observe(&self, event: impl FnOnce(&dyn NetworkObserver)) {
        if let Some(observer) = &self.inner.observer {
            event(observer.as_ref());
        }
    }

    fn ensure_present(&self) -> Result<()> {
        if self.inner.departed.load(Ordering::Acquire) {
            return Err(Error::Transport(format!("node {} has left the overlay", self.id())));
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Publish the requesting and peer endpoints on the network.
    pub fn publish(&self) -> Result<()> {
        let d = self.descriptor();
        self.inner.network.publish_peer(&d.p2p, Arc::new(self.clone()))?;
        if let Err(e) = self.inner.network.publish_requesting(&d.requesting, Arc::new(self.clone())) {
            self.inner.network.unpublish(&d.p2p);
            return Err(e);
        }
        self.observe(|o| o.add_node(self.id(), d.position.x, d.position.y));
        Ok(())
    }

    /// Join the overlay once the clock reaches `at`. Returns at once if
    /// `at` has already passed.
    pub async fn start(&self, clock: &AcceleratedClock, at: DateTime<Utc>) -> Result<()> {
        clock.sleep_until_instant(at).await;
        self.join_overlay().await
    }

    /// Register with the registry and connect to the neighbours it returns.
    pub async fn join_overlay(&self) -> Result<()> {
        let neighbours = match self.inner.registry.register(self.descriptor().clone()).await {
            Ok(neighbours) => neighbours,
            Err(e) => {
                warn!(node = %self.id(), error = %e, "registration refused, staying out of the overlay");
                return Err(e);
            }
        };
        for neighbour in &neighbours {
            if let Err(e) = self.connect_to_neighbour(neighbour, true).await {
                warn!(node = %self.id(), peer = %neighbour.id, error = %e, "could not connect to neighbour");
            }
        }
        info!(
            node = %self.id(),
            neighbours = ?self.neighbours().iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            "joined overlay"
        );
        Ok(())
    }

    /// Unregister, notify every neighbour and withdraw the endpoints. Both
    /// pools are closed afterwards; requests already running finish.
    pub async fn leave_overlay(&self) -> Result<()> {
        self.inner.registry.unregister(self.id()).await?;
        self.inner.departed.store(true, Ordering::Release);
        for (_, link) in self.inner.slots.drain() {
            self.release(link).await;
        }
        let d = self.descriptor();
        self.inner.network.unpublish(&d.p2p);
        self.inner.network.unpublish(&d.requesting);
        self.inner.overlay_pool.close();
        self.inner.query_pool.close();
        info!(node = %self.id(), "left overlay");
        Ok(())
    }

    /// Open the edge to `peer` in its quadrant. A different peer holding the
    /// slot is told to drop its reverse edge. With `ask`, `peer` is asked to
    /// open the reverse edge.
    pub async fn connect_to_neighbour(&self, peer: &NodeDescriptor, ask: bool) -> Result<()> {
        let direction = peer.position.direction_from(&self.position()).ok_or_else(|| {
            Error::Overlay(format!("{} lies in no quadrant of {}", peer.id, self.id()))
        })?;

        let handle = match self.inner.network.connect_peer(&peer.p2p) {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(old) = self.inner.slots.clear(direction) {
                    self.release(old).await;
                }
                return Err(e);
            }
        };

        let link = PeerLink { descriptor: peer.clone(), handle: handle.clone() };
        if let Some(old) = self.inner.slots.replace(direction, link) {
            if old.descriptor.id != peer.id {
                debug!(node = %self.id(), peer = %old.descriptor.id, quadrant = %direction, "edge displaced");
                self.release(old).await;
            }
        }
        self.observe(|o| o.add_connection(self.id(), &peer.id));
        debug!(node = %self.id(), peer = %peer.id, quadrant = %direction, "edge opened");

        if ask {
            if let Err(e) = handle.ask4_connection(self.descriptor().clone()).await {
                if self.inner.slots.clear_if(direction, &peer.id).is_some() {
                    self.observe(|o| o.remove_connection(self.id(), &peer.id));
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Tell the peer of a dropped edge to drop its reverse edge.
    async fn release(&self, old: PeerLink) {
        self.observe(|o| o.remove_connection(self.id(), &old.descriptor.id));
        if let Err(e) = old.handle.ask4_disconnection(self.descriptor().clone()).await {
            warn!(node = %self.id(), peer = %old.descriptor.id, error = %e, "disconnection notice failed");
        }
    }

    async fn handle_disconnection(&self, peer: NodeDescriptor) -> Result<()> {
        let Some(direction) = peer.position.direction_from(&self.position()) else {
            return Ok(());
        };
        if self.inner.slots.clear_if(direction, &peer.id).is_none() {
            return Ok(());
        }
        self.observe(|o| o.remove_connection(self.id(), &peer.id));

        // Still registered: the peer replaced this edge instead of leaving.
        if self.inner.registry.registered(&peer.id).await? {
            debug!(node = %self.id(), peer = %peer.id, quadrant = %direction, "edge dropped by peer");
            return Ok(());
        }
        info!(node = %self.id(), peer = %peer.id, quadrant = %direction, "neighbour left");

        match self.inner.registry.find_new_neighbour(self.descriptor(), direction).await? {
            Some(candidate) if candidate.id != peer.id => self.connect_to_neighbour(&candidate, true).await,
            _ => {
                debug!(node = %self.id(), quadrant = %direction, "no replacement neighbour");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Client requests
    // ========================================================================

    /// Answer a synchronous client request with the aggregated result.
    pub async fn query(&self, request: Request) -> Result<QueryResult> {
        self.inner
            .query_pool
            .run(async {
                self.observe(|o| o.reset_nodes_blink());
                self.inner.processed.insert(request.id.clone());
                let mut state = self.evaluate(&request, ExecutionState::for_request(&request));
                self.propagate(&request, &mut state).await;
                info!(node = %self.id(), request = %request.id, result = %state.result(), "request answered");
                state.into_result()
            })
            .await
    }

    /// Accept an asynchronous client request; results go to its client.
    pub async fn query_async(&self, request: Request) -> Result<()> {
        let node = self.clone();
        self.inner.query_pool.spawn(async move {
            node.observe(|o| o.reset_nodes_blink());
            node.inner.processed.insert(request.id.clone());
            let state = node.evaluate(&request, ExecutionState::for_request(&request));
            node.propagate_async(&request, &state).await;
        });
        Ok(())
    }

    // ========================================================================
    // Forwarded requests
    // ========================================================================

    async fn forwarded(&self, continuation: RequestContinuation) -> Result<QueryResult> {
        self.ensure_present()?;
        let RequestContinuation { request, state } = continuation;
        if self.has_processed(&request.id) {
            debug!(node = %self.id(), request = %request.id, "already processed");
            return Ok(QueryResult::new());
        }
        self.inner
            .overlay_pool
            .run(async {
                if !self.inner.processed.insert(request.id.clone()) {
                    return QueryResult::new();
                }
                let mut state = self.evaluate(&request, state);
                self.propagate(&request, &mut state).await;
                state.into_result()
            })
            .await
    }

    async fn forwarded_async(&self, continuation: RequestContinuation) -> Result<()> {
        self.ensure_present()?;
        let RequestContinuation { request, state } = continuation;
        if self.has_processed(&request.id) {
            debug!(node = %self.id(), request = %request.id, "already processed");
            return Ok(());
        }
        let node = self.clone();
        self.inner.overlay_pool.spawn(async move {
            if !node.inner.processed.insert(request.id.clone()) {
                return;
            }
            let state = node.evaluate(&request, state);
            node.propagate_async(&request, &state).await;
        });
        Ok(())
    }

    // ========================================================================
    // Evaluation and propagation
    // ========================================================================

    fn processing_view(&self) -> ProcessingNode {
        ProcessingNode {
            id: self.id().to_owned(),
            position: self.position(),
            neighbours: self.neighbours(),
            sensors: self.inner.sensors.clone(),
        }
    }

    fn evaluate(&self, request: &Request, mut state: ExecutionState) -> ExecutionState {
        state.set_processing_node(Arc::new(self.processing_view()));
        self.observe(|o| o.toggle_node_blinking(self.id()));
        let local = request.query.eval(&mut state);
        debug!(node = %self.id(), request = %request.id, result = %local, "evaluated");
        state
    }

    /// Connected peers of the advertised quadrants, in fixed order.
    fn directional_targets(&self, state: &ExecutionState) -> Vec<(Direction, PeerLink)> {
        let Some(directions) = state.directions() else {
            return Vec::new();
        };
        directions
            .iter()
            .filter_map(|d| self.inner.slots.get(d).map(|link| (d, link)))
            .collect()
    }

    /// Neighbours inside the flood radius.
    fn flood_targets(&self, state: &ExecutionState) -> Vec<(Direction, PeerLink)> {
        self.inner
            .slots
            .snapshot()
            .into_iter()
            .filter(|(_, link)| state.within_flood_radius(&link.descriptor.position))
            .collect()
    }

    fn targets(&self, state: &ExecutionState) -> (Fanout, Vec<(Direction, PeerLink)>) {
        if !state.is_continuation_set() {
            return (Fanout::All, Vec::new());
        }
        if state.is_flooding() {
            (Fanout::All, self.flood_targets(state))
        } else if state.is_directional() && !state.no_more_hops() {
            (Fanout::First, self.directional_targets(state))
        } else {
            (Fanout::All, Vec::new())
        }
    }

    async fn propagate(&self, request: &Request, state: &mut ExecutionState) {
        let (fanout, targets) = self.targets(state);
        for (direction, link) in targets {
            self.observe(|o| o.start_light_animation(self.id(), &link.descriptor.id));
            let continuation = RequestContinuation::new(request.clone(), state.fork(true));
            match link.handle.execute(continuation).await {
                Ok(partial) => {
                    state.add_to_current_result(&partial);
                    if fanout == Fanout::First {
                        break;
                    }
                }
                Err(e) => self.dispatch_failed(direction, &link, &e),
            }
        }
    }

    async fn propagate_async(&self, request: &Request, state: &ExecutionState) {
        let (fanout, targets) = self.targets(state);
        for (direction, link) in targets {
            self.observe(|o| o.start_light_animation(self.id(), &link.descriptor.id));
            let continuation = RequestContinuation::new(request.clone(), state.fork(true));
            match link.handle.execute_async(continuation).await {
                Ok(()) if fanout == Fanout::First => break,
                Ok(()) => {}
                Err(e) => self.dispatch_failed(direction, &link, &e),
            }
        }
        self.send_to_client(request, state.result().clone()).await;
    }

    /// An unreachable peer loses its slot; a slow one keeps it.
    fn dispatch_failed(&self, direction: Direction, link: &PeerLink, error: &Error) {
        warn!(node = %self.id(), peer = %link.descriptor.id, error = %error, "forwarding failed");
        if matches!(error, Error::Transport(_)) && self.inner.slots.clear_if(direction, &link.descriptor.id).is_some() {
            self.observe(|o| o.remove_connection(self.id(), &link.descriptor.id));
        }
    }

    async fn send_to_client(&self, request: &Request, result: QueryResult) {
        let Some(client) = &request.client else {
            warn!(node = %self.id(), request = %request.id, "no client endpoint, partial result dropped");
            return;
        };
        let sink = match self.inner.network.connect_sink(&client.endpoint) {
            Ok(sink) => sink,
            Err(e) => {
                warn!(node = %self.id(), client = %client.identifier, error = %e, "client unreachable");
                return;
            }
        };
        if let Err(e) = sink.accept_request_result(request.id.clone(), result).await {
            warn!(node = %self.id(), client = %client.identifier, error = %e, "partial result not delivered");
        }
    }
}

// ============================================================================
// Protocol impls
// ============================================================================

#[async_trait]
impl SensorNodeP2P for SensorNode {
    async fn execute(&self, continuation: RequestContinuation) -> Result<QueryResult> {
        self.forwarded(continuation).await
    }

    async fn execute_async(&self, continuation: RequestContinuation) -> Result<()> {
        self.forwarded_async(continuation).await
    }

    async fn ask4_connection(&self, peer: NodeDescriptor) -> Result<()> {
        self.ensure_present()?;
        self.inner
            .overlay_pool
            .run(self.connect_to_neighbour(&peer, false))
            .await?
    }

    async fn ask4_disconnection(&self, peer: NodeDescriptor) -> Result<()> {
        self.handle_disconnection(peer).await
    }
}

#[async_trait]
impl RequestingService for SensorNode {
    async fn execute(&self, request: Request) -> Result<QueryResult> {
        self.query(request).await
    }

    async fn execute_async(&self, request: Request) -> Result<()> {
        self.query_async(request).await
    }
}
