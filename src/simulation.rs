//! # Simulation Driver
//!
//! Deploys sensor nodes on a hex-offset grid, attaches clients to one target
//! node and plays the timeline on an accelerated clock:
//!
//! | Simulated time | Step |
//! |----------------|------|
//! | start + 60 s  | nodes start and join the overlay, in identifier order |
//! | start + 120 s | clients look up their node |
//! | start + 180 s | first request, then one every `request_spacing` |
//! | last request + drain + spacing | nodes leave the overlay |
//!
//! Every node carries the same seven numeric sensors with seeded random
//! readings plus the boolean sensor `ice`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::client::{Client, ClientPlan, PlannedRequest, RequestOutcome};
use crate::clock::{AcceleratedClock, ClockServer};
use crate::config::SimulationConfig;
use crate::model::{Direction, NodeDescriptor, Position, SensorData};
use crate::network::Network;
use crate::node::SensorNode;
use crate::observer::{NetworkObserver, TracingObserver};
use crate::query::ast::*;
use crate::query::Query;
use crate::registry::MemoryRegistry;
use crate::{Error, Result};

/// Numeric sensors installed on every simulated node.
pub const NUMERIC_SENSORS: [&str; 7] =
    ["weather", "wind-speed", "wind-direction", "smoke", "heat", "biological", "humidity"];

pub const REGISTER_OFFSET: TimeDelta = TimeDelta::seconds(60);
pub const CONNECT_OFFSET: TimeDelta = TimeDelta::seconds(120);
pub const FIRST_REQUEST_OFFSET: TimeDelta = TimeDelta::seconds(180);

// ============================================================================
// Deployment helpers
// ============================================================================

/// `instant + delta`, or a configuration error past the representable range.
fn offset(instant: DateTime<Utc>, delta: TimeDelta) -> Result<DateTime<Utc>> {
    instant
        .checked_add_signed(delta)
        .ok_or_else(|| Error::Config(format!("{instant} + {delta} lies beyond the timeline")))
}

/// Positions of `node_count` nodes on a hex-offset grid.
///
/// Odd rows hold `columns - 1` nodes at x = 2, 4, ...; even rows hold
/// `columns` nodes at x = 1, 3, 5, ...; row `r` lies at y = r.
pub fn grid_positions(node_count: usize, columns: usize) -> Vec<Position> {
    let mut positions = Vec::with_capacity(node_count);
    if columns == 0 {
        return positions;
    }
    let mut row = 1usize;
    while positions.len() < node_count {
        let offset = row % 2;
        for col in 0..columns - offset {
            if positions.len() == node_count {
                break;
            }
            positions.push(Position::new((col * 2 + 1 + offset) as f64, row as f64));
        }
        row += 1;
    }
    positions
}

/// Readings for one node: every numeric sensor in [0, 100) with two
/// decimals, plus `ice`.
pub fn sensor_suite(node_id: &str, rng: &mut impl Rng) -> Vec<SensorData> {
    let mut data: Vec<SensorData> = NUMERIC_SENSORS
        .iter()
        .map(|sensor| {
            let value: f64 = rng.gen_range(0.0..100.0);
            SensorData::new(node_id, *sensor, (value * 100.0).round() / 100.0)
        })
        .collect();
    data.push(SensorData::new(node_id, "ice", rng.gen_bool(0.25)));
    data
}

/// Request sets handed to clients in turn. `anchor` is the position of the
/// clients' target node.
pub fn request_sets(anchor: Position) -> Vec<Vec<Query>> {
    let (x, y) = (anchor.x, anchor.y);
    vec![
        vec![
            gquery(fgather("heat"), econt()),
            gquery(rgather("smoke", fgather("humidity")), fcont(abase(x, y), 3.0)),
            gquery(fgather("wind-speed"), dcont(rdirs(Direction::NE, fdirs(Direction::NW)), 3)),
        ],
        vec![
            bquery(
                and(cexp(ge(srand("heat"), crand(30.0))), cexp(ge(srand("smoke"), crand(20.0)))),
                dcont(fdirs(Direction::NE), 4),
            ),
            bquery(
                or(cexp(gt(srand("heat"), crand(80.0))), cexp(lt(crand(50.0), srand("humidity")))),
                fcont(rbase(), 4.0),
            ),
        ],
        vec![
            bquery(
                and(not(cexp(gt(srand("heat"), crand(70.0)))), cexp(ge(srand("humidity"), crand(60.0)))),
                fcont(abase(x + 2.0, y + 1.0), 2.5),
            ),
            bquery(sbexp("ice"), fcont(rbase(), 3.0)),
            gquery(
                rgather("weather", rgather("wind-direction", fgather("biological"))),
                fcont(rbase(), 2.0),
            ),
        ],
        vec![
            bquery(
                or(cexp(le(srand("biological"), crand(50.0))), cexp(ge(srand("wind-speed"), crand(10.0)))),
                dcont(rdirs(Direction::NE, fdirs(Direction::SE)), 3),
            ),
            gquery(fgather("temperature"), econt()),
        ],
    ]
}

// ============================================================================
// Report
// ============================================================================

/// Everything a finished run reports.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    /// Per client, in issue order.
    pub outcomes: Vec<RequestOutcome>,
    /// Neighbours of every node just before the nodes left, by node id.
    pub overlay: BTreeMap<String, Vec<String>>,
}

impl SimulationReport {
    pub fn outcomes_of(&self, client: &str) -> impl Iterator<Item = &RequestOutcome> {
        self.outcomes.iter().filter(move |o| o.client == client)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for o in &self.outcomes {
            let mode = if o.asynchronous { "async" } else { "sync" };
            writeln!(f, "{} [{mode}] {} -> {}", o.client, o.query, o.result)?;
        }
        write!(f, "{} nodes in the overlay", self.overlay.len())
    }
}

// ============================================================================
// Simulation
// ============================================================================

pub struct Simulation {
    config: SimulationConfig,
    clocks: ClockServer,
    registry: Arc<MemoryRegistry>,
    network: Network,
    nodes: Vec<SensorNode>,
    clients: Vec<Client>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Build and publish every node and client of `config`.
    pub fn with_observer(config: SimulationConfig, observer: Arc<dyn NetworkObserver>) -> Result<Self> {
        config.validate()?;
        let network = Network::with_settings(config.network_settings());
        let registry = Arc::new(MemoryRegistry::new());
        let mut rng = SmallRng::seed_from_u64(config.seed);

        let mut nodes = Vec::with_capacity(config.node_count);
        for (i, position) in grid_positions(config.node_count, config.grid_columns).into_iter().enumerate() {
            let id = format!("n{}", i + 1);
            let descriptor = NodeDescriptor::new(id.as_str(), position, config.node_range)?;
            let node = SensorNode::builder(descriptor, registry.clone(), network.clone())
                .sensors(sensor_suite(&id, &mut rng))
                .threads(config.node_threads)
                .observer(observer.clone())
                .build();
            node.publish()?;
            nodes.push(node);
        }

        let mut clients = Vec::with_capacity(config.client_count);
        for i in 1..=config.client_count {
            let client = Client::new(format!("c{i}"), registry.clone(), network.clone());
            client.open_inbound()?;
            clients.push(client);
        }

        info!(nodes = nodes.len(), clients = clients.len(), "simulation deployed");
        Ok(Self { config, clocks: ClockServer::new(), registry, network, nodes, clients })
    }

    pub fn config(&self) -> &SimulationConfig { &self.config }
    pub fn nodes(&self) -> &[SensorNode] { &self.nodes }
    pub fn clients(&self) -> &[Client] { &self.clients }
    pub fn registry(&self) -> &MemoryRegistry { &self.registry }
    pub fn network(&self) -> &Network { &self.network }

    pub fn node(&self, id: &str) -> Option<&SensorNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Plans for every client, relative to `start`.
    pub fn plans(&self, start: DateTime<Utc>) -> Result<Vec<ClientPlan>> {
        let anchor = self.node(&self.config.target_node).map(|n| n.position()).unwrap_or_default();
        let sets = request_sets(anchor);
        let connect_at = offset(start, CONNECT_OFFSET)?;
        let first = offset(start, FIRST_REQUEST_OFFSET)?;
        let mut plans = Vec::with_capacity(self.clients.len());
        for i in 0..self.clients.len() {
            let mut requests = Vec::new();
            for (k, query) in sets[i % sets.len()].iter().enumerate() {
                let spacing = i32::try_from(k)
                    .ok()
                    .and_then(|k| self.config.request_spacing.checked_mul(k))
                    .ok_or_else(|| Error::Config(format!("request {k} lies beyond the timeline")))?;
                requests.push(PlannedRequest {
                    at: offset(first, spacing)?,
                    query: query.clone(),
                    asynchronous: self.config.asynchronous,
                });
            }
            plans.push(ClientPlan {
                node: self.config.target_node.clone(),
                connect_at,
                requests,
                drain_window: self.config.drain_window,
            });
        }
        Ok(plans)
    }

    /// Instant after which the nodes leave: the last request, its drain
    /// window and one more spacing.
    pub fn end_instant(&self, plans: &[ClientPlan]) -> Result<DateTime<Utc>> {
        let last = plans
            .iter()
            .filter_map(|p| p.requests.last().map(|r| r.at))
            .max()
            .unwrap_or(plans.first().map_or(DateTime::<Utc>::MIN_UTC, |p| p.connect_at));
        offset(offset(last, self.config.drain_window)?, self.config.request_spacing)
    }

    /// Play the whole timeline and collect what the clients reported.
    pub async fn run(&self) -> Result<SimulationReport> {
        let clock = self.clocks.create_clock(
            &self.config.clock_uri,
            self.config.start_instant,
            self.config.start_delay,
            self.config.acceleration_factor,
        )?;
        let start = clock.start_instant();
        let plans = self.plans(start)?;
        let end = self.end_instant(&plans)?;
        let join_at = offset(start, REGISTER_OFFSET)?;

        let joining = {
            let nodes = self.nodes.clone();
            let clock = clock.clone();
            tokio::spawn(async move {
                for node in &nodes {
                    if let Err(e) = node.start(&clock, join_at).await {
                        warn!(node = %node.id(), error = %e, "node did not join");
                    }
                }
            })
        };

        let mut running = JoinSet::new();
        for (client, plan) in self.clients.iter().cloned().zip(plans) {
            let clock = clock.clone();
            running.spawn(async move { (client.id().to_owned(), client.run(&clock, &plan).await) });
        }

        if let Err(e) = joining.await {
            warn!(error = %e, "overlay construction aborted");
        }

        let mut per_client: BTreeMap<String, Vec<RequestOutcome>> = BTreeMap::new();
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((client, Ok(outcomes))) => {
                    per_client.insert(client, outcomes);
                }
                Ok((client, Err(e))) => warn!(client = %client, error = %e, "client run failed"),
                Err(e) => warn!(error = %e, "client task aborted"),
            }
        }

        clock.sleep_until_instant(end).await;
        let report = SimulationReport {
            outcomes: per_client.into_values().flatten().collect(),
            overlay: self.overlay_snapshot(),
        };
        self.shutdown().await;
        info!(requests = report.outcomes.len(), "simulation finished");
        Ok(report)
    }

    fn overlay_snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.nodes
            .iter()
            .map(|n| (n.id().to_owned(), n.neighbours().into_iter().map(|d| d.id).collect()))
            .collect()
    }

    async fn shutdown(&self) {
        for node in &self.nodes {
            if let Err(e) = node.leave_overlay().await {
                warn!(node = %node.id(), error = %e, "node did not leave cleanly");
            }
        }
        for client in &self.clients {
            client.close_inbound();
        }
    }
}
