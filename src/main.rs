//! sensor-mesh simulation runner.
//!
//! Reads configuration from environment variables (see
//! [`sensor_mesh::SimulationConfig`]), deploys the grid, plays the timeline
//! on the accelerated clock and logs what every client received.
//!
//! ## Quick start
//!
//! ```bash
//! # Defaults: 50 nodes, 4 clients, asynchronous requests
//! cargo run --release
//!
//! # Small synchronous run with peer traffic encoded as JSON
//! SENSOR_MESH_NODE_COUNT=9 \
//! SENSOR_MESH_GRID_COLUMNS=3 \
//! SENSOR_MESH_TARGET_NODE=n3 \
//! SENSOR_MESH_ASYNC=false \
//! SENSOR_MESH_WIRE_ENCODING=true \
//! SENSOR_MESH_LOG_LEVEL=sensor_mesh=debug,info \
//!   cargo run --release
//! ```

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use sensor_mesh::{Simulation, SimulationConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let config = SimulationConfig::from_env()?;

    // ── Tracing ───────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .compact()
        .init();

    info!(
        nodes = config.node_count,
        clients = config.client_count,
        asynchronous = config.asynchronous,
        acceleration = config.acceleration_factor,
        start = %config.start_instant,
        "sensor-mesh starting"
    );

    // ── Run ───────────────────────────────────────────────────────────────────
    let simulation = Simulation::new(config)?;
    let report = simulation.run().await?;

    for outcome in &report.outcomes {
        info!(
            client = %outcome.client,
            request = %outcome.request_id,
            asynchronous = outcome.asynchronous,
            query = %outcome.query,
            result = %outcome.result,
            "request outcome"
        );
    }
    info!(requests = report.outcomes.len(), nodes = report.overlay.len(), "sensor-mesh finished");
    Ok(())
}
