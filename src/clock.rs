//! Accelerated simulation clock.
//!
//! A clock pins a simulated start instant to a wall-clock epoch and runs
//! simulated time `acceleration` times faster than real time:
//!
//! ```text
//! real(instant) = start_epoch + (instant - start_instant) / acceleration
//! ```
//!
//! Delays are computed by a pure function of the target instant and "now";
//! the async helpers only sleep for the computed delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::info;

use crate::{Error, Result};

// ============================================================================
// AcceleratedClock
// ============================================================================

#[derive(Debug, Clone)]
pub struct AcceleratedClock {
    uri: String,
    start_instant: DateTime<Utc>,
    start_epoch: Instant,
    acceleration: f64,
}

impl AcceleratedClock {
    /// A clock whose start instant is reached `start_delay` from now.
    pub fn new(
        uri: impl Into<String>,
        start_instant: DateTime<Utc>,
        start_delay: Duration,
        acceleration: f64,
    ) -> Result<Self> {
        let uri = uri.into();
        let start_epoch = Instant::now().checked_add(start_delay).ok_or_else(|| {
            Error::Config(format!("clock {uri}: start delay of {start_delay:?} is out of range"))
        })?;
        Self::with_epoch(uri, start_instant, start_epoch, acceleration)
    }

    pub fn with_epoch(
        uri: impl Into<String>,
        start_instant: DateTime<Utc>,
        start_epoch: Instant,
        acceleration: f64,
    ) -> Result<Self> {
        let uri = uri.into();
        if !acceleration.is_finite() || acceleration <= 0.0 {
            return Err(Error::Config(format!(
                "clock {uri}: acceleration factor must be positive, got {acceleration}"
            )));
        }
        Ok(Self { uri, start_instant, start_epoch, acceleration })
    }

    pub fn uri(&self) -> &str { &self.uri }
    pub fn start_instant(&self) -> DateTime<Utc> { self.start_instant }
    pub fn start_epoch(&self) -> Instant { self.start_epoch }
    pub fn acceleration_factor(&self) -> f64 { self.acceleration }

    /// Real time between the start epoch and `instant`; zero before the start,
    /// `Duration::MAX` when too far ahead to represent.
    pub fn real_offset(&self, instant: DateTime<Utc>) -> Duration {
        let simulated = instant.signed_duration_since(self.start_instant);
        let seconds = match simulated.num_nanoseconds() {
            Some(nanos) => nanos as f64 / 1e9,
            None => simulated.num_milliseconds() as f64 / 1e3,
        };
        if seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(seconds / self.acceleration).unwrap_or(Duration::MAX)
    }

    /// Real delay from `now` until `instant`; zero if already past.
    pub fn delay_until_instant_from(&self, instant: DateTime<Utc>, now: Instant) -> Duration {
        match self.start_epoch.checked_add(self.real_offset(instant)) {
            Some(at) => at.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    pub fn nano_delay_until_instant(&self, instant: DateTime<Utc>) -> u64 {
        let nanos = self.delay_until_instant_from(instant, Instant::now()).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }

    /// Simulated instant corresponding to the real instant `now`.
    pub fn instant_at(&self, now: Instant) -> DateTime<Utc> {
        let (real, sign) = if now >= self.start_epoch {
            (now - self.start_epoch, 1.0)
        } else {
            (self.start_epoch - now, -1.0)
        };
        let simulated = real.as_secs_f64() * self.acceleration * sign;
        let limit = if sign > 0.0 { DateTime::<Utc>::MAX_UTC } else { DateTime::<Utc>::MIN_UTC };
        self.start_instant
            .checked_add_signed(TimeDelta::nanoseconds((simulated * 1e9) as i64))
            .unwrap_or(limit)
    }

    pub fn current_instant(&self) -> DateTime<Utc> {
        self.instant_at(Instant::now())
    }

    pub async fn wait_until_start(&self) {
        tokio::time::sleep_until(self.start_epoch).await;
    }

    pub async fn sleep_until_instant(&self, instant: DateTime<Utc>) {
        tokio::time::sleep(self.delay_until_instant_from(instant, Instant::now())).await;
    }
}

// ============================================================================
// ClockServer
// ============================================================================

/// Named clocks shared by every component of a simulation.
#[derive(Debug, Clone, Default)]
pub struct ClockServer {
    clocks: Arc<RwLock<HashMap<String, AcceleratedClock>>>,
}

impl ClockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_clock(
        &self,
        uri: &str,
        start_instant: DateTime<Utc>,
        start_delay: Duration,
        acceleration: f64,
    ) -> Result<AcceleratedClock> {
        let mut clocks = self.clocks.write();
        if clocks.contains_key(uri) {
            return Err(Error::Config(format!("clock {uri} already exists")));
        }
        let clock = AcceleratedClock::new(uri, start_instant, start_delay, acceleration)?;
        clocks.insert(uri.to_owned(), clock.clone());
        info!(clock = %uri, start = %start_instant, acceleration, "clock created");
        Ok(clock)
    }

    pub fn get_clock(&self, uri: &str) -> Result<AcceleratedClock> {
        self.clocks
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unresolved clock URI {uri}")))
    }
}
