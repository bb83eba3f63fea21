//! Bounded worker pools.
//!
//! A pool is a semaphore in front of the tokio runtime: at most `size`
//! tasks submitted through the same pool run at once, the rest wait their
//! turn.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::{Error, Result};

/// Threads reserved for overlay traffic when a node is split into pools.
pub const MAX_OVERLAY_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(name: &'static str, size: usize) -> Self {
        let size = size.max(1);
        Self { name, size, permits: Arc::new(Semaphore::new(size)) }
    }

    /// Overlay and query pools for a node allowed `threads` workers:
    /// up to four for the overlay, the remainder for queries, at least one each.
    pub fn split(threads: usize) -> (WorkerPool, WorkerPool) {
        let overlay = threads.clamp(1, MAX_OVERLAY_WORKERS);
        let query = threads.saturating_sub(MAX_OVERLAY_WORKERS).max(1);
        (Self::new("overlay", overlay), Self::new("query", query))
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn size(&self) -> usize { self.size }
    pub fn available(&self) -> usize { self.permits.available_permits() }

    /// Run `task` on the caller's task once a worker is free.
    pub async fn run<F: Future>(&self, task: F) -> Result<F::Output> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Transport(format!("{} pool is closed", self.name)))?;
        Ok(task.await)
    }

    /// Submit `task` and return immediately.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let name = self.name;
        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => task.await,
                Err(_) => warn!(pool = name, "pool is closed, task dropped"),
            }
        });
    }

    /// Refuse further work. Running tasks finish.
    pub fn close(&self) {
        self.permits.close();
    }
}
