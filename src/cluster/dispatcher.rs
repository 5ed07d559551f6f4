//! Worker pool dispatcher.
//!
//! A FIFO queue of worker handles with explicit acquire/release semantics.
//! Acquiring blocks while the queue is empty; that wait is the pool's
//! backpressure mechanism and is unbounded unless a timeout is configured.
//! The dispatcher never health-checks and never talks to the registry:
//! membership is the poller's job, and an unhealthy handle is pruned, not
//! recycled.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cluster::proto::{GraphRequest, GraphResponse};
use crate::error::{GraphError, Result};

/// A live worker as seen from the dispatcher: its registry name, its
/// operation endpoint, and a reusable HTTP client.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    name: String,
    addr: SocketAddr,
    http: reqwest::Client,
}

impl WorkerHandle {
    /// Wraps a registry entry into a callable handle.
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
            http: reqwest::Client::new(),
        }
    }

    /// The worker's registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes one graph operation on the worker.
    ///
    /// A transport-level failure surfaces as [`WorkerUnreachable`]; an error
    /// response from a reachable worker is decoded back into the exact
    /// typed failure it raised.
    ///
    /// [`WorkerUnreachable`]: GraphError::WorkerUnreachable
    pub async fn call(&self, request: &GraphRequest) -> Result<GraphResponse> {
        let url = format!("http://{}/op", self.addr);
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                GraphError::worker_unreachable(format!("{} at {}: {err}", self.name, self.addr))
            })?;
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|err| GraphError::transport(format!("{}: {err}", self.name)))
        } else {
            let err: GraphError = response
                .json()
                .await
                .map_err(|err| GraphError::transport(format!("{}: {err}", self.name)))?;
            Err(err)
        }
    }
}

/// FIFO pool of worker handles.
pub struct WorkerPool {
    tx: UnboundedSender<WorkerHandle>,
    rx: Mutex<UnboundedReceiver<WorkerHandle>>,
    acquire_timeout: Option<Duration>,
}

impl WorkerPool {
    /// Creates an empty pool. `acquire_timeout` bounds the wait for a free
    /// worker; `None` keeps the historical unbounded-wait behavior.
    pub fn new(acquire_timeout: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            acquire_timeout,
        }
    }

    /// Returns a handle to the back of the queue.
    pub fn release(&self, handle: WorkerHandle) {
        // send only fails if the receiver is gone, i.e. the pool is dropping
        let _ = self.tx.send(handle);
    }

    /// Takes the handle at the front of the queue, waiting while none is
    /// available.
    pub async fn acquire(&self) -> Result<WorkerHandle> {
        let mut rx = self.rx.lock().await;
        let received = match self.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, rx.recv()).await.map_err(|_| {
                GraphError::worker_unreachable(format!(
                    "no worker became available within {limit:?}"
                ))
            })?,
            None => rx.recv().await,
        };
        received.ok_or_else(|| GraphError::worker_unreachable("worker pool closed"))
    }

    /// Drains the queue once, dropping every handle of the named worker.
    /// Queue length is bounded by the worker count, so the drain is linear
    /// and cheap.
    pub async fn prune(&self, name: &str) -> usize {
        let mut rx = self.rx.lock().await;
        let mut kept = Vec::new();
        let mut dropped = 0;
        while let Ok(handle) = rx.try_recv() {
            if handle.name() == name {
                dropped += 1;
            } else {
                kept.push(handle);
            }
        }
        for handle in kept {
            let _ = self.tx.send(handle);
        }
        if dropped > 0 {
            debug!(name, dropped, "pool.pruned");
        }
        dropped
    }

    /// Runs one operation through the pool: acquire, invoke, release.
    ///
    /// On a transport failure the handle is **not** re-queued (pruning dead
    /// workers is the poller's job) and the failure surfaces to the caller
    /// unchanged. A typed graph error means the worker is healthy, so its
    /// handle goes back into rotation.
    pub async fn dispatch(&self, request: &GraphRequest) -> Result<GraphResponse> {
        let handle = self.acquire().await?;
        match handle.call(request).await {
            Ok(response) => {
                self.release(handle);
                Ok(response)
            }
            Err(err @ GraphError::WorkerUnreachable { .. }) => {
                warn!(worker = handle.name(), %err, "pool.worker.dropped");
                Err(err)
            }
            Err(err) => {
                self.release(handle);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str) -> WorkerHandle {
        WorkerHandle::new(name, ([127, 0, 0, 1], 1).into())
    }

    #[tokio::test]
    async fn acquire_is_fifo_and_release_requeues() {
        let pool = WorkerPool::new(None);
        pool.release(handle("worker-0"));
        pool.release(handle("worker-1"));
        let first = pool.acquire().await.unwrap();
        assert_eq!(first.name(), "worker-0");
        pool.release(first);
        assert_eq!(pool.acquire().await.unwrap().name(), "worker-1");
        assert_eq!(pool.acquire().await.unwrap().name(), "worker-0");
    }

    #[tokio::test]
    async fn acquire_times_out_when_configured() {
        let pool = WorkerPool::new(Some(Duration::from_millis(20)));
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, GraphError::WorkerUnreachable { .. }));
    }

    #[tokio::test]
    async fn prune_removes_only_the_named_worker() {
        let pool = WorkerPool::new(Some(Duration::from_millis(20)));
        pool.release(handle("worker-0"));
        pool.release(handle("worker-1"));
        pool.release(handle("worker-0"));
        assert_eq!(pool.prune("worker-0").await, 2);
        assert_eq!(pool.acquire().await.unwrap().name(), "worker-1");
        assert!(pool.acquire().await.is_err());
    }
}
