//! Worker registry: who is alive and where to reach them.
//!
//! A single shared name→address table owned by the coordinator process and
//! exposed over HTTP, since workers run in other processes (often other
//! hosts). The liveness poller reads the same state in-process. Names come
//! from a monotonic sequence and are never handed out twice.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{GraphError, Result};

/// Shared registry table.
#[derive(Default)]
pub struct RegistryState {
    workers: RwLock<BTreeMap<String, SocketAddr>>,
    next_seq: AtomicU64,
}

impl RegistryState {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker reachable at `addr` and assigns it a fresh name.
    pub fn register(&self, addr: SocketAddr) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("worker-{seq}");
        self.workers.write().insert(name.clone(), addr);
        info!(%name, %addr, "registry.worker.registered");
        name
    }

    /// Removes a worker. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.workers.write().remove(name).is_some();
        if removed {
            info!(name, "registry.worker.unregistered");
        }
        removed
    }

    /// Names of every registered worker.
    pub fn worker_names(&self) -> BTreeSet<String> {
        self.workers.read().keys().cloned().collect()
    }

    /// Address a worker advertised at registration.
    pub fn lookup(&self, name: &str) -> Option<SocketAddr> {
        self.workers.read().get(name).copied()
    }

    /// Number of registered workers.
    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegisterRequest {
    addr: SocketAddr,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegisterResponse {
    name: String,
}

/// HTTP surface of the registry.
pub fn router(state: Arc<RegistryState>) -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/unregister/:name", post(unregister_handler))
        .route("/workers", get(workers_handler))
        .route("/count", get(count_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn register_handler(
    State(state): State<Arc<RegistryState>>,
    Json(req): Json<RegisterRequest>,
) -> Json<RegisterResponse> {
    Json(RegisterResponse {
        name: state.register(req.addr),
    })
}

async fn unregister_handler(
    State(state): State<Arc<RegistryState>>,
    Path(name): Path<String>,
) -> Json<bool> {
    Json(state.unregister(&name))
}

async fn workers_handler(
    State(state): State<Arc<RegistryState>>,
) -> Json<BTreeMap<String, SocketAddr>> {
    Json(state.workers.read().clone())
}

async fn count_handler(State(state): State<Arc<RegistryState>>) -> Json<usize> {
    Json(state.worker_count())
}

/// Client leg workers use to talk to the registry service.
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Creates a client against the registry's base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Registers this process and returns its assigned worker name.
    pub async fn register(&self, addr: SocketAddr) -> Result<String> {
        let url = format!("{}/register", self.base_url);
        let resp: RegisterResponse = self
            .http
            .post(url)
            .json(&RegisterRequest { addr })
            .send()
            .await
            .map_err(|err| transport(&self.base_url, err))?
            .error_for_status()
            .map_err(|err| transport(&self.base_url, err))?
            .json()
            .await
            .map_err(|err| transport(&self.base_url, err))?;
        Ok(resp.name)
    }

    /// Withdraws this process from the registry.
    pub async fn unregister(&self, name: &str) -> Result<bool> {
        let url = format!("{}/unregister/{name}", self.base_url);
        self.http
            .post(url)
            .send()
            .await
            .map_err(|err| transport(&self.base_url, err))?
            .error_for_status()
            .map_err(|err| transport(&self.base_url, err))?
            .json()
            .await
            .map_err(|err| transport(&self.base_url, err))
    }
}

fn transport(base_url: &str, err: reqwest::Error) -> GraphError {
    GraphError::transport(format!("registry at {base_url}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sequential_and_never_reused() {
        let registry = RegistryState::new();
        let addr: SocketAddr = ([127, 0, 0, 1], 9000).into();
        let first = registry.register(addr);
        let second = registry.register(addr);
        assert_eq!(first, "worker-0");
        assert_eq!(second, "worker-1");
        assert!(registry.unregister(&first));
        assert!(!registry.unregister(&first));
        // a later registration must not resurrect the retired name
        assert_eq!(registry.register(addr), "worker-2");
        assert_eq!(registry.worker_count(), 2);
        assert_eq!(registry.lookup(&second), Some(addr));
    }
}
