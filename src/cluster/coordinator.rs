//! Cluster coordinator: boots the registry service, the public API and the
//! liveness poller, and owns their orderly shutdown.
//!
//! Startup order follows the dependency chain: registry first (workers need
//! somewhere to register), then the poller (feeds the pool), then the
//! public endpoint (drains into the pool). Shutdown is cooperative: one
//! flag flips, each service finishes its in-flight work and exits.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cluster::dispatcher::WorkerPool;
use crate::cluster::proto::{error_response, GraphRequest};
use crate::cluster::registry::{self, RegistryState};
use crate::cluster::{flag_raised, poller};
use crate::config::ClusterConfig;
use crate::error::{GraphError, Result};

/// A coordinator whose services are running.
pub struct RunningCoordinator {
    public_addr: SocketAddr,
    registry_addr: SocketAddr,
    registry: Arc<RegistryState>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl RunningCoordinator {
    /// Address of the client-facing API endpoint.
    pub fn public_addr(&self) -> SocketAddr {
        self.public_addr
    }

    /// Address of the worker registry endpoint.
    pub fn registry_addr(&self) -> SocketAddr {
        self.registry_addr
    }

    /// In-process view of the registry (poller truth).
    pub fn registry(&self) -> &Arc<RegistryState> {
        &self.registry
    }

    /// Flips the shutdown flag and waits for every service to drain.
    pub async fn shutdown(self) -> Result<()> {
        info!("coordinator shutting down");
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.await
                .map_err(|err| GraphError::transport(err.to_string()))??;
        }
        info!("coordinator stopped");
        Ok(())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    workers: usize,
}

struct ApiState {
    pool: Arc<WorkerPool>,
    registry: Arc<RegistryState>,
}

fn api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/op", post(op_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        workers: state.registry.worker_count(),
    })
}

async fn op_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<GraphRequest>,
) -> Response {
    match state.pool.dispatch(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// Binds both endpoints, spawns the poller, and returns the running
/// coordinator.
pub async fn spawn(config: ClusterConfig) -> Result<RunningCoordinator> {
    let registry = Arc::new(RegistryState::new());
    let pool = Arc::new(WorkerPool::new(config.acquire_timeout()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let registry_listener = bind(config.registry_bind).await?;
    let registry_addr = local_addr(&registry_listener)?;
    let registry_app = registry::router(Arc::clone(&registry));
    tasks.push(serve(registry_listener, registry_app, shutdown_rx.clone()));

    {
        let registry = Arc::clone(&registry);
        let pool = Arc::clone(&pool);
        let interval = config.poll_interval();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            poller::run(registry, pool, interval, shutdown).await;
            Ok(())
        }));
    }

    let api_listener = bind(config.public_bind).await?;
    let public_addr = local_addr(&api_listener)?;
    let api_state = Arc::new(ApiState {
        pool,
        registry: Arc::clone(&registry),
    });
    tasks.push(serve(api_listener, api_router(api_state), shutdown_rx));

    info!(%public_addr, %registry_addr, "coordinator listening");
    Ok(RunningCoordinator {
        public_addr,
        registry_addr,
        registry,
        shutdown: shutdown_tx,
        tasks,
    })
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| GraphError::transport(format!("bind {addr}: {err}")))
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr> {
    listener
        .local_addr()
        .map_err(|err| GraphError::transport(err.to_string()))
}

fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(flag_raised(shutdown))
            .await
            .map_err(|err| GraphError::transport(err.to_string()))
    })
}
