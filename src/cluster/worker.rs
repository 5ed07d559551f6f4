//! Worker service: executes graph operations against the backend.
//!
//! A worker is stateless apart from its lazily opened `Graph` per graph
//! name. It registers with the coordinator's registry on startup, serves
//! `POST /op` until shut down, drains in-flight requests, and unregisters
//! on the way out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::backend::KvBackend;
use crate::cluster::proto::{error_response, GraphRequest, GraphResponse};
use crate::cluster::registry::RegistryClient;
use crate::config::WorkerConfig;
use crate::error::{GraphError, Result};
use crate::graph::{split_properties, EdgeTypeSpec, Graph, GraphOptions, VertexSpec, VertexTypeSpec};
use crate::model::{parse_qualified, ElementKind};
use crate::store::EdgeDirection;

/// Per-process worker state: the backend connection and the graphs opened
/// so far.
pub struct WorkerState {
    backend: Arc<dyn KvBackend>,
    options: GraphOptions,
    graphs: RwLock<HashMap<String, Graph>>,
}

impl WorkerState {
    /// Creates worker state over a backend connection.
    pub fn new(backend: Arc<dyn KvBackend>, options: GraphOptions) -> Self {
        Self {
            backend,
            options,
            graphs: RwLock::new(HashMap::new()),
        }
    }

    fn graph(&self, name: &str) -> Result<Graph> {
        if let Some(graph) = self.graphs.read().get(name) {
            return Ok(graph.clone());
        }
        debug!(graph = name, "worker.graph.open");
        let opened = Graph::open_with(
            Arc::clone(&self.backend),
            name,
            Arc::new(crate::codec::JsonCodec),
            self.options,
        )?;
        let mut guard = self.graphs.write();
        Ok(guard.entry(name.to_string()).or_insert(opened).clone())
    }

    /// Executes one operation synchronously against the store.
    pub fn execute(&self, request: GraphRequest) -> Result<GraphResponse> {
        let graph = self.graph(request.graph())?;
        let store = graph.store();
        match request {
            GraphRequest::CreateVertexType { name, schema, .. } => {
                let mut spec = VertexTypeSpec::new(name);
                for (ty, attr) in schema {
                    spec = spec.attr(ty, attr);
                }
                graph.create_vertex_type(spec)?;
                Ok(GraphResponse::Done)
            }
            GraphRequest::CreateEdgeType { name, schema, .. } => {
                let mut spec = EdgeTypeSpec::new(name);
                for (ty, attr) in schema {
                    spec = spec.attr(ty, attr);
                }
                graph.create_edge_type(spec)?;
                Ok(GraphResponse::Done)
            }
            GraphRequest::GetTypeDefinition { type_ref, .. } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                let handle = store.registry().get_type(kind, name)?;
                Ok(GraphResponse::Definition {
                    schema: handle.schema,
                })
            }
            GraphRequest::RemoveType { type_ref, .. } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                store.registry().remove_type(kind, name)?;
                Ok(GraphResponse::Done)
            }
            GraphRequest::ListTypes { kind, .. } => Ok(GraphResponse::Names {
                names: store.registry().list_types(kind)?,
            }),
            GraphRequest::CountElements { type_ref, .. } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                Ok(GraphResponse::Count {
                    count: store.count(kind, name)?,
                })
            }
            GraphRequest::ElementsOfType { type_ref, .. } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                Ok(GraphResponse::Uids {
                    uids: store.elements_of_type(kind, name)?,
                })
            }
            GraphRequest::InsertVertex {
                vertex_type,
                properties,
                ..
            } => {
                let mut spec = match vertex_type {
                    Some(name) => VertexSpec::of_type(name),
                    None => VertexSpec::generic(),
                };
                spec.properties = properties;
                let vertex = graph.insert_vertex(spec)?;
                Ok(GraphResponse::Uid { uid: vertex.uid() })
            }
            GraphRequest::GetVertex {
                uid, vertex_type, ..
            } => {
                let vertex = graph.get_vertex(uid, vertex_type)?;
                Ok(GraphResponse::Uid { uid: vertex.uid() })
            }
            GraphRequest::SearchVertex {
                vertex_type,
                predicates,
                ..
            } => {
                let vertices = graph.search_vertex(vertex_type, &predicates)?;
                Ok(GraphResponse::Uids {
                    uids: vertices.iter().map(|v| v.uid()).collect(),
                })
            }
            GraphRequest::GetProperty {
                uid, type_ref, key, ..
            } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                Ok(GraphResponse::Property {
                    value: store.get_property(uid, kind, name, &key)?,
                })
            }
            GraphRequest::SetProperty {
                uid,
                type_ref,
                key,
                value,
                ..
            } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                store.set_property(uid, kind, name, &key, &value)?;
                Ok(GraphResponse::Done)
            }
            GraphRequest::PropertyKeys { uid, type_ref, .. } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                Ok(GraphResponse::Keys {
                    keys: store.property_keys(uid, kind, name)?,
                })
            }
            GraphRequest::AddEdge {
                source_uid,
                source_type,
                targets,
                edge_type,
                properties,
                ..
            } => {
                let handle = store.registry().get_type(ElementKind::Edge, &edge_type)?;
                let (structured, unstructured) = split_properties(&handle, &properties)?;
                let uid = store.add_edge(
                    source_uid,
                    &source_type,
                    &targets,
                    &edge_type,
                    structured,
                    &unstructured,
                )?;
                Ok(GraphResponse::Uid { uid })
            }
            GraphRequest::RemoveEdge {
                source_uid,
                source_type,
                edge_uid,
                edge_type,
                ..
            } => {
                store.remove_edge(source_uid, &source_type, edge_uid, &edge_type)?;
                Ok(GraphResponse::Done)
            }
            GraphRequest::AddTarget {
                edge_uid,
                edge_type,
                vertex_uid,
                vertex_type,
                ..
            } => {
                store.add_target(vertex_uid, &vertex_type, edge_uid, &edge_type)?;
                Ok(GraphResponse::Done)
            }
            GraphRequest::RemoveTarget {
                edge_uid,
                edge_type,
                vertex_uid,
                vertex_type,
                ..
            } => {
                store.remove_target(vertex_uid, &vertex_type, edge_uid, &edge_type)?;
                Ok(GraphResponse::Done)
            }
            GraphRequest::OutgoingEdges {
                uid,
                vertex_type,
                edge_type,
                ..
            } => Ok(GraphResponse::Adjacency {
                edges: store.vertex_adjacency(
                    uid,
                    &vertex_type,
                    EdgeDirection::Outgoing,
                    edge_type.as_deref(),
                )?,
            }),
            GraphRequest::IncomingEdges {
                uid,
                vertex_type,
                edge_type,
                ..
            } => Ok(GraphResponse::Adjacency {
                edges: store.vertex_adjacency(
                    uid,
                    &vertex_type,
                    EdgeDirection::Incoming,
                    edge_type.as_deref(),
                )?,
            }),
            GraphRequest::EdgeSource { uid, edge_type, .. } => {
                let (source_uid, vertex_type) = store.edge_source(uid, &edge_type)?;
                Ok(GraphResponse::SourceRef {
                    uid: source_uid,
                    vertex_type,
                })
            }
            GraphRequest::EdgeTargets { uid, edge_type, .. } => Ok(GraphResponse::Adjacency {
                edges: store.edge_targets(uid, &edge_type)?,
            }),
            GraphRequest::RemoveElement { uid, type_ref, .. } => {
                let (kind, name) = parse_qualified(&type_ref)?;
                store.remove_element(uid, kind, name)?;
                Ok(GraphResponse::Done)
            }
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// HTTP surface of a worker.
pub fn router(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/op", post(op_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn op_handler(
    State(state): State<Arc<WorkerState>>,
    Json(request): Json<GraphRequest>,
) -> Response {
    // the store is synchronous; keep it off the async runtime's threads
    let outcome = task::spawn_blocking(move || state.execute(request)).await;
    match outcome {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(err)) => error_response(err).into_response(),
        Err(join_err) => {
            error_response(GraphError::transport(join_err.to_string())).into_response()
        }
    }
}

/// A worker whose server task is running.
pub struct RunningWorker {
    name: String,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    served: task::JoinHandle<Result<()>>,
}

impl RunningWorker {
    /// The name assigned by the registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operation endpoint this worker serves.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Flips the running flag, drains in-flight requests, unregisters.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.served
            .await
            .map_err(|err| GraphError::transport(err.to_string()))?
    }
}

/// Binds the worker endpoint, registers with the registry, and starts
/// serving in a background task.
pub async fn spawn(config: WorkerConfig, backend: Arc<dyn KvBackend>) -> Result<RunningWorker> {
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|err| GraphError::transport(format!("bind {}: {err}", config.bind)))?;
    let addr = listener
        .local_addr()
        .map_err(|err| GraphError::transport(err.to_string()))?;
    let registry = RegistryClient::new(&config.registry_url);
    let name = registry.register(addr).await?;
    info!(%name, %addr, "worker registered");

    let state = Arc::new(WorkerState::new(
        backend,
        GraphOptions {
            recycle_ids: config.recycle_ids,
        },
    ));
    let app = router(state);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task_name = name.clone();
    let served = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(crate::cluster::flag_raised(shutdown_rx))
            .await
            .map_err(|err| GraphError::transport(err.to_string()))?;
        if let Err(err) = registry.unregister(&task_name).await {
            warn!(name = %task_name, %err, "unregister failed during shutdown");
        }
        info!(name = %task_name, "worker stopped");
        Ok(())
    });
    Ok(RunningWorker {
        name,
        addr,
        shutdown: shutdown_tx,
        served,
    })
}
