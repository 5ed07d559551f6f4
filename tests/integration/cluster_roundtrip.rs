//! End-to-end cluster behavior over loopback HTTP: registry handshake,
//! poller-driven pool membership, FIFO dispatch through the public API,
//! typed error round-tripping, and worker retirement.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use trellis::backend::{KvBackend, MemoryBackend};
use trellis::cluster::coordinator;
use trellis::cluster::proto::{GraphRequest, GraphResponse};
use trellis::cluster::worker;
use trellis::config::{ClusterConfig, WorkerConfig};
use trellis::model::ElementKind;
use trellis::AttrType;

fn test_cluster_config() -> ClusterConfig {
    ClusterConfig {
        public_bind: ([127, 0, 0, 1], 0).into(),
        registry_bind: ([127, 0, 0, 1], 0).into(),
        poll_interval_ms: 50,
        acquire_timeout_ms: Some(2_000),
    }
}

fn worker_config(registry_addr: SocketAddr) -> WorkerConfig {
    WorkerConfig {
        bind: ([127, 0, 0, 1], 0).into(),
        registry_url: format!("http://{registry_addr}"),
        recycle_ids: false,
    }
}

async fn call(
    client: &reqwest::Client,
    public_addr: SocketAddr,
    request: &GraphRequest,
) -> Result<GraphResponse, JsonValue> {
    let response = client
        .post(format!("http://{public_addr}/op"))
        .json(request)
        .send()
        .await
        .expect("public endpoint reachable");
    if response.status().is_success() {
        Ok(response.json().await.expect("well-formed response"))
    } else {
        Err(response.json().await.expect("well-formed error body"))
    }
}

/// Drives requests until a worker has been admitted into the pool.
async fn await_first_worker(client: &reqwest::Client, public_addr: SocketAddr) {
    let probe = GraphRequest::ListTypes {
        graph: "default".into(),
        kind: ElementKind::Vertex,
    };
    for _ in 0..50 {
        if call(client, public_addr, &probe).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("no worker joined the pool in time");
}

fn uid_of(response: GraphResponse) -> i64 {
    match response {
        GraphResponse::Uid { uid } => uid,
        other => panic!("expected a uid, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fixture_round_trips_through_the_full_stack() {
    let running = coordinator::spawn(test_cluster_config()).await.unwrap();
    // both workers share one backend, standing in for the shared store
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let worker_a = worker::spawn(worker_config(running.registry_addr()), Arc::clone(&backend))
        .await
        .unwrap();
    let worker_b = worker::spawn(worker_config(running.registry_addr()), Arc::clone(&backend))
        .await
        .unwrap();
    assert_ne!(worker_a.name(), worker_b.name());
    assert_eq!(running.registry().worker_count(), 2);

    let client = reqwest::Client::new();
    let public = running.public_addr();
    await_first_worker(&client, public).await;

    // types
    let done = call(
        &client,
        public,
        &GraphRequest::CreateVertexType {
            graph: "default".into(),
            name: "User".into(),
            schema: vec![
                (AttrType::Str, "name".into()),
                (AttrType::Int, "age".into()),
            ],
        },
    )
    .await
    .unwrap();
    assert!(matches!(done, GraphResponse::Done));
    call(
        &client,
        public,
        &GraphRequest::CreateVertexType {
            graph: "default".into(),
            name: "Movie".into(),
            schema: vec![(AttrType::Str, "title".into())],
        },
    )
    .await
    .unwrap();
    call(
        &client,
        public,
        &GraphRequest::CreateEdgeType {
            graph: "default".into(),
            name: "rates".into(),
            schema: vec![(AttrType::Int, "stars".into())],
        },
    )
    .await
    .unwrap();

    // a duplicate registration comes back as the exact typed failure
    let err = call(
        &client,
        public,
        &GraphRequest::CreateEdgeType {
            graph: "default".into(),
            name: "rates".into(),
            schema: vec![],
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err["error"], "duplicate_type");
    assert_eq!(err["name"], "rates");

    // elements, spread across both workers by FIFO rotation
    let user = uid_of(
        call(
            &client,
            public,
            &GraphRequest::InsertVertex {
                graph: "default".into(),
                vertex_type: Some("User".into()),
                properties: [
                    ("name".to_string(), json!("Scrooge")),
                    ("age".to_string(), json!(67)),
                ]
                .into(),
            },
        )
        .await
        .unwrap(),
    );
    let movie = uid_of(
        call(
            &client,
            public,
            &GraphRequest::InsertVertex {
                graph: "default".into(),
                vertex_type: Some("Movie".into()),
                properties: [("title".to_string(), json!("DuckTales"))].into(),
            },
        )
        .await
        .unwrap(),
    );
    let edge = uid_of(
        call(
            &client,
            public,
            &GraphRequest::AddEdge {
                graph: "default".into(),
                source_uid: user,
                source_type: "User".into(),
                targets: [(movie, "Movie".to_string())].into(),
                edge_type: "rates".into(),
                properties: [("stars".to_string(), json!(5))].into(),
            },
        )
        .await
        .unwrap(),
    );

    // reads can land on either worker; the shared backend keeps them honest
    match call(
        &client,
        public,
        &GraphRequest::IncomingEdges {
            graph: "default".into(),
            uid: movie,
            vertex_type: "Movie".into(),
            edge_type: Some("rates".into()),
        },
    )
    .await
    .unwrap()
    {
        GraphResponse::Adjacency { edges } => {
            assert_eq!(edges.get(&edge).map(String::as_str), Some("rates"));
        }
        other => panic!("expected adjacency, got {other:?}"),
    }
    match call(
        &client,
        public,
        &GraphRequest::GetProperty {
            graph: "default".into(),
            uid: edge,
            type_ref: "edge:rates".into(),
            key: "stars".into(),
        },
    )
    .await
    .unwrap()
    {
        GraphResponse::Property { value } => assert_eq!(value, Some(json!(5))),
        other => panic!("expected property, got {other:?}"),
    }
    match call(
        &client,
        public,
        &GraphRequest::CountElements {
            graph: "default".into(),
            type_ref: "edge:rates".into(),
        },
    )
    .await
    .unwrap()
    {
        GraphResponse::Count { count } => assert_eq!(count, 1),
        other => panic!("expected count, got {other:?}"),
    }

    // a lookup against a type nobody registered keeps its taxonomy through
    // dispatcher and worker alike
    let err = call(
        &client,
        public,
        &GraphRequest::CountElements {
            graph: "default".into(),
            type_ref: "edge:likes".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err["error"], "type_not_found");

    // retire one worker: it unregisters, the poller drains its handle, and
    // the cluster keeps serving on the survivor
    worker_b.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(running.registry().worker_count(), 1);
    for _ in 0..6 {
        let response = call(
            &client,
            public,
            &GraphRequest::CountElements {
                graph: "default".into(),
                type_ref: "edge:rates".into(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(response, GraphResponse::Count { count: 1 }));
    }

    worker_a.shutdown().await.unwrap();
    running.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn vertex_removal_cascades_across_the_wire() {
    let running = coordinator::spawn(test_cluster_config()).await.unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let worker = worker::spawn(worker_config(running.registry_addr()), backend)
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let public = running.public_addr();
    await_first_worker(&client, public).await;

    for (name, schema) in [
        ("User", vec![(AttrType::Str, "name".to_string())]),
        ("Movie", vec![(AttrType::Str, "title".to_string())]),
    ] {
        call(
            &client,
            public,
            &GraphRequest::CreateVertexType {
                graph: "g".into(),
                name: name.into(),
                schema,
            },
        )
        .await
        .unwrap();
    }
    call(
        &client,
        public,
        &GraphRequest::CreateEdgeType {
            graph: "g".into(),
            name: "rates".into(),
            schema: vec![(AttrType::Int, "stars".into())],
        },
    )
    .await
    .unwrap();

    let insert = |vertex_type: &str, key: &str, value: &str| GraphRequest::InsertVertex {
        graph: "g".into(),
        vertex_type: Some(vertex_type.into()),
        properties: [(key.to_string(), json!(value))].into(),
    };
    let movie = uid_of(call(&client, public, &insert("Movie", "title", "M")).await.unwrap());
    let mut raters = Vec::new();
    for name in ["a", "b", "c"] {
        let user = uid_of(call(&client, public, &insert("User", "name", name)).await.unwrap());
        call(
            &client,
            public,
            &GraphRequest::AddEdge {
                graph: "g".into(),
                source_uid: user,
                source_type: "User".into(),
                targets: [(movie, "Movie".to_string())].into(),
                edge_type: "rates".into(),
                properties: [("stars".to_string(), json!(3))].into(),
            },
        )
        .await
        .unwrap();
        raters.push(user);
    }

    call(
        &client,
        public,
        &GraphRequest::RemoveElement {
            graph: "g".into(),
            uid: movie,
            type_ref: "vertex:Movie".into(),
        },
    )
    .await
    .unwrap();
    match call(
        &client,
        public,
        &GraphRequest::CountElements {
            graph: "g".into(),
            type_ref: "edge:rates".into(),
        },
    )
    .await
    .unwrap()
    {
        GraphResponse::Count { count } => assert_eq!(count, 0, "all incident edges removed"),
        other => panic!("expected count, got {other:?}"),
    }
    for user in raters {
        match call(
            &client,
            public,
            &GraphRequest::OutgoingEdges {
                graph: "g".into(),
                uid: user,
                vertex_type: "User".into(),
                edge_type: None,
            },
        )
        .await
        .unwrap()
        {
            GraphResponse::Adjacency { edges } => assert!(edges.is_empty()),
            other => panic!("expected adjacency, got {other:?}"),
        }
    }

    worker.shutdown().await.unwrap();
    running.shutdown().await.unwrap();
}
