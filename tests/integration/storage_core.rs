//! Storage-engine behavior over the in-memory backend: type gating,
//! adjacency symmetry, cascading removal, the structured/unstructured
//! property split, search and identifier allocation.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use trellis::backend::{KvBackend, MemoryBackend, MemoryOptions};
use trellis::codec::AttrMap;
use trellis::model::{FIRST_UID, GENERIC_VERTEX};
use trellis::{
    AttrType, EdgeTypeSpec, Graph, GraphError, Result, VertexSpec, VertexTypeSpec,
};

fn open_graph() -> Result<Graph> {
    Graph::open(Arc::new(MemoryBackend::new()), "default")
}

fn user_type() -> VertexTypeSpec {
    VertexTypeSpec::new("User")
        .attr(AttrType::Str, "name")
        .attr(AttrType::Int, "age")
}

fn movie_type() -> VertexTypeSpec {
    VertexTypeSpec::new("Movie")
        .attr(AttrType::Str, "title")
        .attr(AttrType::Int, "released")
}

fn rates_type() -> EdgeTypeSpec {
    EdgeTypeSpec::new("rates").attr(AttrType::Int, "stars")
}

fn stars(n: i64) -> AttrMap {
    [("stars".to_string(), json!(n))].into()
}

#[test]
fn insert_is_gated_on_type_registration() -> Result<()> {
    let graph = open_graph()?;
    let err = graph
        .insert_vertex(VertexSpec::of_type("User").property("name", "Scrooge"))
        .unwrap_err();
    assert!(
        matches!(err, GraphError::TypeNotFound { ref name, .. } if name == "User"),
        "expected TypeNotFound, got {err}"
    );

    graph.create_vertex_type(user_type())?;
    let vertex = graph.insert_vertex(
        VertexSpec::of_type("User")
            .property("name", "Scrooge")
            .property("age", 67),
    )?;
    assert_eq!(vertex.get_property("name")?, Some(json!("Scrooge")));

    // edges are gated the same way
    let other = graph.insert_vertex(VertexSpec::of_type("User").property("name", "Donald"))?;
    let err = vertex
        .add_edge(&[&other], "rates", stars(5))
        .unwrap_err();
    assert!(matches!(err, GraphError::TypeNotFound { .. }));
    graph.create_edge_type(rates_type())?;
    vertex.add_edge(&[&other], "rates", stars(5))?;
    Ok(())
}

#[test]
fn first_identifier_is_the_fresh_graph_sentinel() -> Result<()> {
    let graph = open_graph()?;
    graph.create_vertex_type(user_type())?;
    let vertex = graph.insert_vertex(VertexSpec::of_type("User").property("age", 1))?;
    assert_eq!(vertex.uid(), FIRST_UID);
    Ok(())
}

#[test]
fn identifiers_are_unique_across_store_instances() -> Result<()> {
    // two Graph instances over one backend stand in for two worker
    // processes sharing the store
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let first = Graph::open(Arc::clone(&backend), "default")?;
    let second = Graph::open(Arc::clone(&backend), "default")?;
    first.create_vertex_type(user_type())?;
    // registration through one store is visible through the other
    assert!(second.get_vertex_type("User").is_ok());

    let mut seen = BTreeSet::new();
    for _ in 0..50 {
        let a = first.insert_vertex(VertexSpec::of_type("User").property("age", 1))?;
        let b = second.insert_vertex(VertexSpec::of_type("User").property("age", 2))?;
        assert!(seen.insert(a.uid()), "uid {} issued twice", a.uid());
        assert!(seen.insert(b.uid()), "uid {} issued twice", b.uid());
    }
    Ok(())
}

#[test]
fn adjacency_stays_symmetric_through_add_and_remove() -> Result<()> {
    let graph = open_graph()?;
    graph.create_vertex_type(user_type())?;
    graph.create_vertex_type(movie_type())?;
    graph.create_edge_type(rates_type())?;

    let src = graph.insert_vertex(VertexSpec::of_type("User").property("name", "Mickey"))?;
    let t1 = graph.insert_vertex(VertexSpec::of_type("Movie").property("title", "DuckTales"))?;
    let t2 = graph.insert_vertex(VertexSpec::of_type("Movie").property("title", "Darkwing"))?;

    // hyperedge: one source, two targets
    let edge = src.add_edge(&[&t1, &t2], "rates", stars(5))?;
    let outgoing: Vec<i64> = src.outgoing_edges(None)?.iter().map(|e| e.uid()).collect();
    assert_eq!(outgoing, vec![edge.uid()], "source outgoing map updated");
    for target in [&t1, &t2] {
        let incoming: Vec<i64> = target
            .incoming_edges(None)?
            .iter()
            .map(|e| e.uid())
            .collect();
        assert_eq!(incoming, vec![edge.uid()], "target incoming map updated");
    }
    assert_eq!(edge.source()?.uid(), src.uid());
    assert_eq!(edge.targets()?.len(), 2);

    src.remove_edge(&edge)?;
    assert!(src.outgoing_edges(None)?.is_empty());
    assert!(t1.incoming_edges(None)?.is_empty());
    assert!(t2.incoming_edges(None)?.is_empty());
    Ok(())
}

#[test]
fn edge_targets_can_be_added_and_removed_symmetrically() -> Result<()> {
    let graph = open_graph()?;
    graph.create_vertex_type(user_type())?;
    graph.create_vertex_type(movie_type())?;
    graph.create_edge_type(rates_type())?;

    let src = graph.insert_vertex(VertexSpec::of_type("User").property("name", "Gus"))?;
    let t1 = graph.insert_vertex(VertexSpec::of_type("Movie").property("title", "A"))?;
    let t2 = graph.insert_vertex(VertexSpec::of_type("Movie").property("title", "B"))?;

    let edge = src.add_edge(&[&t1], "rates", stars(3))?;
    edge.add_target(&t2)?;
    assert_eq!(edge.targets()?.len(), 2);
    assert_eq!(t2.incoming_edges(None)?.len(), 1);

    edge.remove_target(&t2)?;
    assert_eq!(edge.targets()?.len(), 1);
    assert!(t2.incoming_edges(None)?.is_empty());
    Ok(())
}

/// The movie-ratings fixture: 5 users, 4 movies, 12 `rates` edges carrying
/// star ratings {5,3,1,5,4,5,2,4,5,1,1,2}.
#[test]
fn cascading_vertex_removal_cleans_up_every_incident_edge() -> Result<()> {
    let graph = open_graph()?;
    let users = graph.create_vertex_type(user_type())?;
    let movies = graph.create_vertex_type(movie_type())?;
    let rates = graph.create_edge_type(rates_type())?;

    let u: Vec<_> = [("Scrooge", 67), ("Donald", 77), ("Mickey", 80), ("Gus", 76), ("Pete", 83)]
        .iter()
        .map(|(name, age)| {
            graph.insert_vertex(
                VertexSpec::of_type("User")
                    .property("name", *name)
                    .property("age", *age),
            )
        })
        .collect::<Result<_>>()?;
    let m: Vec<_> = [
        ("DuckTales", 1987),
        ("The Wise Little Hen", 1934),
        ("Mickey's Christmas Carol", 1983),
        ("Darkwing Duck", 1991),
    ]
    .iter()
    .map(|(title, released)| {
        graph.insert_vertex(
            VertexSpec::of_type("Movie")
                .property("title", *title)
                .property("released", *released),
        )
    })
    .collect::<Result<_>>()?;
    assert_eq!(users.count()?, 5);
    assert_eq!(movies.count()?, 4);

    let ratings = [
        (0, 0, 5),
        (1, 0, 3),
        (1, 1, 1),
        (1, 3, 5),
        (2, 1, 4),
        (2, 2, 5),
        (2, 0, 2),
        (3, 0, 4),
        (3, 3, 5),
        (4, 0, 1),
        (4, 2, 1),
        (4, 3, 2),
    ];
    for (user, movie, score) in ratings {
        u[user].add_edge(&[&m[movie]], "rates", stars(score))?;
    }
    assert_eq!(rates.count()?, 12);

    // Darkwing Duck holds 3 incoming ratings; removing it must delete
    // exactly those edges and scrub the raters' outgoing maps
    assert_eq!(m[3].incoming_edges(None)?.len(), 3);
    let removed_uid = m[3].uid();
    m[3].clone().remove()?;
    assert_eq!(rates.count()?, 9);
    assert_eq!(movies.count()?, 3);
    let err = graph.get_vertex(removed_uid, "Movie").unwrap_err();
    assert!(matches!(err, GraphError::ElementNotFound { .. }));
    // Donald rated m1, m2 and the removed movie
    assert_eq!(u[1].outgoing_edges(None)?.len(), 2);

    // the average over DuckTales' five ratings still holds up
    let total: i64 = m[0]
        .incoming_edges(None)?
        .iter()
        .map(|e| e.get_property("stars").unwrap().unwrap().as_i64().unwrap())
        .sum();
    assert_eq!(total, 5 + 3 + 2 + 4 + 1);
    Ok(())
}

#[test]
fn properties_split_between_schema_fields_and_the_blob() -> Result<()> {
    let graph = open_graph()?;
    graph.create_vertex_type(movie_type())?;
    let movie = graph.insert_vertex(
        VertexSpec::of_type("Movie")
            .property("title", "DuckTales")
            .property("released", 1987),
    )?;

    // schema key: structured update, observable through search
    movie.set_property("released", 1990)?;
    let hits = graph.search_vertex("Movie", &[("released".to_string(), json!(1990))].into())?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].uid(), movie.uid());

    // non-schema key: lands in the blob and round-trips exactly,
    // compound values included
    let comment = json!({ "text": "an American animated series", "stars": [5, 4] });
    movie.set_property("comment", comment.clone())?;
    assert_eq!(movie.get_property("comment")?, Some(comment));
    assert_eq!(movie.get_property("missing")?, None);

    let keys = movie.property_keys()?;
    assert!(keys.contains("title"), "structured key listed");
    assert!(keys.contains("comment"), "unstructured key listed");
    assert!(!keys.contains("payload"), "blob carrier not exposed");

    // schema keys are type-checked in place
    let err = movie.set_property("released", "not a year").unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument { .. }));
    // reserved attributes stay under store control
    let err = movie.set_property("outgoing_edges", json!({})).unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument { .. }));
    Ok(())
}

#[test]
fn removed_types_can_be_recreated_with_a_new_schema() -> Result<()> {
    let graph = open_graph()?;
    let users = graph.create_vertex_type(user_type())?;
    graph.insert_vertex(VertexSpec::of_type("User").property("name", "Scrooge"))?;
    assert!(matches!(
        graph.create_vertex_type(user_type()).unwrap_err(),
        GraphError::DuplicateType { .. }
    ));

    users.remove()?;
    assert!(matches!(
        graph.get_vertex_type("User").unwrap_err(),
        GraphError::TypeNotFound { .. }
    ));
    assert!(matches!(
        graph
            .insert_vertex(VertexSpec::of_type("User").property("name", "Donald"))
            .unwrap_err(),
        GraphError::TypeNotFound { .. }
    ));

    // new schema takes effect: "level" is structured now, "name" is not
    graph.create_vertex_type(VertexTypeSpec::new("User").attr(AttrType::Int, "level"))?;
    let vertex = graph.insert_vertex(
        VertexSpec::of_type("User")
            .property("level", 3)
            .property("name", "Mickey"),
    )?;
    let err = vertex.set_property("level", "three").unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument { .. }));
    assert_eq!(vertex.get_property("name")?, Some(json!("Mickey")));
    Ok(())
}

#[test]
fn generic_vertices_live_in_the_fallback_partition() -> Result<()> {
    let graph = open_graph()?;
    let vertex = graph.insert_vertex(VertexSpec::generic().property("note", "untyped"))?;
    assert_eq!(vertex.type_name(), GENERIC_VERTEX);
    assert_eq!(vertex.get_property("note")?, Some(json!("untyped")));

    let fetched = graph.get_vertex(vertex.uid(), GENERIC_VERTEX)?;
    assert_eq!(fetched.uid(), vertex.uid());

    // generic vertices participate in edges like any other vertex
    graph.create_edge_type(EdgeTypeSpec::new("links"))?;
    let other = graph.insert_vertex(VertexSpec::generic())?;
    let edge = vertex.add_edge(&[&other], "links", AttrMap::new())?;
    assert_eq!(other.incoming_edges(None)?.len(), 1);
    vertex.remove_edge(&edge)?;
    assert!(other.incoming_edges(None)?.is_empty());
    Ok(())
}

#[test]
fn search_supports_structured_equality_only() -> Result<()> {
    let graph = open_graph()?;
    graph.create_vertex_type(user_type())?;
    for (name, age) in [("Scrooge", 67), ("Donald", 77), ("Pete", 77)] {
        graph.insert_vertex(
            VertexSpec::of_type("User")
                .property("name", name)
                .property("age", age),
        )?;
    }
    let hits = graph.search_vertex("User", &[("age".to_string(), json!(77))].into())?;
    assert_eq!(hits.len(), 2);

    let err = graph
        .search_vertex("User", &[("mood".to_string(), json!("grumpy"))].into())
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument { .. }));
    Ok(())
}

#[test]
fn edge_type_handles_expose_counts_and_source_search() -> Result<()> {
    let graph = open_graph()?;
    graph.create_vertex_type(user_type())?;
    graph.create_vertex_type(movie_type())?;
    let rates = graph.create_edge_type(rates_type())?;
    assert!(
        rates
            .definition()?
            .iter()
            .any(|(_, name)| name == "source_uid"),
        "reserved edge attributes are part of the definition"
    );

    let user = graph.insert_vertex(VertexSpec::of_type("User").property("name", "Pete"))?;
    let m1 = graph.insert_vertex(VertexSpec::of_type("Movie").property("title", "A"))?;
    let m2 = graph.insert_vertex(VertexSpec::of_type("Movie").property("title", "B"))?;
    user.add_edge(&[&m1], "rates", stars(1))?;
    user.add_edge(&[&m2], "rates", stars(2))?;

    assert_eq!(rates.count()?, 2);
    assert_eq!(rates.edges()?.len(), 2);
    assert_eq!(rates.edges_from(&user)?.len(), 2);
    Ok(())
}

#[test]
fn graph_opens_against_a_slowly_stabilizing_backend() -> Result<()> {
    let backend = Arc::new(MemoryBackend::with_options(MemoryOptions {
        settle_before_ready: true,
    }));
    let graph = Graph::open(backend, "default")?;
    graph.create_vertex_type(user_type())?;
    let vertex = graph.insert_vertex(VertexSpec::of_type("User").property("age", 1))?;
    assert_eq!(vertex.uid(), FIRST_UID);
    Ok(())
}
