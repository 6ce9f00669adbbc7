use compgraph::processing::Aggregate;
use compgraph::{Bindings, ExecutionEngine, ExecutionOptions, Graph, GraphError, JoinKind, Row, row};

fn bounded(limit: usize, dir: &std::path::Path) -> ExecutionEngine {
    ExecutionEngine::new(ExecutionOptions {
        max_buffered_rows: Some(limit),
        sort_chunk_rows: 1_000,
        spill_dir: Some(dir.to_path_buf()),
        ..ExecutionOptions::default()
    })
}

#[test]
fn large_stream_with_small_groups_stays_under_the_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let engine = bounded(8, dir.path());
    let graph = Graph::source("events").reduce(["user"], Aggregate::count("events"));

    let events = (0..10_000i64).map(|i| row! { "user" => (i * 7919) % 2_500, "seq" => i });
    let mut groups = 0;
    for row in engine.run(&graph, Bindings::new().bind("events", events)).unwrap() {
        assert_eq!(row.unwrap().get_i64("events").unwrap(), 4);
        groups += 1;
    }
    assert_eq!(groups, 2_500);

    let metrics = engine.metrics().snapshot();
    assert!(metrics.max_buffered_rows > 0);
    assert!(metrics.max_buffered_rows <= 8);
    assert_eq!(metrics.groups_reduced, 2_500);
    assert_eq!(metrics.spill_runs, 10);
}

#[test]
fn oversized_group_fails_with_memory_limit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = bounded(10, dir.path());
    let graph = Graph::source("events").reduce(["user"], Aggregate::count("events"));

    let events: Vec<Row> = (0..100).map(|i| row! { "user" => 1, "seq" => i }).collect();
    let err = engine
        .run(&graph, Bindings::new().bind("events", events))
        .unwrap()
        .collect_rows()
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::MemoryLimitExceeded { ref operator, limit: 10 } if operator == "reduce"
    ));
}

#[test]
fn join_with_small_key_groups_completes_under_the_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let engine = bounded(8, dir.path());
    let graph = Graph::source("users").join(JoinKind::Left, &Graph::source("orders"), ["user"]);

    let users = (0..1_000i64).map(|u| row! { "user" => u });
    let orders = (0..2_000i64).map(|i| row! { "user" => i % 1_000, "order" => i });
    let rows = engine
        .run(&graph, Bindings::new().bind("users", users).bind("orders", orders))
        .unwrap()
        .collect_rows()
        .unwrap();

    assert_eq!(rows.len(), 2_000);
    assert!(engine.metrics().snapshot().max_buffered_rows <= 8);
}

#[test]
fn oversized_join_group_fails_with_memory_limit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = bounded(10, dir.path());
    let graph = Graph::source("a").join(JoinKind::Inner, &Graph::source("b"), ["k"]);

    let a = vec![row! { "k" => 1 }];
    let b: Vec<Row> = (0..50).map(|i| row! { "k" => 1, "i" => i }).collect();
    let err = engine
        .run(&graph, Bindings::new().bind("a", a).bind("b", b))
        .unwrap()
        .collect_rows()
        .unwrap_err();
    assert!(matches!(err, GraphError::MemoryLimitExceeded { ref operator, .. } if operator == "join"));
}
