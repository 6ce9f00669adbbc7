use compgraph::ingestion::{read_csv_path, read_ndjson_path, write_ndjson};
use compgraph::processing::{Aggregate, mappers};
use compgraph::{Bindings, Graph, GraphError, GraphResult, Row, Value, row};

fn word_count() -> Graph {
    Graph::source("docs")
        .map(mappers::filter_punctuation("text"))
        .map(mappers::lowercase("text"))
        .flat_map(mappers::split("text"))
        .reduce(["text"], Aggregate::count("count"))
}

#[test]
fn ndjson_file_feeds_a_word_count() {
    let docs = read_ndjson_path("tests/fixtures/docs.ndjson").unwrap();
    let rows = word_count()
        .run(Bindings::new().bind_results("docs", docs))
        .unwrap()
        .collect_rows()
        .unwrap();

    let count_of = |word: &str| {
        rows.iter()
            .find(|r| r.get_str("text").unwrap() == word)
            .map(|r| r.get_i64("count").unwrap())
    };
    assert_eq!(count_of("quick"), Some(3));
    assert_eq!(count_of("the"), Some(2));
    assert_eq!(count_of("a"), Some(2));
    assert_eq!(count_of("lazy"), Some(1));
    assert_eq!(count_of("cat"), None);
    assert_eq!(rows.len(), 7);
}

#[test]
fn malformed_ndjson_line_fails_the_run() {
    let docs = read_ndjson_path("tests/fixtures/broken.ndjson").unwrap();
    let err = Graph::source("docs")
        .run(Bindings::new().bind_results("docs", docs))
        .unwrap()
        .collect_rows()
        .unwrap_err();
    assert!(matches!(err, GraphError::Json { line: 2, .. }));
}

#[test]
fn csv_file_rows_are_typed_and_filterable() {
    let people = read_csv_path("tests/fixtures/people.csv").unwrap();
    assert_eq!(people.headers(), ["id", "name", "score", "active"]);

    let graph = Graph::source("people")
        .filter(|row: &Row| -> GraphResult<bool> { Ok(row.get("active") == Some(&Value::Bool(true))) });
    let rows = graph
        .run(Bindings::new().bind_results("people", people))
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(
        rows,
        vec![row! { "id" => 1, "name" => "Ada", "score" => 98.5, "active" => true }]
    );

    let all: Vec<Row> = read_csv_path("tests/fixtures/people.csv")
        .unwrap()
        .collect::<GraphResult<_>>()
        .unwrap();
    assert_eq!(all[1].get("score"), Some(&Value::Null));
}

#[test]
fn run_output_can_be_written_as_ndjson() {
    let graph = Graph::source("a").sort(["n"]);
    let rows = vec![row! { "n" => 2, "w" => "b" }, row! { "n" => 1, "w" => "a" }];
    let out = graph.run(Bindings::new().bind("a", rows)).unwrap();

    let mut buf = Vec::new();
    let written = write_ndjson(&mut buf, out).unwrap();
    assert_eq!(written, 2);
    assert_eq!(
        String::from_utf8(buf).unwrap(),
        "{\"n\":1,\"w\":\"a\"}\n{\"n\":2,\"w\":\"b\"}\n"
    );
}
