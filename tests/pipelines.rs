//! End-to-end pipelines built only from the public API.

use compgraph::processing::{Aggregate, First, TermFrequency, TopN, mappers};
use compgraph::{Bindings, Graph, GraphResult, JoinKind, Row, row};

fn words(docs: &Graph) -> Graph {
    docs.map(mappers::filter_punctuation("text"))
        .map(mappers::lowercase("text"))
        .flat_map(mappers::split("text"))
}

/// For every word, the three documents where it has the highest tf-idf.
fn inverted_index() -> Graph {
    let docs = Graph::source("docs");
    let words = words(&docs);

    let doc_count = docs
        .fold(row! { "docs" => 0 }, |state: Row, _: &Row| -> GraphResult<Row> {
            let n = state.get_i64("docs")?;
            Ok(state.with("docs", n + 1))
        })
        .map(mappers::add_column("all", 1));

    let doc_freq = words
        .reduce(["text", "doc_id"], First)
        .reduce(["text"], Aggregate::count("df"))
        .map(mappers::add_column("all", 1));

    let idf = doc_freq
        .join(JoinKind::Inner, &doc_count, ["all"])
        .map(|row: Row| -> GraphResult<Row> {
            let idf = (row.get_f64("docs")? / row.get_f64("df")?).ln();
            Ok(row.with("idf", idf))
        })
        .map(mappers::project(["text", "idf"]));

    words
        .reduce(["doc_id"], TermFrequency::new("text"))
        .join(JoinKind::Inner, &idf, ["text"])
        .map(mappers::product(["tf", "idf"], "tf_idf"))
        .map(mappers::project(["text", "doc_id", "tf_idf"]))
        .reduce(["text"], TopN::new("tf_idf", 3))
}

fn corpus() -> Vec<Row> {
    vec![
        row! { "doc_id" => 1, "text" => "hello, world" },
        row! { "doc_id" => 2, "text" => "Hello there" },
        row! { "doc_id" => 3, "text" => "world world again" },
    ]
}

#[test]
fn inverted_index_ranks_documents_per_word() {
    let rows = inverted_index()
        .run(Bindings::new().bind("docs", corpus()))
        .unwrap()
        .collect_rows()
        .unwrap();

    let entries: Vec<(String, i64, f64)> = rows
        .iter()
        .map(|r| {
            (
                r.get_str("text").unwrap().to_string(),
                r.get_i64("doc_id").unwrap(),
                r.get_f64("tf_idf").unwrap(),
            )
        })
        .collect();

    let words: Vec<&str> = entries.iter().map(|(w, _, _)| w.as_str()).collect();
    assert_eq!(words, vec!["again", "hello", "hello", "there", "world", "world"]);

    let ln3 = 3f64.ln();
    let ln15 = 1.5f64.ln();
    let expected = [
        ("again", 3, ln3 / 3.0),
        ("hello", 1, ln15 / 2.0),
        ("hello", 2, ln15 / 2.0),
        ("there", 2, ln3 / 2.0),
        ("world", 3, ln15 * 2.0 / 3.0),
        ("world", 1, ln15 / 2.0),
    ];
    for ((word, doc, score), (w, d, s)) in entries.iter().zip(expected) {
        assert_eq!((word.as_str(), *doc), (w, d));
        assert!((score - s).abs() < 1e-12, "{word}/{doc}: {score} vs {s}");
    }
}

#[test]
fn top_words_by_count() {
    let docs = Graph::source("docs");
    let graph = words(&docs)
        .reduce(["text"], Aggregate::count("count"))
        .map(mappers::add_column("all", 1))
        .reduce(["all"], TopN::new("count", 1))
        .map(mappers::drop_column("all"));

    let rows = graph
        .run(Bindings::new().bind("docs", corpus()))
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows, vec![row! { "text" => "world", "count" => 3 }]);
}
