use std::fs;
use std::path::Path;

use graphstore::config::Config;
use graphstore::convert::{quad_to_host, triple_to_host};
use graphstore::model::{NamedNode, Quad, TriplePattern};
use graphstore::options::{Backend, UnionWithDefault};
use graphstore::transaction::{in_transaction, Transactional, TxMode};
use graphstore::{Dataset, DatasetError, QueryOutcome};
use serde_json::{json, Value};
use tempfile::tempdir;

fn uri(iri: &str) -> Value {
    json!({"uri?": true, "anonymous?": false, "resource?": true, "node?": false,
           "literal?": false, "to_s": iri})
}

fn statement(s: &str, p: &str, o: Value) -> Value {
    json!({"subject": uri(s), "predicate": uri(p), "object": o})
}

fn with_graph(mut statement: Value, graph: Option<&str>) -> Value {
    statement["graph_name"] = graph.map(uri).unwrap_or(Value::Null);
    statement
}

fn open_at(root: &Path) -> Dataset {
    let config = Config::builder()
        .root(root)
        .build()
        .expect("build config");
    Dataset::open(config).expect("open dataset")
}

fn both_backends(root: &Path) -> Vec<Dataset> {
    vec![
        open_at(root),
        Dataset::in_memory().expect("in-memory dataset"),
    ]
}

#[test]
fn insert_count_delete_scenario() {
    let dir = tempdir().unwrap();
    for dataset in both_backends(dir.path()) {
        let graph = dataset.default_graph();
        let s1 = statement("http://ex/s1", "http://ex/p", json!("a"));
        let s2 = statement("http://ex/s2", "http://ex/p", json!("b"));

        assert!(graph.insert(&s1).unwrap());
        assert!(graph.insert(&s2).unwrap());
        assert!(!graph.insert(&s1).unwrap(), "duplicate insert reports false");
        assert_eq!(graph.count().unwrap(), 2);

        let pattern = json!({"subject": uri("http://ex/s1"), "predicate": Value::Null,
                             "object": Value::Null});
        graph.delete(&pattern).unwrap();
        assert_eq!(graph.count().unwrap(), 1);
        assert!(graph.contains(&s2).unwrap());
        assert!(!graph.contains(&s1).unwrap());
    }
}

#[test]
fn pattern_lookup_round_trips_inserted_statement() {
    let dir = tempdir().unwrap();
    let dataset = open_at(dir.path());
    let g = NamedNode::new("http://ex/g").unwrap();
    dataset
        .insert_graph(Some(&g), Vec::<anyhow::Result<Value>>::new())
        .unwrap();
    let graph = dataset.graph(&g).unwrap();

    let lit = json!({"resource?": false, "node?": false, "literal?": true,
                     "value": "42", "datatype": uri("http://www.w3.org/2001/XMLSchema#integer")});
    let st = statement("http://ex/s", "http://ex/p", lit);
    graph.insert(&st).unwrap();

    let found: Vec<Value> = graph
        .find(&st)
        .unwrap()
        .map(|t| triple_to_host(&t.unwrap()))
        .collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["object"]["value"], json!("42"));
    assert_eq!(
        found[0]["object"]["datatype"]["to_s"],
        json!("http://www.w3.org/2001/XMLSchema#integer")
    );
}

#[test]
fn subject_only_lookup_finds_statement() {
    let dir = tempdir().unwrap();
    for dataset in both_backends(dir.path()) {
        let graph = dataset.default_graph();
        let st = statement("http://ex/s", "http://ex/p", json!("v"));
        graph.insert(&st).unwrap();
        graph
            .insert(&statement("http://ex/other", "http://ex/p", json!("w")))
            .unwrap();

        let by_subject = json!({"subject": uri("http://ex/s"), "predicate": Value::Null,
                                "object": Value::Null});
        let found: Vec<Value> = graph
            .find(&by_subject)
            .unwrap()
            .map(|t| triple_to_host(&t.unwrap()))
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["subject"]["to_s"], json!("http://ex/s"));
        assert_eq!(found[0]["predicate"]["to_s"], json!("http://ex/p"));
        assert!(graph.contains(&found[0]).unwrap());
    }
}

#[test]
fn panicking_write_is_rolled_back() {
    let dir = tempdir().unwrap();
    let dataset = open_at(dir.path());
    let graph = dataset.default_graph();
    graph
        .insert(&statement("http://ex/keep", "http://ex/p", json!("v")))
        .unwrap();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        in_transaction(dataset.store(), TxMode::Write, || -> anyhow::Result<()> {
            graph.insert(&statement("http://ex/lost", "http://ex/p", json!("v")))?;
            panic!("body failed after writing");
        })
    }));
    assert!(outcome.is_err());
    assert!(!dataset.store().is_in_transaction());
    assert_eq!(graph.count().unwrap(), 1);
    assert!(!graph
        .contains(&statement("http://ex/lost", "http://ex/p", json!("v")))
        .unwrap());

    assert!(graph
        .insert(&statement("http://ex/after", "http://ex/p", json!("v")))
        .unwrap());
    assert_eq!(graph.count().unwrap(), 2);
}

#[test]
fn graph_lifecycle_errors() {
    let dir = tempdir().unwrap();
    for dataset in both_backends(dir.path()) {
        let g = NamedNode::new("http://ex/lifecycle").unwrap();
        let data = || vec![Ok(statement("http://ex/s", "http://ex/p", json!("v")))];
        dataset.insert_graph(Some(&g), data()).unwrap();

        let err = dataset.insert_graph(Some(&g), data()).unwrap_err();
        assert!(err.to_string().contains("http://ex/lifecycle"));
        assert!(matches!(
            DatasetError::from_anyhow(&err),
            Some(DatasetError::GraphAlreadyExists(_))
        ));
        // nothing was added by the failed call
        assert_eq!(dataset.graph(&g).unwrap().count().unwrap(), 1);

        let replacement = vec![
            Ok(statement("http://ex/s", "http://ex/p", json!("x"))),
            Ok(statement("http://ex/s", "http://ex/p", json!("y"))),
        ];
        dataset.replace_graph(Some(&g), replacement).unwrap();
        assert_eq!(dataset.graph(&g).unwrap().count().unwrap(), 2);

        dataset.delete_graph(Some(&g)).unwrap();
        assert!(!dataset.has_graph(Some(&g)).unwrap());
        let err = dataset.delete_graph(Some(&g)).unwrap_err();
        assert!(matches!(
            DatasetError::from_anyhow(&err),
            Some(DatasetError::GraphNotFound(name)) if name == "http://ex/lifecycle"
        ));
    }
}

#[test]
fn deleting_default_graph_clears_it() {
    let dataset = Dataset::in_memory().unwrap();
    let graph = dataset.default_graph();
    graph
        .insert(&statement("http://ex/s", "http://ex/p", json!("v")))
        .unwrap();
    dataset.delete_graph(None).unwrap();
    assert!(graph.is_empty().unwrap());
    assert!(dataset.has_graph(None).unwrap());
}

#[test]
fn union_view_scopes_reads_only() {
    let dir = tempdir().unwrap();
    let dataset = open_at(dir.path());
    let g = NamedNode::new("http://ex/g").unwrap();
    dataset
        .insert(&with_graph(
            statement("http://ex/s", "http://ex/p", json!("in default")),
            None,
        ))
        .unwrap();
    dataset
        .insert_graph(
            Some(&g),
            vec![Ok(statement("http://ex/s", "http://ex/p", json!("in named")))],
        )
        .unwrap();

    let union = dataset
        .resolve_graph(Some(&g), UnionWithDefault::Enabled)
        .unwrap();
    assert_eq!(union.count().unwrap(), 2);
    assert!(union
        .contains(&statement("http://ex/s", "http://ex/p", json!("in default")))
        .unwrap());

    let plain = dataset
        .resolve_graph(Some(&g), UnionWithDefault::Disabled)
        .unwrap();
    assert_eq!(plain.count().unwrap(), 1);
    assert!(!plain
        .contains(&statement("http://ex/s", "http://ex/p", json!("in default")))
        .unwrap());
}

#[test]
fn failed_bulk_insert_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let dataset = open_at(dir.path());
    let graph = dataset.default_graph();
    graph
        .insert(&statement("http://ex/keep", "http://ex/p", json!("v")))
        .unwrap();

    let batch = vec![
        Ok(statement("http://ex/a", "http://ex/p", json!("1"))),
        Ok(statement("http://ex/b", "http://ex/p", json!("2"))),
        Err(anyhow::anyhow!("enumerator raised")),
        Ok(statement("http://ex/c", "http://ex/p", json!("3"))),
    ];
    let err = graph.insert_many(batch).unwrap_err();
    assert_eq!(err.to_string(), "enumerator raised");
    assert_eq!(graph.count().unwrap(), 1);

    let dupes: Vec<anyhow::Result<Value>> = (0..3)
        .map(|_| Ok(statement("http://ex/a", "http://ex/p", json!("1"))))
        .collect();
    assert_eq!(graph.insert_many(dupes).unwrap(), 1);
    assert_eq!(graph.count().unwrap(), 2);
}

#[test]
fn data_survives_reopen() {
    let dir = tempdir().unwrap();
    let g = NamedNode::new("http://ex/persisted").unwrap();
    {
        let dataset = open_at(dir.path());
        assert!(dataset.is_durable());
        dataset
            .insert_graph(
                Some(&g),
                vec![Ok(statement("http://ex/s", "http://ex/p", json!("v")))],
            )
            .unwrap();
        dataset.close().unwrap();
    }
    let reopened = Dataset::open_dir(dir.path()).expect("reopen");
    assert_eq!(reopened.config().backend, Backend::Persistent);
    assert_eq!(reopened.graph_names().unwrap(), vec![g.clone()]);
    assert_eq!(reopened.graph(&g).unwrap().count().unwrap(), 1);
}

#[test]
fn second_writer_is_locked_out() {
    let dir = tempdir().unwrap();
    let first = open_at(dir.path());
    let config = Config::builder().root(dir.path()).build().unwrap();
    let err = Dataset::open(config).unwrap_err();
    assert!(format!("{err}").contains("exclusive lock"));
    drop(first);
    Dataset::open_dir(dir.path()).expect("lock released on drop");
}

#[test]
fn files_load_by_extension() {
    let dir = tempdir().unwrap();
    let nq = dir.path().join("data.nq");
    fs::write(
        &nq,
        "<http://ex/s> <http://ex/p> \"d\" .\n\
         <http://ex/s> <http://ex/p> \"n\" <http://ex/g> .\n",
    )
    .unwrap();
    let ttl = dir.path().join("data.ttl");
    fs::write(
        &ttl,
        "@prefix ex: <http://ex/> .\nex:s ex:p \"t1\", \"t2\" .\n",
    )
    .unwrap();

    let dataset = Dataset::in_memory().unwrap();
    assert_eq!(dataset.insert_file(&nq).unwrap(), 2);
    assert!(dataset
        .has_graph(Some(&NamedNode::new("http://ex/g").unwrap()))
        .unwrap());

    let g = NamedNode::new("http://ex/g").unwrap();
    let graph = dataset.graph(&g).unwrap();
    assert_eq!(graph.insert_file(&ttl).unwrap(), 2);
    assert_eq!(graph.count().unwrap(), 3);

    let err = dataset.insert_file(&dir.path().join("missing.nq")).unwrap_err();
    assert!(err.to_string().contains("missing.nq"));
}

#[test]
fn reader_ingestion_defaults() {
    let dataset = Dataset::in_memory().unwrap();
    let nquads = "<http://ex/s> <http://ex/p> \"q\" <http://ex/g> .\n";
    dataset.insert_reader(nquads.as_bytes(), None).unwrap();
    let ntriples = "<http://ex/s> <http://ex/p> \"t\" .\n";
    dataset
        .default_graph()
        .insert_reader(ntriples.as_bytes(), None)
        .unwrap();
    assert_eq!(dataset.count().unwrap(), 2);
    assert_eq!(dataset.default_graph().count().unwrap(), 1);
}

#[test]
fn sparql_over_inserted_data() {
    let dir = tempdir().unwrap();
    for dataset in both_backends(dir.path()) {
        let graph = dataset.default_graph();
        graph
            .insert(&statement("http://ex/s", "http://ex/p", json!("a")))
            .unwrap();
        graph
            .insert(&statement("http://ex/s", "http://ex/q", json!("b")))
            .unwrap();

        assert_eq!(
            dataset.query("ASK { <http://ex/s> <http://ex/p> \"a\" }", &[]).unwrap(),
            QueryOutcome::Boolean(true)
        );
        match dataset.query("SELECT ?p WHERE { ?s ?p ?o }", &[]).unwrap() {
            QueryOutcome::Solutions(rows) => assert_eq!(rows.len(), 2),
            other => panic!("expected solutions, got {other:?}"),
        }
        match dataset
            .query("CONSTRUCT { ?o ?p ?s } WHERE { ?s ?p ?o . FILTER(isIRI(?o)) }", &[])
            .unwrap()
        {
            QueryOutcome::Graph(triples) => assert!(triples.is_empty()),
            other => panic!("expected graph, got {other:?}"),
        }
    }
}

#[test]
fn exported_quads_reimport_identically() {
    let dataset = Dataset::in_memory().unwrap();
    let st = with_graph(
        statement(
            "http://ex/s",
            "http://ex/p",
            json!({"resource?": false, "node?": false, "literal?": true,
                   "value": "bonjour", "language": "fr"}),
        ),
        Some("http://ex/g"),
    );
    dataset.insert(&st).unwrap();
    let quads: Vec<Quad> = dataset.quads().unwrap().map(|q| q.unwrap()).collect();
    assert_eq!(quads.len(), 1);
    let exported = quad_to_host(&quads[0]);
    assert!(dataset.contains(&exported).unwrap());
    assert!(!dataset.insert(&exported).unwrap());

    let any = dataset
        .find_pattern(&graphstore::model::QuadPattern::all_graphs(TriplePattern::any()))
        .unwrap()
        .count();
    assert_eq!(any, 1);
}
