use std::path::Path;
use std::process::Command;

use graphstore::Dataset;
use serde_json::{json, Value};
use tempfile::tempdir;

// Set in the child process spawned by `crash_during_bulk_insert_leaves_no_trace`.
const CRASH_DIR: &str = "GRAPHSTORE_CRASH_DIR";

fn statement(i: usize) -> Value {
    let uri = |iri: String| {
        json!({"uri?": true, "anonymous?": false, "resource?": true, "node?": false,
               "literal?": false, "to_s": iri})
    };
    json!({
        "subject": uri(format!("http://ex/s{i}")),
        "predicate": uri("http://ex/p".to_string()),
        "object": format!("value {i}"),
    })
}

fn crash_mid_insert(root: &Path) -> ! {
    let dataset = Dataset::open_dir(root).expect("open dataset in child");
    let batch = (0..10).map(|i| {
        if i == 3 {
            std::process::abort();
        }
        Ok(statement(i))
    });
    let _ = dataset.default_graph().insert_many(batch);
    unreachable!("the batch aborts the process");
}

#[test]
fn crash_during_bulk_insert_leaves_no_trace() {
    if let Ok(root) = std::env::var(CRASH_DIR) {
        crash_mid_insert(Path::new(&root));
    }

    let dir = tempdir().unwrap();
    {
        let dataset = Dataset::open_dir(dir.path()).expect("open dataset");
        dataset.default_graph().insert(&statement(100)).unwrap();
        dataset.close().unwrap();
    }

    let status = Command::new(std::env::current_exe().unwrap())
        .args([
            "crash_during_bulk_insert_leaves_no_trace",
            "--exact",
            "--test-threads=1",
        ])
        .env(CRASH_DIR, dir.path())
        .status()
        .expect("spawn child test");
    assert!(!status.success(), "child should have aborted");

    let reopened = Dataset::open_dir(dir.path()).expect("reopen after crash");
    assert_eq!(reopened.count().unwrap(), 1);
    assert!(reopened
        .default_graph()
        .contains(&statement(100))
        .unwrap());
}
