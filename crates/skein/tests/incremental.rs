mod common;

use std::fs;
use std::path::Path;

use common::{bundler_at, id_ending_with};
use skein::{enable_tracing_by_env, Severity, Skein};

fn write(root: &Path, rel: &str, content: &str) {
    fs::write(root.join(rel), content).unwrap();
}

/// index -> app -> util, built from a scratch directory the test can mutate.
fn project(root: &Path) -> Skein {
    enable_tracing_by_env();
    write(root, "index.js", "import { render } from \"./app\";\nrender();\n");
    write(
        root,
        "app.js",
        "import { greeting } from \"./util\";\nexport function render() {\n  console.log(greeting);\n}\n",
    );
    write(root, "util.js", "export var greeting = \"hello\";\n");
    let mut bundler = bundler_at(root);
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(bundler.build())
        .unwrap();
    bundler
}

fn transform_count(bundler: &Skein, suffix: &str) -> usize {
    let id = id_ending_with(bundler, suffix);
    bundler.graph().module_by_id[&id].transform_count
}

#[test]
fn identical_rewrite_reuses_every_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundler = project(dir.path());

    write(dir.path(), "util.js", "export var greeting = \"hello\";\n");
    let util = id_ending_with(&bundler, "util.js");
    let delta = bundler.graph_mut().update(&[util]);

    assert!(delta.is_empty());
    assert!(delta.diagnostics.is_empty());
    assert_eq!(transform_count(&bundler, "util.js"), 1);
}

#[test]
fn leaf_change_recomputes_only_the_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundler = project(dir.path());

    write(dir.path(), "util.js", "export var greeting = \"goodbye\";\n");
    let util = id_ending_with(&bundler, "util.js");
    let delta = bundler.graph_mut().update(&[util.clone()]);

    assert_eq!(delta.changed, vec![util]);
    assert!(delta.added.is_empty());
    assert!(delta.removed.is_empty());
    assert_eq!(transform_count(&bundler, "util.js"), 2);
    assert_eq!(transform_count(&bundler, "app.js"), 1);
    assert_eq!(transform_count(&bundler, "index.js"), 1);

    let output = bundler.render().unwrap();
    assert!(output.code.contains("goodbye"));
    assert!(!output.code.contains("\"hello\""));
}

#[test]
fn new_import_discovers_a_subgraph() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundler = project(dir.path());

    write(dir.path(), "extra.js", "export var extra = 1;\n");
    write(
        dir.path(),
        "app.js",
        "import { greeting } from \"./util\";\nimport { extra } from \"./extra\";\nexport function render() {\n  console.log(greeting, extra);\n}\n",
    );
    let app = id_ending_with(&bundler, "app.js");
    let delta = bundler.graph_mut().update(&[app.clone()]);

    assert_eq!(delta.changed, vec![app]);
    assert_eq!(delta.added.len(), 1);
    assert!(delta.added[0].as_str().ends_with("extra.js"));
    let output = bundler.render().unwrap();
    assert!(output.manifest.modules.iter().any(|m| m.id.ends_with("extra.js")));
}

#[test]
fn dropped_import_sweeps_unreachable_modules() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundler = project(dir.path());

    write(
        dir.path(),
        "app.js",
        "export function render() {\n  console.log(\"static\");\n}\n",
    );
    let app = id_ending_with(&bundler, "app.js");
    let delta = bundler.graph_mut().update(&[app]);

    assert_eq!(delta.removed.len(), 1);
    assert!(delta.removed[0].as_str().ends_with("util.js"));
    let output = bundler.render().unwrap();
    assert_eq!(output.manifest.modules.len(), 2);
}

#[test]
fn broken_edit_keeps_serving_the_last_good_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundler = project(dir.path());

    write(dir.path(), "util.js", "export var greeting = 'unterminated\n");
    let util = id_ending_with(&bundler, "util.js");
    let delta = bundler.graph_mut().update(&[util.clone()]);

    assert!(delta.changed.is_empty());
    assert!(delta
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error && d.message.contains("unterminated string")));
    let output = bundler.render().unwrap();
    assert!(output.code.contains("hello"), "last good output survives");

    write(dir.path(), "util.js", "export var greeting = \"fixed\";\n");
    let delta = bundler.graph_mut().update(&[util]);
    assert_eq!(delta.changed.len(), 1);
    assert!(bundler.render().unwrap().code.contains("fixed"));
}

#[test]
fn unresolvable_import_degrades_to_a_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundler = project(dir.path());

    write(
        dir.path(),
        "app.js",
        "import { gone } from \"./missing\";\nexport function render() {\n  console.log(gone);\n}\n",
    );
    let app = id_ending_with(&bundler, "app.js");
    let delta = bundler.graph_mut().update(&[app]);

    assert!(delta
        .diagnostics
        .iter()
        .any(|d| d.message.contains("cannot resolve")));
    let output = bundler.render().unwrap();
    assert!(output.code.contains("__skein_unresolved(\"./missing\")"));
}

#[test]
fn creating_a_missing_file_repairs_the_import() {
    let dir = tempfile::tempdir().unwrap();
    let mut bundler = project(dir.path());

    write(
        dir.path(),
        "app.js",
        "import { gone } from \"./missing\";\nexport function render() {\n  console.log(gone);\n}\n",
    );
    let app = id_ending_with(&bundler, "app.js");
    bundler.graph_mut().update(&[app.clone()]);

    write(dir.path(), "missing.js", "export var gone = true;\n");
    let delta = bundler.graph_mut().update(&[]);
    assert_eq!(delta.added.len(), 1);
    assert!(delta.added[0].as_str().ends_with("missing.js"));
    assert!(!bundler.render().unwrap().code.contains("__skein_unresolved"));
}

#[test]
fn rebuild_publishes_a_sequenced_event() {
    let dir = tempfile::tempdir().unwrap();
    let bundler = project(dir.path());
    let util = id_ending_with(&bundler, "util.js");

    let mut engine = bundler.into_watch();
    let events = engine.events();
    let rx = events.subscribe();

    write(dir.path(), "util.js", "export var greeting = \"changed\";\n");
    let event = engine.rebuild(&[util.clone()]).unwrap();
    assert_eq!(event.seq, 1);
    assert_eq!(event.changed, vec![util]);
    let code = event.output.as_ref().unwrap().code.clone();
    assert!(code.contains("changed"));
    assert_eq!(rx.try_recv().unwrap().seq, 1);

    // A no-op batch publishes nothing.
    assert!(engine.rebuild(&[]).is_none());
}
