mod common;

use common::{bundler_at, fixture_root, id_ending_with};
use skein::{enable_tracing_by_env, BundleOutput, Severity, Skein};

fn build(name: &str) -> (Skein, BundleOutput) {
    enable_tracing_by_env();
    let mut bundler = bundler_at(&fixture_root(name));
    let output = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(bundler.generate())
        .unwrap();
    (bundler, output)
}

#[test]
fn output_is_byte_identical_across_builds() {
    let (_, first) = build("basic");
    let (_, second) = build("basic");
    assert_eq!(first.code, second.code);
    let ids = |output: &BundleOutput| {
        output
            .manifest
            .modules
            .iter()
            .map(|m| m.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn dependencies_execute_before_dependents() {
    let (_, output) = build("basic");
    assert_eq!(output.manifest.modules.len(), 3);
    let order = |suffix: &str| {
        output
            .manifest
            .modules
            .iter()
            .find(|m| m.id.ends_with(suffix))
            .unwrap()
            .exec_order
    };
    assert!(order("util.js") < order("app.js"));
    assert!(order("app.js") < order("index.js"));
    assert!(output.manifest.entry.ends_with("index.js"));
}

#[test]
fn specifier_aliases_share_one_module() {
    let (_, output) = build("dedupe");
    assert_eq!(output.manifest.modules.len(), 3);
    let utils = output
        .manifest
        .modules
        .iter()
        .filter(|m| m.id.ends_with("util.js"))
        .count();
    assert_eq!(utils, 1);
    assert!(output
        .manifest
        .modules
        .iter()
        .any(|m| m.id.ends_with("lib/index.js")));
}

#[test]
fn import_cycle_bundles_each_module_once_with_a_warning() {
    let (bundler, output) = build("cycle");
    assert_eq!(output.manifest.modules.len(), 3);
    let a_key = format!(
        "{}: function",
        serde_json::to_string(id_ending_with(&bundler, "/a.js").as_str()).unwrap()
    );
    assert_eq!(output.code.matches(&a_key).count(), 1);
    let warnings: Vec<_> = bundler
        .graph()
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .collect();
    assert!(
        warnings.iter().any(|d| d.message.contains("circular import")),
        "{warnings:?}"
    );
}

#[test]
fn markup_lowering_pulls_in_the_runtime_module() {
    let (bundler, output) = build("jsx");
    id_ending_with(&bundler, "node_modules/jsx/runtime.js");
    assert!(output.code.contains("__jsx("));
    assert!(output.code.contains("\"app\""));
    assert!(!output.code.contains("<div"));
}

#[test]
fn polyfill_injection_adds_a_graph_edge() {
    let (bundler, output) = build("polyfill");
    let polyfill = id_ending_with(&bundler, "array-find.js");
    assert_eq!(output.manifest.modules.len(), 2);
    // The entry requires the polyfill before its own code runs.
    assert!(output
        .code
        .contains(&format!("__skein_require({})", serde_json::to_string(polyfill.as_str()).unwrap())));
}

#[test]
fn type_annotations_are_erased() {
    let (_, output) = build("typescript");
    assert!(output.code.contains("function add(a, b)"));
    assert!(!output.code.contains(": number"));
}

#[test]
fn syntax_error_degrades_to_a_throwing_module() {
    let (bundler, output) = build("broken");
    assert!(output.code.contains("SyntaxError"));
    let errors: Vec<_> = bundler
        .graph()
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("unterminated string"));
}

#[test]
fn write_emits_bundle_and_manifest() {
    enable_tracing_by_env();
    let dir = tempfile::tempdir().unwrap();
    for file in ["index.js", "app.js", "util.js"] {
        std::fs::copy(fixture_root("basic").join(file), dir.path().join(file)).unwrap();
    }
    let mut bundler = bundler_at(dir.path());
    let output = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(bundler.write())
        .unwrap();

    let written = std::fs::read_to_string(dir.path().join("dist/bundle.js")).unwrap();
    assert_eq!(written, output.code);
    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("dist/manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["modules"].as_array().unwrap().len(), 3);
}
