use std::path::{Path, PathBuf};

use skein::{skein, BundleOptions, ModuleId, Skein};

pub fn fixture_root(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn bundler_at(root: &Path) -> Skein {
    skein(BundleOptions {
        root: root.to_path_buf(),
        output_path: root.join("dist"),
        ..Default::default()
    })
}

/// Look a module up by path suffix; fixture layouts keep file names unique.
#[allow(dead_code)]
pub fn id_ending_with(bundler: &Skein, suffix: &str) -> ModuleId {
    bundler
        .graph()
        .module_by_id
        .keys()
        .find(|id| id.as_str().ends_with(suffix))
        .unwrap_or_else(|| panic!("no module ends with {suffix}"))
        .clone()
}
