use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::PassKind;

/// Language level a bundle may be asked to run on. Ordered oldest first; the
/// polyfill pass injects for every feature newer than the oldest declared
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetEnv {
    Es5,
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    EsLatest,
}

/// External collaborator mapping a bare package name (possibly with a
/// subpath, e.g. `polyfill/array-find`) to a filesystem path. Version
/// resolution happens outside the core.
pub trait PackageLookup: Debug + Send + Sync {
    fn lookup(&self, name: &str) -> Option<PathBuf>;
}

/// Default lookup: probe `<root>/node_modules/<name>`.
#[derive(Debug)]
pub struct NodeModulesLookup {
    root: PathBuf,
}

impl NodeModulesLookup {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl PackageLookup for NodeModulesLookup {
    fn lookup(&self, name: &str) -> Option<PathBuf> {
        let candidate = self.root.join("node_modules").join(name);
        let mut with_ext = candidate.as_os_str().to_os_string();
        with_ext.push(".js");
        if candidate.exists() || PathBuf::from(with_ext).exists() {
            Some(candidate)
        } else {
            None
        }
    }
}

/// Resolved configuration consumed by the core. CLI and config-file parsing
/// live outside and hand one of these in.
#[derive(Debug)]
pub struct BundleOptions {
    pub root: PathBuf,
    /// Entry specifier, resolved against `root`.
    pub entry: PathBuf,
    /// Probe suffixes in priority order, without the leading dot.
    pub extensions: Vec<String>,
    pub target_environments: Vec<TargetEnv>,
    pub passes: Vec<PassKind>,
    /// Directory receiving `bundle.js` and `manifest.json`.
    pub output_path: PathBuf,
    /// Bare-specifier collaborator; defaults to `NodeModulesLookup` over
    /// `root` when absent.
    pub package_lookup: Option<Arc<dyn PackageLookup>>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            entry: PathBuf::from("index.js"),
            extensions: vec![
                "tsx".to_string(),
                "ts".to_string(),
                "jsx".to_string(),
                "js".to_string(),
            ],
            target_environments: vec![TargetEnv::Es5],
            passes: vec![
                PassKind::StripExtensions,
                PassKind::Downgrade,
                PassKind::InjectPolyfills,
            ],
            output_path: PathBuf::from("dist"),
            package_lookup: None,
        }
    }
}
