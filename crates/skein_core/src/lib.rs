use std::fmt;
use std::path::Path;
use std::sync::Arc;

mod options;
pub use options::*;
mod error;
pub use error::*;
mod resolver;
pub use resolver::*;
mod transform;
pub use transform::*;
mod module;
pub use module::*;
mod job;
pub use job::*;
mod graph;
pub use graph::*;
mod chunk;
pub use chunk::*;
mod bundle;
pub use bundle::*;
mod watch;
pub use watch::*;
pub mod log;

pub type ModuleById = hashbrown::HashMap<ModuleId, ModuleNode>;

/// Canonical identity of one physical source file: the normalized absolute
/// path with an explicit extension. Every specifier alias of a file resolves
/// to the same `ModuleId`, so the graph never holds two nodes for one file.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    pub fn new(path: &Path) -> Self {
        Self(path.to_string_lossy().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&*self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}
