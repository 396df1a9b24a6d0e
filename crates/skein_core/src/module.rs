use hashbrown::HashMap;
use linked_hash_set::LinkedHashSet;

use crate::transform::TransformResult;
use crate::{ModuleById, ModuleId};

/// One discovered module: its source, its transform output and its place in
/// the graph. Stored in [`ModuleById`] keyed by identity.
#[derive(Debug)]
pub struct ModuleNode {
    pub id: ModuleId,
    /// Raw on-disk source the transform ran over.
    pub source: String,
    pub transform: TransformResult,
    /// Fingerprint of `source` plus the pipeline configuration; a matching
    /// fingerprint on rebuild skips the transform entirely.
    pub fingerprint: blake3::Hash,
    /// Execution order assigned by the deterministic post-build sort;
    /// dependencies come before dependents except across cycle back edges.
    pub exec_order: usize,
    /// Import specifiers in first-occurrence source order.
    pub dependencies: LinkedHashSet<String>,
    /// Specifier to resolved identity, for every specifier that resolved.
    pub resolved_ids: HashMap<String, ModuleId>,
    /// Times the transform has actually run for this module. Rebuilds that
    /// reuse the cache leave it untouched.
    pub transform_count: usize,
    /// Set when the last reload failed to parse; holds the message while the
    /// previous good transform stays in place.
    pub broken: Option<String>,
}

impl ModuleNode {
    pub fn new(
        id: ModuleId,
        source: String,
        transform: TransformResult,
        fingerprint: blake3::Hash,
    ) -> Self {
        let dependencies = transform.scan.dependencies.clone();
        Self {
            id,
            source,
            transform,
            fingerprint,
            exec_order: usize::MAX,
            dependencies,
            resolved_ids: HashMap::default(),
            transform_count: 1,
            broken: None,
        }
    }

    /// Resolved dependency identities in import order, skipping specifiers
    /// that never resolved.
    pub fn depended_modules<'a>(&self, module_by_id: &'a ModuleById) -> Vec<&'a ModuleNode> {
        self.dependencies
            .iter()
            .filter_map(|spec| self.resolved_ids.get(spec))
            .filter_map(|id| module_by_id.get(id))
            .collect()
    }
}
