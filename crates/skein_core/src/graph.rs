use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashSet;
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::transform::Pipeline;
use crate::{
    job::poisoned_transform, BuildError, BundleOptions, Dependency, Diagnostic, JobContext,
    ModuleById, ModuleId, ModuleJob, ModuleNode, Msg, Resolver,
};

/// What one incremental update did to the graph.
#[derive(Debug, Default)]
pub struct GraphDelta {
    /// Modules whose transform output was recomputed.
    pub changed: Vec<ModuleId>,
    /// Modules discovered through newly added imports.
    pub added: Vec<ModuleId>,
    /// Modules that became unreachable from the entry and were dropped.
    pub removed: Vec<ModuleId>,
    pub diagnostics: Vec<Diagnostic>,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// The module graph: every reachable module keyed by identity, plus the
/// deterministic execution order the emitter consumes.
#[derive(Debug)]
pub struct Graph {
    pub options: Arc<BundleOptions>,
    pub resolver: Arc<Resolver>,
    pub pipeline: Arc<Pipeline>,
    pub module_by_id: ModuleById,
    pub entry: Option<ModuleId>,
    /// Findings from the last build or update.
    pub diagnostics: Vec<Diagnostic>,
}

impl Graph {
    pub fn new(options: Arc<BundleOptions>) -> Self {
        let resolver = Arc::new(Resolver::new(&options));
        let pipeline = Arc::new(Pipeline::new(&options));
        Self {
            options,
            resolver,
            pipeline,
            module_by_id: Default::default(),
            entry: None,
            diagnostics: Default::default(),
        }
    }

    /// Full build: concurrent discovery from the entry, then the
    /// deterministic order pass. Resolution failures are fatal here; syntax
    /// failures degrade to diagnostics with a throwing module body.
    pub async fn build(&mut self) -> Result<(), BuildError> {
        self.diagnostics.clear();
        self.build_graph().await?;
        self.sort_modules();
        Ok(())
    }

    async fn build_graph(&mut self) -> Result<(), BuildError> {
        let active_task_count: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Msg>();
        let visited = Arc::new(DashSet::new());

        let mut resolved: HashMap<Option<ModuleId>, HashMap<String, ModuleId>> = HashMap::new();

        let job = ModuleJob::new(
            JobContext {
                active_task_count: active_task_count.clone(),
                visited,
            },
            Dependency {
                importer: None,
                specifier: self.options.entry.to_string_lossy().into_owned(),
            },
            tx.clone(),
            self.resolver.clone(),
            self.pipeline.clone(),
        );
        tokio::task::spawn(async move { job.run().await });

        while active_task_count.load(Ordering::SeqCst) != 0 {
            match rx.recv().await {
                Some(msg) => match msg {
                    Msg::TaskFinished(module) => {
                        active_task_count.fetch_sub(1, Ordering::SeqCst);
                        if let Some(message) = &module.broken {
                            self.diagnostics
                                .push(Diagnostic::error(Some(module.id.clone()), message.clone()));
                        }
                        self.module_by_id.insert(module.id.clone(), *module);
                    }
                    Msg::TaskCanceled => {
                        active_task_count.fetch_sub(1, Ordering::SeqCst);
                    }
                    Msg::DependencyReference(importer, specifier, id) => {
                        resolved.entry(importer).or_default().insert(specifier, id);
                    }
                    Msg::TaskErrorEncountered(err) => {
                        active_task_count.fetch_sub(1, Ordering::SeqCst);
                        return Err(err);
                    }
                },
                None => {
                    tracing::trace!("all senders dropped");
                }
            }
        }

        self.entry = resolved
            .remove(&None)
            .and_then(|ids| ids.into_values().next());
        for module in self.module_by_id.values_mut() {
            module.resolved_ids = resolved
                .remove(&Some(module.id.clone()))
                .unwrap_or_default();
        }
        tracing::debug!(modules = self.module_by_id.len(), "graph built");
        Ok(())
    }

    /// Post-order DFS over import edges. Dependencies receive lower
    /// `exec_order` than their dependents except across cycle back edges,
    /// and the order depends only on graph shape and import order within
    /// each module, never on discovery timing.
    fn sort_modules(&mut self) {
        let Some(entry) = self.entry.clone() else {
            return;
        };
        let mut stack = vec![entry];
        let mut visited: HashSet<ModuleId> = HashSet::new();
        let mut sorted: HashSet<ModuleId> = HashSet::new();
        let mut back_edges: HashSet<(ModuleId, ModuleId)> = HashSet::new();
        let mut next_exec_order = 0;
        while let Some(id) = stack.pop() {
            let Some(module) = self.module_by_id.get(&id) else {
                continue;
            };
            if !visited.contains(&id) {
                visited.insert(id.clone());
                stack.push(id.clone());
                for dep in module.depended_modules(&self.module_by_id).into_iter().rev() {
                    if !visited.contains(&dep.id) {
                        stack.push(dep.id.clone());
                    } else if !sorted.contains(&dep.id) {
                        // Grey dependency: `dep` is on the current DFS path.
                        back_edges.insert((id.clone(), dep.id.clone()));
                    }
                }
            } else if !sorted.contains(&id) {
                sorted.insert(id.clone());
                if let Some(module) = self.module_by_id.get_mut(&id) {
                    module.exec_order = next_exec_order;
                }
                next_exec_order += 1;
            }
        }
        for (from, to) in back_edges {
            tracing::warn!(%from, %to, "circular import");
            self.diagnostics.push(Diagnostic::warning(
                Some(from.clone()),
                format!("circular import: {from} -> {to}"),
            ));
        }
    }

    /// Incremental update for a set of touched files. Unchanged fingerprints
    /// reuse the cached transform; changed modules re-transform in parallel;
    /// import diffs grow and shrink the graph; the order pass reruns at the
    /// end. Failures degrade to diagnostics so the last good bundle keeps
    /// serving.
    pub fn update(&mut self, touched: &[ModuleId]) -> GraphDelta {
        let mut delta = GraphDelta::default();
        self.diagnostics.clear();

        let mut deleted: Vec<ModuleId> = Vec::new();
        let mut to_transform: Vec<(ModuleId, String, blake3::Hash)> = Vec::new();
        for id in touched {
            let Some(module) = self.module_by_id.get(id) else {
                continue;
            };
            let source = match std::fs::read_to_string(id.as_path()) {
                Ok(source) => source,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    deleted.push(id.clone());
                    continue;
                }
                Err(err) => {
                    delta
                        .diagnostics
                        .push(Diagnostic::error(Some(id.clone()), err.to_string()));
                    continue;
                }
            };
            let fingerprint = self.pipeline.fingerprint(&source);
            if fingerprint == module.fingerprint {
                tracing::trace!(%id, "fingerprint unchanged, transform skipped");
                continue;
            }
            to_transform.push((id.clone(), source, fingerprint));
        }

        let pipeline = self.pipeline.clone();
        let transformed: Vec<_> = to_transform
            .into_par_iter()
            .map(|(id, source, fingerprint)| {
                let result = pipeline.transform(&id, &source);
                (id, source, fingerprint, result)
            })
            .collect();

        for (id, source, fingerprint, result) in transformed {
            let Some(module) = self.module_by_id.get_mut(&id) else {
                continue;
            };
            module.source = source;
            module.fingerprint = fingerprint;
            match result {
                Ok(transform) => {
                    module.dependencies = transform.scan.dependencies.clone();
                    module.transform = transform;
                    module.transform_count += 1;
                    module.broken = None;
                    delta.changed.push(id);
                }
                // Keep the previous good output; the error becomes a
                // diagnostic and the old code keeps serving.
                Err(err @ BuildError::Syntax { .. }) => {
                    let message = err.to_string();
                    module.broken = Some(message.clone());
                    delta
                        .diagnostics
                        .push(Diagnostic::error(Some(id), message));
                }
                Err(err) => {
                    delta
                        .diagnostics
                        .push(Diagnostic::error(Some(id), err.to_string()));
                }
            }
        }

        for id in deleted {
            if Some(&id) == self.entry.as_ref() {
                delta
                    .diagnostics
                    .push(Diagnostic::error(Some(id), "entry module deleted"));
                continue;
            }
            self.module_by_id.remove(&id);
            for module in self.module_by_id.values_mut() {
                module.resolved_ids.retain(|_, resolved| resolved != &id);
            }
        }

        // Re-resolve edges of recomputed modules plus any specifier that has
        // never resolved, so creating a missing file repairs old imports.
        let mut pending: Vec<(ModuleId, String)> = Vec::new();
        for module in self.module_by_id.values() {
            let recomputed = delta.changed.contains(&module.id);
            for specifier in module.dependencies.iter() {
                if recomputed || !module.resolved_ids.contains_key(specifier) {
                    pending.push((module.id.clone(), specifier.clone()));
                }
            }
        }
        pending.sort();
        let mut discovery: Vec<ModuleId> = Vec::new();
        for (importer, specifier) in pending {
            match self.resolver.resolve(&specifier, Some(&importer)) {
                Ok(resolved) => {
                    if !self.module_by_id.contains_key(&resolved) {
                        discovery.push(resolved.clone());
                    }
                    if let Some(module) = self.module_by_id.get_mut(&importer) {
                        module.resolved_ids.insert(specifier, resolved);
                    }
                }
                Err(err) => {
                    if let Some(module) = self.module_by_id.get_mut(&importer) {
                        module.resolved_ids.remove(&specifier);
                    }
                    delta
                        .diagnostics
                        .push(Diagnostic::error(Some(importer), err.to_string()));
                }
            }
        }

        while let Some(id) = discovery.pop() {
            if self.module_by_id.contains_key(&id) {
                continue;
            }
            let Some(specifiers) = self.load_module(&id, &mut delta.diagnostics) else {
                continue;
            };
            for specifier in specifiers {
                match self.resolver.resolve(&specifier, Some(&id)) {
                    Ok(resolved) => {
                        if !self.module_by_id.contains_key(&resolved) {
                            discovery.push(resolved.clone());
                        }
                        if let Some(module) = self.module_by_id.get_mut(&id) {
                            module.resolved_ids.insert(specifier, resolved);
                        }
                    }
                    Err(err) => {
                        delta
                            .diagnostics
                            .push(Diagnostic::error(Some(id.clone()), err.to_string()));
                    }
                }
            }
            delta.added.push(id);
        }

        delta.removed = self.sweep_unreachable();
        self.sort_modules();
        delta.diagnostics.extend(self.diagnostics.iter().cloned());
        self.diagnostics = delta.diagnostics.clone();
        tracing::debug!(
            changed = delta.changed.len(),
            added = delta.added.len(),
            removed = delta.removed.len(),
            "graph updated"
        );
        delta
    }

    /// Synchronous single-module load used by incremental discovery. Yields
    /// the new module's dependency specifiers, or `None` when the file
    /// cannot be read (the failure is recorded as a diagnostic).
    fn load_module(
        &mut self,
        id: &ModuleId,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<linked_hash_set::LinkedHashSet<String>> {
        let source = match std::fs::read_to_string(id.as_path()) {
            Ok(source) => source,
            Err(err) => {
                diagnostics.push(Diagnostic::error(Some(id.clone()), err.to_string()));
                return None;
            }
        };
        let fingerprint = self.pipeline.fingerprint(&source);
        let (transform, broken) = match self.pipeline.transform(id, &source) {
            Ok(result) => (result, None),
            Err(err) => {
                let message = err.to_string();
                diagnostics.push(Diagnostic::error(Some(id.clone()), message.clone()));
                (poisoned_transform(&message), Some(message))
            }
        };
        let mut module = ModuleNode::new(id.clone(), source, transform, fingerprint);
        module.broken = broken;
        let specifiers = module.dependencies.clone();
        self.module_by_id.insert(id.clone(), module);
        Some(specifiers)
    }

    /// Drop every module no longer reachable from the entry.
    fn sweep_unreachable(&mut self) -> Vec<ModuleId> {
        let Some(entry) = self.entry.clone() else {
            return Vec::new();
        };
        let mut reachable: HashSet<ModuleId> = HashSet::new();
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            if let Some(module) = self.module_by_id.get(&id) {
                for dep in module.depended_modules(&self.module_by_id) {
                    if !reachable.contains(&dep.id) {
                        stack.push(dep.id.clone());
                    }
                }
            }
        }
        let mut removed: Vec<ModuleId> = self
            .module_by_id
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();
        removed.sort();
        for id in &removed {
            tracing::debug!(%id, "module unreachable, dropped");
            self.module_by_id.remove(id);
        }
        removed
    }

    /// Modules sorted by execution order; the emitter's iteration order.
    pub fn ordered_modules(&self) -> Vec<&ModuleNode> {
        let mut modules: Vec<&ModuleNode> = self.module_by_id.values().collect();
        modules.sort_by_key(|m| m.exec_order);
        modules
    }
}
