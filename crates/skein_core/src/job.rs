use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashSet;
use tokio::sync::mpsc::UnboundedSender;

use crate::transform::{Pipeline, ScanResult, TransformResult};
use crate::{BuildError, ModuleId, ModuleNode, Resolver};

/// An edge to resolve: `importer` is `None` only for the entry.
#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub struct Dependency {
    pub importer: Option<ModuleId>,
    pub specifier: String,
}

/// Shared state between concurrent module jobs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub(crate) active_task_count: Arc<AtomicUsize>,
    pub(crate) visited: Arc<DashSet<ModuleId>>,
}

#[derive(Debug)]
pub enum Msg {
    /// `(importer, specifier, resolved)` for every edge, including edges to
    /// already-visited modules.
    DependencyReference(Option<ModuleId>, String, ModuleId),
    TaskFinished(Box<ModuleNode>),
    /// The module was already claimed by another job.
    TaskCanceled,
    TaskErrorEncountered(BuildError),
}

/// One unit of graph discovery: resolve a specifier, claim the module, load
/// and transform it, then fork a job per dependency. Ends by reporting to the
/// graph's message loop.
pub struct ModuleJob {
    context: JobContext,
    dependency: Dependency,
    tx: UnboundedSender<Msg>,
    resolver: Arc<Resolver>,
    pipeline: Arc<Pipeline>,
}

impl ModuleJob {
    pub fn new(
        context: JobContext,
        dependency: Dependency,
        tx: UnboundedSender<Msg>,
        resolver: Arc<Resolver>,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        context.active_task_count.fetch_add(1, Ordering::SeqCst);
        Self {
            context,
            dependency,
            tx,
            resolver,
            pipeline,
        }
    }

    pub async fn run(self) {
        match self.process().await {
            Ok(Some(module)) => self.send(Msg::TaskFinished(Box::new(module))),
            Ok(None) => self.send(Msg::TaskCanceled),
            Err(err) => self.send(Msg::TaskErrorEncountered(err)),
        }
    }

    fn send(&self, msg: Msg) {
        if let Err(err) = self.tx.send(msg) {
            tracing::trace!("receiver dropped: {err:?}");
        }
    }

    async fn process(&self) -> Result<Option<ModuleNode>, BuildError> {
        let id = self
            .resolver
            .resolve(&self.dependency.specifier, self.dependency.importer.as_ref())?;

        self.send(Msg::DependencyReference(
            self.dependency.importer.clone(),
            self.dependency.specifier.clone(),
            id.clone(),
        ));

        // First inserter claims the module; everyone else cancels.
        if !self.context.visited.insert(id.clone()) {
            return Ok(None);
        }

        let source = tokio::fs::read_to_string(id.as_path()).await?;
        let fingerprint = self.pipeline.fingerprint(&source);

        let (transform, broken) = match self.pipeline.transform(&id, &source) {
            Ok(result) => (result, None),
            // A module that fails to parse still enters the graph so the
            // bundle can surface the error where the module executes.
            Err(err @ BuildError::Syntax { .. }) => {
                let message = err.to_string();
                (poisoned_transform(&message), Some(message))
            }
            Err(err) => return Err(err),
        };

        for specifier in transform.scan.dependencies.iter() {
            self.fork(Dependency {
                importer: Some(id.clone()),
                specifier: specifier.clone(),
            });
        }

        let mut module = ModuleNode::new(id, source, transform, fingerprint);
        module.broken = broken;
        Ok(Some(module))
    }

    fn fork(&self, dependency: Dependency) {
        let job = ModuleJob::new(
            self.context.clone(),
            dependency,
            self.tx.clone(),
            self.resolver.clone(),
            self.pipeline.clone(),
        );
        tokio::task::spawn(async move {
            job.run().await;
        });
    }
}

/// Replacement body for a module whose source does not parse: throws the
/// original error when the module is first required.
pub fn poisoned_transform(message: &str) -> TransformResult {
    let escaped = serde_json::to_string(message).unwrap_or_else(|_| "\"syntax error\"".into());
    TransformResult {
        code: format!("throw new SyntaxError({escaped});"),
        scan: ScanResult::default(),
    }
}
