use std::sync::Arc;

use skein_core::Bundle;

pub use skein_core::{Graph, WatchEngine};
pub use skein_core::{
    BuildError, BundleOptions, BundleOutput, Diagnostic, EventStream, GraphDelta, Manifest,
    ModuleId, ModuleNode, NodeModulesLookup, PackageLookup, PassKind, RebuildEvent, Severity,
    TargetEnv,
};
pub use skein_core::log::enable_tracing_by_env;

pub struct Skein {
    graph: Graph,
    options: Arc<BundleOptions>,
}

pub fn skein(options: BundleOptions) -> Skein {
    let options = Arc::new(options);
    Skein {
        graph: Graph::new(options.clone()),
        options,
    }
}

impl Skein {
    pub async fn build(&mut self) -> anyhow::Result<()> {
        self.graph.build().await?;
        tracing::trace!("graph {:#?}", self.graph);
        Ok(())
    }

    pub async fn generate(&mut self) -> anyhow::Result<BundleOutput> {
        self.graph.build().await?;
        let output = Bundle::new(self.options.clone(), &self.graph).generate()?;
        Ok(output)
    }

    pub async fn write(&mut self) -> anyhow::Result<BundleOutput> {
        self.graph.build().await?;
        let output = Bundle::new(self.options.clone(), &self.graph).write()?;
        Ok(output)
    }

    /// Re-render the current graph without rebuilding it.
    pub fn render(&self) -> anyhow::Result<BundleOutput> {
        Ok(Bundle::new(self.options.clone(), &self.graph).generate()?)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Hand the built graph to the watch loop.
    pub fn into_watch(self) -> WatchEngine {
        WatchEngine::new(self.graph, self.options)
    }
}
