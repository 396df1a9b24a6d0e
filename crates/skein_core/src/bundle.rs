use std::sync::Arc;

use serde::Serialize;

use crate::{BuildError, BundleOptions, Chunk, Graph, ModuleId};

/// What the graph contributed to one emitted bundle, for tooling that wants
/// to inspect the output without parsing it.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub entry: String,
    pub modules: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub id: String,
    pub exec_order: usize,
}

/// A rendered bundle, ready to write or serve.
#[derive(Debug, Clone)]
pub struct BundleOutput {
    pub code: String,
    pub manifest: Manifest,
}

#[derive(Debug)]
pub struct Bundle<'a> {
    pub options: Arc<BundleOptions>,
    pub graph: &'a Graph,
}

impl<'a> Bundle<'a> {
    pub fn new(options: Arc<BundleOptions>, graph: &'a Graph) -> Self {
        Self { options, graph }
    }

    /// Render the graph into its single chunk plus manifest.
    pub fn generate(&self) -> Result<BundleOutput, BuildError> {
        let entry = self
            .graph
            .entry
            .clone()
            .ok_or_else(|| BuildError::Emission("no entry module in graph".to_string()))?;
        let chunk = self.generate_chunk(entry);
        let code = chunk.render(self.graph)?;
        let manifest = Manifest {
            entry: chunk.entry_module_id.to_string(),
            modules: chunk
                .ordered_modules(self.graph)
                .into_iter()
                .map(|module| ManifestEntry {
                    id: module.id.to_string(),
                    exec_order: module.exec_order,
                })
                .collect(),
        };
        Ok(BundleOutput { code, manifest })
    }

    /// Render and write `bundle.js` and `manifest.json` under the output
    /// path.
    pub fn write(&self) -> Result<BundleOutput, BuildError> {
        let output = self.generate()?;
        let dir = &self.options.output_path;
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join("bundle.js"), &output.code)?;
        let manifest = serde_json::to_string_pretty(&output.manifest)
            .map_err(|err| BuildError::Emission(err.to_string()))?;
        std::fs::write(dir.join("manifest.json"), manifest)?;
        tracing::info!(path = %dir.display(), modules = output.manifest.modules.len(), "bundle written");
        Ok(output)
    }

    fn generate_chunk(&self, entry: ModuleId) -> Chunk {
        let mut chunk = Chunk::new("main".to_string(), entry);
        for id in self.graph.module_by_id.keys() {
            chunk.module_ids.insert(id.clone());
        }
        chunk
    }
}
