pub mod downgrade;
pub mod lexer;
pub mod polyfill;
pub mod scan;
pub mod strip;

pub use scan::{ExportStmt, ImportStmt, ReExportStmt, ScanResult};

use crate::{BuildError, BundleOptions, ModuleId, TargetEnv};

/// The transform passes, in the fixed order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    /// Lower markup and erase type annotations.
    StripExtensions,
    /// Rewrite newer syntax for the oldest target environment.
    Downgrade,
    /// Prepend side-effect imports for missing runtime features.
    InjectPolyfills,
}

/// Output of running the pipeline over one module's source.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub code: String,
    pub scan: ScanResult,
}

/// Per-module transform pipeline. Shared across build tasks; all state is
/// configuration, so one instance serves concurrent transforms.
#[derive(Debug)]
pub struct Pipeline {
    passes: Vec<PassKind>,
    targets: Vec<TargetEnv>,
}

impl Pipeline {
    pub fn new(options: &BundleOptions) -> Self {
        let mut passes = options.passes.clone();
        passes.sort();
        passes.dedup();
        Self {
            passes,
            targets: options.target_environments.clone(),
        }
    }

    /// Run every configured pass in order, then scan the result for its
    /// import/export surface. Passes may introduce imports (the polyfill
    /// pass does), so scanning always happens last.
    pub fn transform(&self, id: &ModuleId, source: &str) -> Result<TransformResult, BuildError> {
        let file = id.as_str();
        let mut code = source.to_string();
        for pass in &self.passes {
            code = match pass {
                PassKind::StripExtensions => strip::run(&code, file)?,
                PassKind::Downgrade => downgrade::run(&code, file)?,
                PassKind::InjectPolyfills => polyfill::run(&code, file, &self.targets)?,
            };
        }
        let scan = scan::scan(&code, file)?;
        tracing::trace!(%id, deps = scan.dependencies.len(), "transformed");
        Ok(TransformResult { code, scan })
    }

    /// Content fingerprint covering the source and everything that affects
    /// its transform output. Equal fingerprints mean the cached result is
    /// still valid.
    pub fn fingerprint(&self, source: &str) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source.as_bytes());
        hasher.update(format!("{:?}{:?}", self.passes, self.targets).as_bytes());
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(&BundleOptions::default())
    }

    fn id() -> ModuleId {
        ModuleId::from("/src/app.tsx")
    }

    #[test]
    fn full_pipeline_strips_downgrades_and_polyfills() {
        let out = pipeline()
            .transform(
                &id(),
                "const pick = (items: number[]) => items.find(x => x > 0);",
            )
            .unwrap();
        assert!(out.code.contains("var pick = function (items)"));
        assert!(out.code.contains("import \"polyfill/array-find\";"));
        assert!(out.scan.dependencies.contains("polyfill/array-find"));
    }

    #[test]
    fn pass_introduced_imports_are_scanned() {
        let out = pipeline()
            .transform(&id(), "export const App = () => <div a={1} />;")
            .unwrap();
        assert!(out.scan.dependencies.contains("jsx/runtime"));
        assert_eq!(out.scan.export_names(), vec!["App"]);
    }

    #[test]
    fn fingerprint_tracks_source_and_configuration() {
        let a = pipeline().fingerprint("var x = 1;");
        assert_eq!(a, pipeline().fingerprint("var x = 1;"));
        assert_ne!(a, pipeline().fingerprint("var x = 2;"));

        let narrowed = Pipeline::new(&BundleOptions {
            passes: vec![PassKind::Downgrade],
            ..Default::default()
        });
        assert_ne!(a, narrowed.fingerprint("var x = 1;"));
    }

    #[test]
    fn syntax_error_carries_module_location() {
        let err = pipeline()
            .transform(&id(), "var s = 'unterminated")
            .unwrap_err();
        assert!(err.to_string().contains("/src/app.tsx"));
    }
}
