use std::path::{Path, PathBuf};
use std::sync::Arc;

use sugar_path::SugarPath;

use crate::{BuildError, BundleOptions, ModuleId, NodeModulesLookup, PackageLookup};

/// Maps an import specifier to the canonical [`ModuleId`] of the file it
/// names. Pure function of filesystem state; one existence probe per
/// candidate extension.
#[derive(Debug)]
pub struct Resolver {
    root: PathBuf,
    extensions: Vec<String>,
    package_lookup: Arc<dyn PackageLookup>,
}

impl Resolver {
    pub fn new(options: &BundleOptions) -> Self {
        let root = if options.root.is_absolute() {
            options.root.normalize()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&options.root))
                .unwrap_or_else(|_| options.root.clone())
                .normalize()
        };
        let package_lookup = options
            .package_lookup
            .clone()
            .unwrap_or_else(|| Arc::new(NodeModulesLookup::new(root.clone())));
        Self {
            root,
            extensions: options.extensions.clone(),
            package_lookup,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `specifier` as seen from `importer` (`None` means the entry,
    /// resolved against the root). Relative and absolute specifiers join
    /// against the importer's directory; bare names go through the package
    /// lookup collaborator, then both take the same extension probing.
    pub fn resolve(
        &self,
        specifier: &str,
        importer: Option<&ModuleId>,
    ) -> Result<ModuleId, BuildError> {
        let is_path = importer.is_none()
            || specifier.starts_with('.')
            || Path::new(specifier).is_absolute();

        let candidate = if is_path {
            let base = match importer {
                Some(from) => from
                    .as_path()
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone()),
                None => self.root.clone(),
            };
            if Path::new(specifier).is_absolute() {
                PathBuf::from(specifier).normalize()
            } else {
                base.join(specifier).normalize()
            }
        } else {
            match self.package_lookup.lookup(specifier) {
                Some(path) => path.normalize(),
                None => return Err(BuildError::resolution(specifier, importer)),
            }
        };

        let resolved = self
            .probe(&candidate)
            .ok_or_else(|| BuildError::resolution(specifier, importer))?;
        let id = ModuleId::new(&resolved.normalize());
        tracing::trace!(specifier, ?importer, %id, "resolved");
        Ok(id)
    }

    /// Probe a candidate path: exact file first, then each configured
    /// extension, then `index.<ext>` if the candidate is a directory.
    fn probe(&self, candidate: &Path) -> Option<PathBuf> {
        if candidate.is_file() {
            return Some(candidate.to_path_buf());
        }
        for ext in &self.extensions {
            let mut with_ext = candidate.as_os_str().to_os_string();
            with_ext.push(format!(".{ext}"));
            let path = PathBuf::from(with_ext);
            if path.is_file() {
                return Some(path);
            }
        }
        if candidate.is_dir() {
            for ext in &self.extensions {
                let path = candidate.join(format!("index.{ext}"));
                if path.is_file() {
                    return Some(path);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn options_for(root: &Path) -> BundleOptions {
        BundleOptions {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn aliases_of_one_file_share_an_identity() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/util.js"), "export var x = 1;").unwrap();
        fs::write(dir.path().join("src/index.js"), "").unwrap();

        let resolver = Resolver::new(&options_for(dir.path()));
        let from = resolver.resolve("src/index.js", None).unwrap();

        let a = resolver.resolve("./util", Some(&from)).unwrap();
        let b = resolver.resolve("./util.js", Some(&from)).unwrap();
        let c = resolver.resolve("../src/util.js", Some(&from)).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(a.as_str().ends_with("util.js"));
    }

    #[test]
    fn extension_probing_follows_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.ts"), "").unwrap();
        fs::write(dir.path().join("app.js"), "").unwrap();
        fs::write(dir.path().join("index.js"), "").unwrap();

        let resolver = Resolver::new(&options_for(dir.path()));
        let from = resolver.resolve("index.js", None).unwrap();
        let id = resolver.resolve("./app", Some(&from)).unwrap();
        assert!(id.as_str().ends_with("app.ts"), "got {id}");
    }

    #[test]
    fn directory_specifier_probes_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/index.jsx"), "").unwrap();
        fs::write(dir.path().join("index.js"), "").unwrap();

        let resolver = Resolver::new(&options_for(dir.path()));
        let from = resolver.resolve("index.js", None).unwrap();
        let id = resolver.resolve("./lib", Some(&from)).unwrap();
        assert!(id.as_str().ends_with("lib/index.jsx"), "got {id}");
    }

    #[test]
    fn bare_specifier_goes_through_package_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/polyfill")).unwrap();
        fs::write(dir.path().join("node_modules/polyfill/array-find.js"), "").unwrap();
        fs::write(dir.path().join("index.js"), "").unwrap();

        let resolver = Resolver::new(&options_for(dir.path()));
        let from = resolver.resolve("index.js", None).unwrap();
        let id = resolver.resolve("polyfill/array-find", Some(&from)).unwrap();
        assert!(id.as_str().ends_with("array-find.js"), "got {id}");
    }

    #[test]
    fn unresolvable_specifier_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.js"), "").unwrap();

        let resolver = Resolver::new(&options_for(dir.path()));
        let from = resolver.resolve("index.js", None).unwrap();
        let err = resolver.resolve("./missing", Some(&from)).unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));
    }
}
