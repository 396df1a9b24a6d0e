use hashbrown::HashSet;

use crate::transform::ExportStmt;
use crate::{BuildError, Graph, ModuleId, ModuleNode};

/// A renderable set of modules with one entry. The whole graph currently
/// lands in a single chunk.
#[derive(Debug)]
pub struct Chunk {
    pub id: String,
    pub(crate) module_ids: HashSet<ModuleId>,
    pub entry_module_id: ModuleId,
}

impl Chunk {
    pub fn new(id: String, entry_module_id: ModuleId) -> Self {
        Self {
            id,
            entry_module_id,
            module_ids: Default::default(),
        }
    }

    /// Chunk members sorted by execution order; this is the only iteration
    /// order rendering ever uses, so output bytes depend on the graph alone.
    pub fn ordered_modules<'a>(&self, graph: &'a Graph) -> Vec<&'a ModuleNode> {
        let mut ordered = self
            .module_ids
            .iter()
            .filter_map(|id| graph.module_by_id.get(id))
            .collect::<Vec<_>>();
        ordered.sort_by_key(|m| m.exec_order);
        ordered
    }

    /// Render the chunk: every module body wrapped as a registry entry, the
    /// runtime shim around them, and a final require of the entry.
    pub fn render(&self, graph: &Graph) -> Result<String, BuildError> {
        let mut seen: HashSet<&ModuleId> = HashSet::new();
        let mut registry = String::new();
        for module in self.ordered_modules(graph) {
            if !seen.insert(&module.id) {
                return Err(BuildError::Emission(format!(
                    "module {} rendered twice",
                    module.id
                )));
            }
            let key = json_string(module.id.as_str());
            let body = render_module(module);
            registry.push_str(&format!(
                "  {key}: function (__skein_require, module, exports) {{\n{body}\n  }},\n"
            ));
        }
        let entry = json_string(self.entry_module_id.as_str());
        Ok(format!(
            "(function () {{\n\
             \"use strict\";\n\
             var __skein_cache = {{}};\n\
             function __skein_unresolved(specifier) {{\n\
             \x20 throw new Error(\"Cannot find module '\" + specifier + \"'\");\n\
             }}\n\
             function __skein_copy_exports(source, target) {{\n\
             \x20 for (var key in source) {{\n\
             \x20   if (key !== \"default\" && !Object.prototype.hasOwnProperty.call(target, key)) {{\n\
             \x20     target[key] = source[key];\n\
             \x20   }}\n\
             \x20 }}\n\
             }}\n\
             function __skein_require(id) {{\n\
             \x20 var cached = __skein_cache[id];\n\
             \x20 if (cached) {{\n\
             \x20   return cached.exports;\n\
             \x20 }}\n\
             \x20 var module = {{ exports: {{}} }};\n\
             \x20 __skein_cache[id] = module;\n\
             \x20 __skein_modules[id](__skein_require, module, module.exports);\n\
             \x20 return module.exports;\n\
             }}\n\
             var __skein_modules = {{\n\
             {registry}\
             }};\n\
             __skein_require({entry});\n\
             }})();\n"
        ))
    }
}

fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\""))
}

/// Rewrite one module body into registry form: import statements become
/// `__skein_require` calls plus binding vars, export statements become
/// `exports` assignments. Everything between them is emitted byte for byte.
fn render_module(module: &ModuleNode) -> String {
    let source = &module.transform.code;
    let scan = &module.transform.scan;

    // (start, end, replacement) over the transformed source, in span order.
    let mut patches: Vec<(usize, usize, String)> = Vec::new();
    let mut trailer = String::new();

    for (i, import) in scan.imports.iter().enumerate() {
        let mut text = match module.resolved_ids.get(&import.specifier) {
            Some(resolved) => {
                format!(
                    "var __skein_import_{i} = __skein_require({});",
                    json_string(resolved.as_str())
                )
            }
            None => format!(
                "var __skein_import_{i} = __skein_unresolved({});",
                json_string(&import.specifier)
            ),
        };
        if let Some(name) = &import.default_binding {
            text.push_str(&format!(" var {name} = __skein_import_{i}[\"default\"];"));
        }
        if let Some(name) = &import.namespace_binding {
            text.push_str(&format!(" var {name} = __skein_import_{i};"));
        }
        for (imported, local) in &import.named {
            text.push_str(&format!(" var {local} = __skein_import_{i}.{imported};"));
        }
        patches.push((import.span.0, import.span.1, text));
    }

    for (i, re) in scan.re_exports.iter().enumerate() {
        let mut text = match module.resolved_ids.get(&re.specifier) {
            Some(resolved) => format!(
                "var __skein_reexport_{i} = __skein_require({});",
                json_string(resolved.as_str())
            ),
            None => format!(
                "var __skein_reexport_{i} = __skein_unresolved({});",
                json_string(&re.specifier)
            ),
        };
        if re.star {
            text.push_str(&format!(
                " __skein_copy_exports(__skein_reexport_{i}, exports);"
            ));
        }
        if let Some(ns) = &re.star_as {
            text.push_str(&format!(" exports.{ns} = __skein_reexport_{i};"));
        }
        for (original, exported) in &re.named {
            text.push_str(&format!(
                " exports.{exported} = __skein_reexport_{i}.{original};"
            ));
        }
        patches.push((re.span.0, re.span.1, text));
    }

    for export in &scan.exports {
        match export {
            ExportStmt::Default { kw_span } => {
                patches.push((kw_span.0, kw_span.1, "exports[\"default\"] =".to_string()));
            }
            ExportStmt::Decl { kw_span, names } => {
                patches.push((kw_span.0, kw_span.1, String::new()));
                for name in names {
                    trailer.push_str(&format!("exports.{name} = {name}; "));
                }
            }
            ExportStmt::List { span, names } => {
                patches.push((span.0, span.1, String::new()));
                for (local, exported) in names {
                    trailer.push_str(&format!("exports.{exported} = {local}; "));
                }
            }
        }
    }

    patches.sort_by_key(|(start, _, _)| *start);
    let mut out = String::with_capacity(source.len());
    let mut copied = 0usize;
    for (start, end, text) in patches {
        out.push_str(&source[copied..start]);
        out.push_str(&text);
        copied = end;
    }
    out.push_str(&source[copied..]);
    if !trailer.is_empty() {
        out.push('\n');
        out.push_str(trailer.trim_end());
    }
    out
}
