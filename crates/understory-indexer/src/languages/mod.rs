//! Language extractors for different programming languages

pub mod javascript;
pub mod python;

use std::collections::HashMap;

use understory_core::{Relationship, RelationshipKind};

use crate::extractor::{ExtractContext, ExtractionStats, LanguageExtractor};
use crate::resolver::Resolution;

/// Get the extractor for a language, if relationships can be extracted from it.
pub fn get_extractor(language: understory_core::Language) -> Option<Box<dyn LanguageExtractor>> {
    match language {
        understory_core::Language::Python => Some(Box::new(python::PythonExtractor)),
        understory_core::Language::JavaScript => Some(Box::new(javascript::JavaScriptExtractor)),
        understory_core::Language::Other => None,
    }
}

/// Local names bound by import statements, shared by the language extractors.
///
/// Later bindings overwrite earlier ones, so the last import of a name wins.
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    names: HashMap<String, Resolution>,
    /// Full dotted module paths bound without an alias (`import a.b.c`).
    modules: HashMap<String, Resolution>,
}

impl Bindings {
    pub fn bind(&mut self, local: &str, resolution: Resolution) {
        self.names.insert(local.to_string(), resolution);
    }

    pub fn bind_module(&mut self, dotted: &str, resolution: Resolution) {
        self.modules.insert(dotted.to_string(), resolution);
    }

    /// Resolution for a possibly dotted callee: the longest bound module
    /// prefix first, then the root name.
    pub fn lookup(&self, callee: &str) -> Option<&Resolution> {
        let mut prefix = callee;
        while let Some(idx) = prefix.rfind('.') {
            prefix = &prefix[..idx];
            if let Some(res) = self.modules.get(prefix) {
                return Some(res);
            }
        }
        let root = callee.split('.').next().unwrap_or(callee);
        self.names.get(root)
    }
}

/// Record one relationship and count how its target was resolved.
pub(crate) fn push(
    out: &mut Vec<Relationship>,
    stats: &mut ExtractionStats,
    ctx: &ExtractContext<'_>,
    resolution: &Resolution,
    symbol: &str,
    kind: RelationshipKind,
    line: u32,
) {
    match resolution {
        Resolution::File(_) => stats.resolved += 1,
        Resolution::Builtin(_) => stats.builtin += 1,
        Resolution::Unresolved(_) => stats.unresolved += 1,
    }
    out.push(Relationship::new(
        ctx.path,
        resolution.to_target(symbol),
        kind,
        line,
    ));
}

/// Resolve a call or base-class reference: names defined in the same file
/// shadow imports and produce nothing; otherwise the import binding, else an
/// unresolved symbol.
pub(crate) fn resolve_reference(
    bindings: &Bindings,
    local_defs: &std::collections::HashSet<String>,
    name: &str,
) -> Option<Resolution> {
    let root = name.split('.').next().unwrap_or(name);
    if local_defs.contains(root) {
        return None;
    }
    Some(
        bindings
            .lookup(name)
            .cloned()
            .unwrap_or_else(|| Resolution::Unresolved(name.to_string())),
    )
}
