//! Python language extractor using tree-sitter

use std::collections::HashSet;

use tree_sitter::{Node, Tree};
use understory_core::{Bound, RelationshipKind};

use super::{Bindings, push, resolve_reference};
use crate::extractor::{
    ExtractContext, Extraction, ExtractionStats, LanguageExtractor, WalkGuard, line_of, walk,
};
use crate::parser_pool::FileType;

/// Longest dotted callee we try to resolve.
const MAX_DOTTED_SEGMENTS: usize = 32;

pub struct PythonExtractor;

/// What the tree walk records before any name is resolved.
#[derive(Debug)]
enum Fact {
    /// `import a.b` / `import a.b as x`
    Import {
        line: u32,
        module: String,
        alias: Option<String>,
    },
    /// `from m import n [as x]`, `from . import n`, `from m import *`
    FromImport {
        line: u32,
        level: usize,
        module: String,
        names: Vec<(String, Option<String>)>,
        wildcard: bool,
    },
    Call {
        line: u32,
        callee: String,
    },
    Bases {
        line: u32,
        bases: Vec<String>,
    },
}

impl LanguageExtractor for PythonExtractor {
    fn file_type(&self) -> FileType {
        FileType::Python
    }

    fn extract(
        &self,
        tree: &Tree,
        ctx: &ExtractContext<'_>,
        guard: &mut WalkGuard,
    ) -> Result<Extraction, Bound> {
        let mut facts = Vec::new();
        let mut local_defs = HashSet::new();

        walk(tree.root_node(), guard, |node| {
            collect(node, ctx, &mut facts, &mut local_defs);
        })?;

        let mut relationships = Vec::new();
        let mut stats = ExtractionStats::default();
        let mut bindings = Bindings::default();

        // Document order: a call sees only the imports above it.
        for fact in &facts {
            guard.check_deadline()?;
            match fact {
                Fact::Import {
                    line,
                    module,
                    alias,
                } => {
                    let res = ctx.resolver.resolve_python(ctx.path, 0, module);
                    push(&mut relationships, &mut stats, ctx, &res, module, RelationshipKind::Import, *line);
                    match alias {
                        Some(alias) => bindings.bind(alias, res),
                        None => {
                            let root = module.split('.').next().unwrap_or(module);
                            if root == module {
                                bindings.bind(root, res);
                            } else {
                                let root_res = ctx.resolver.resolve_python(ctx.path, 0, root);
                                bindings.bind(root, root_res);
                                bindings.bind_module(module, res);
                            }
                        }
                    }
                }
                Fact::FromImport {
                    line,
                    level,
                    module,
                    names,
                    wildcard,
                } => {
                    let symbol = format!("{}{}", ".".repeat(*level), module);
                    let module_res = ctx.resolver.resolve_python(ctx.path, *level, module);
                    let mut module_recorded = false;
                    if *wildcard || names.is_empty() {
                        push(&mut relationships, &mut stats, ctx, &module_res, &symbol, RelationshipKind::Import, *line);
                        module_recorded = true;
                    }

                    for (name, alias) in names {
                        let sub_dotted = if module.is_empty() {
                            name.clone()
                        } else {
                            format!("{module}.{name}")
                        };
                        let sub = ctx.resolver.resolve_python(ctx.path, *level, &sub_dotted);
                        let bound = if sub.is_file() {
                            let sub_symbol = format!("{}{}", ".".repeat(*level), sub_dotted);
                            push(&mut relationships, &mut stats, ctx, &sub, &sub_symbol, RelationshipKind::Import, *line);
                            sub
                        } else {
                            if !module_recorded {
                                push(&mut relationships, &mut stats, ctx, &module_res, &symbol, RelationshipKind::Import, *line);
                                module_recorded = true;
                            }
                            module_res.clone()
                        };
                        bindings.bind(alias.as_deref().unwrap_or(name), bound);
                    }
                }
                Fact::Call { line, callee } => {
                    match resolve_reference(&bindings, &local_defs, callee) {
                        Some(res) => push(&mut relationships, &mut stats, ctx, &res, callee, RelationshipKind::Call, *line),
                        None => stats.intra_file_calls += 1,
                    }
                }
                Fact::Bases { line, bases } => {
                    for base in bases {
                        if let Some(res) = resolve_reference(&bindings, &local_defs, base) {
                            push(&mut relationships, &mut stats, ctx, &res, base, RelationshipKind::Inheritance, *line);
                        }
                    }
                }
            }
        }

        Ok(Extraction {
            relationships,
            stats,
        })
    }
}

fn collect(node: Node<'_>, ctx: &ExtractContext<'_>, facts: &mut Vec<Fact>, local_defs: &mut HashSet<String>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let (module, alias) = imported_name(name, ctx);
                if !module.is_empty() {
                    facts.push(Fact::Import {
                        line: line_of(node),
                        module,
                        alias,
                    });
                }
            }
        }
        "import_from_statement" => {
            let Some(module_node) = node.child_by_field_name("module_name") else {
                return;
            };
            let (level, module) = match module_node.kind() {
                "relative_import" => relative_module(module_node, ctx),
                _ => (0, ctx.text(module_node).to_string()),
            };

            let mut cursor = node.walk();
            let names = node
                .children_by_field_name("name", &mut cursor)
                .map(|n| imported_name(n, ctx))
                .filter(|(name, _)| !name.is_empty())
                .collect();
            let mut cursor = node.walk();
            let wildcard = node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "wildcard_import");

            facts.push(Fact::FromImport {
                line: line_of(node),
                level,
                module,
                names,
                wildcard,
            });
        }
        "call" => {
            if let Some(callee) = node
                .child_by_field_name("function")
                .and_then(|f| dotted_text(f, ctx))
            {
                facts.push(Fact::Call {
                    line: line_of(node),
                    callee,
                });
            }
        }
        "class_definition" => {
            if let Some(name) = node.child_by_field_name("name").filter(|_| at_module_scope(node)) {
                local_defs.insert(ctx.text(name).to_string());
            }
            if let Some(superclasses) = node.child_by_field_name("superclasses") {
                let mut cursor = superclasses.walk();
                let bases: Vec<String> = superclasses
                    .named_children(&mut cursor)
                    .filter_map(|b| dotted_text(b, ctx))
                    .collect();
                if !bases.is_empty() {
                    facts.push(Fact::Bases {
                        line: line_of(node),
                        bases,
                    });
                }
            }
        }
        "function_definition" => {
            if let Some(name) = node.child_by_field_name("name").filter(|_| at_module_scope(node)) {
                local_defs.insert(ctx.text(name).to_string());
            }
        }
        _ => {}
    }
}

/// True unless the definition sits inside a class or function body.
fn at_module_scope(node: Node<'_>) -> bool {
    let mut parent = node.parent();
    while let Some(p) = parent {
        if matches!(p.kind(), "class_definition" | "function_definition") {
            return false;
        }
        parent = p.parent();
    }
    true
}

/// `(module, alias)` from a `dotted_name` or `aliased_import` node.
fn imported_name(node: Node<'_>, ctx: &ExtractContext<'_>) -> (String, Option<String>) {
    if node.kind() == "aliased_import" {
        let name = node
            .child_by_field_name("name")
            .map(|n| ctx.text(n).to_string())
            .unwrap_or_default();
        let alias = node
            .child_by_field_name("alias")
            .map(|a| ctx.text(a).to_string());
        (name, alias)
    } else {
        (ctx.text(node).to_string(), None)
    }
}

/// Leading-dot count and the dotted remainder of a relative import.
fn relative_module(node: Node<'_>, ctx: &ExtractContext<'_>) -> (usize, String) {
    let mut level = 0;
    let mut module = String::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_prefix" => level = ctx.text(child).matches('.').count(),
            "dotted_name" => module = ctx.text(child).to_string(),
            _ => {}
        }
    }
    (level, module)
}

/// `a.b.c` for identifier/attribute chains; `None` for anything else
/// (subscripts, call results, literals).
fn dotted_text(node: Node<'_>, ctx: &ExtractContext<'_>) -> Option<String> {
    let mut segments = Vec::new();
    let mut current = node;
    loop {
        if segments.len() >= MAX_DOTTED_SEGMENTS {
            return None;
        }
        match current.kind() {
            "identifier" => {
                segments.push(ctx.text(current));
                break;
            }
            "attribute" => {
                segments.push(ctx.text(current.child_by_field_name("attribute")?));
                current = current.child_by_field_name("object")?;
            }
            _ => return None,
        }
    }
    segments.reverse();
    Some(segments.join("."))
}
