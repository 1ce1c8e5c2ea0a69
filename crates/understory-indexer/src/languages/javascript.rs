//! JavaScript language extractor using tree-sitter

use std::collections::HashSet;

use tree_sitter::{Node, Tree};
use understory_core::{Bound, RelationshipKind};

use super::{Bindings, push, resolve_reference};
use crate::extractor::{
    ExtractContext, Extraction, ExtractionStats, LanguageExtractor, WalkGuard, line_of, walk,
};
use crate::parser_pool::FileType;

const MAX_DOTTED_SEGMENTS: usize = 32;

pub struct JavaScriptExtractor;

#[derive(Debug)]
enum Fact {
    /// ES import, re-export, `require()` or dynamic `import()`.
    Import {
        line: u32,
        specifier: String,
        locals: Vec<String>,
        /// ES `import` declarations bind for the whole module.
        hoisted: bool,
    },
    Call {
        line: u32,
        callee: String,
    },
    Extends {
        line: u32,
        base: String,
    },
}

impl LanguageExtractor for JavaScriptExtractor {
    fn file_type(&self) -> FileType {
        FileType::JavaScript
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

        let mut resolved = Vec::with_capacity(facts.len());
        for fact in &facts {
            guard.check_deadline()?;
            let res = match fact {
                Fact::Import {
                    specifier,
                    locals,
                    hoisted,
                    ..
                } => {
                    let res = ctx.resolver.resolve_js(ctx.path, specifier);
                    if *hoisted {
                        for local in locals {
                            bindings.bind(local, res.clone());
                        }
                    }
                    Some(res)
                }
                _ => None,
            };
            resolved.push(res);
        }

        // Document order: `require()` bindings only cover what follows them.
        for (fact, res) in facts.iter().zip(resolved) {
            guard.check_deadline()?;
            match (fact, res) {
                (
                    Fact::Import {
                        line,
                        specifier,
                        locals,
                        hoisted,
                    },
                    Some(res),
                ) => {
                    push(&mut relationships, &mut stats, ctx, &res, specifier, RelationshipKind::Import, *line);
                    if !*hoisted {
                        for local in locals {
                            bindings.bind(local, res.clone());
                        }
                    }
                }
                (Fact::Call { line, callee }, _) => {
                    match resolve_reference(&bindings, &local_defs, callee) {
                        Some(res) => push(&mut relationships, &mut stats, ctx, &res, callee, RelationshipKind::Call, *line),
                        None => stats.intra_file_calls += 1,
                    }
                }
                (Fact::Extends { line, base }, _) => {
                    if let Some(res) = resolve_reference(&bindings, &local_defs, base) {
                        push(&mut relationships, &mut stats, ctx, &res, base, RelationshipKind::Inheritance, *line);
                    }
                }
                (Fact::Import { .. }, None) => {}
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
            let Some(specifier) = node.child_by_field_name("source").map(|s| string_value(s, ctx)) else {
                return;
            };
            let mut locals = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "import_clause" {
                    import_clause_locals(child, ctx, &mut locals);
                }
            }
            facts.push(Fact::Import {
                line: line_of(node),
                specifier,
                locals,
                hoisted: true,
            });
        }
        "export_statement" => {
            if let Some(source) = node.child_by_field_name("source") {
                facts.push(Fact::Import {
                    line: line_of(node),
                    specifier: string_value(source, ctx),
                    locals: Vec::new(),
                    hoisted: true,
                });
            }
        }
        "call_expression" => {
            let Some(function) = node.child_by_field_name("function") else {
                return;
            };
            let is_require = function.kind() == "identifier" && ctx.text(function) == "require";
            if is_require || function.kind() == "import" {
                if let Some(specifier) = first_string_argument(node, ctx) {
                    let locals = if is_require {
                        declarator_locals(node, ctx)
                    } else {
                        Vec::new()
                    };
                    facts.push(Fact::Import {
                        line: line_of(node),
                        specifier,
                        locals,
                        hoisted: false,
                    });
                }
                return;
            }
            if let Some(callee) = dotted_text(function, ctx) {
                facts.push(Fact::Call {
                    line: line_of(node),
                    callee,
                });
            }
        }
        "class_declaration" | "class" => {
            if let Some(name) = node.child_by_field_name("name") {
                local_defs.insert(ctx.text(name).to_string());
            }
            let mut cursor = node.walk();
            let heritage = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "class_heritage");
            if let Some(heritage) = heritage {
                let mut cursor = heritage.walk();
                let base = heritage
                    .named_children(&mut cursor)
                    .find_map(|b| dotted_text(b, ctx));
                if let Some(base) = base {
                    facts.push(Fact::Extends {
                        line: line_of(node),
                        base,
                    });
                }
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                local_defs.insert(ctx.text(name).to_string());
            }
        }
        "variable_declarator" => {
            let is_definition = node.child_by_field_name("value").is_some_and(|v| {
                matches!(
                    v.kind(),
                    "arrow_function" | "function_expression" | "function" | "class"
                )
            });
            if !is_definition {
                return;
            }
            if let Some(name) = node.child_by_field_name("name").filter(|n| n.kind() == "identifier") {
                local_defs.insert(ctx.text(name).to_string());
            }
        }
        _ => {}
    }
}

/// Strip the quotes from a string literal node.
fn string_value(node: Node<'_>, ctx: &ExtractContext<'_>) -> String {
    ctx.text(node)
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

fn first_string_argument(call: Node<'_>, ctx: &ExtractContext<'_>) -> Option<String> {
    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let first = arguments.named_children(&mut cursor).next()?;
    matches!(first.kind(), "string" | "template_string").then(|| string_value(first, ctx))
}

/// Names bound by `import a, { b as c }, * as d from ...`.
fn import_clause_locals(clause: Node<'_>, ctx: &ExtractContext<'_>, locals: &mut Vec<String>) {
    let mut cursor = clause.walk();
    for child in clause.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => locals.push(ctx.text(child).to_string()),
            "namespace_import" => {
                let mut inner = child.walk();
                locals.extend(
                    child
                        .named_children(&mut inner)
                        .filter(|n| n.kind() == "identifier")
                        .map(|n| ctx.text(n).to_string()),
                );
            }
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.named_children(&mut inner) {
                    let local = spec
                        .child_by_field_name("alias")
                        .or_else(|| spec.child_by_field_name("name"));
                    if let Some(local) = local {
                        locals.push(ctx.text(local).to_string());
                    }
                }
            }
            _ => {}
        }
    }
}

/// Names bound by `const x = require(...)` or `const { a, b } = require(...)`.
fn declarator_locals(call: Node<'_>, ctx: &ExtractContext<'_>) -> Vec<String> {
    let Some(declarator) = call.parent().filter(|p| p.kind() == "variable_declarator") else {
        return Vec::new();
    };
    let Some(name) = declarator.child_by_field_name("name") else {
        return Vec::new();
    };
    match name.kind() {
        "identifier" => vec![ctx.text(name).to_string()],
        "object_pattern" => {
            let mut cursor = name.walk();
            name.named_children(&mut cursor)
                .filter_map(|p| match p.kind() {
                    "shorthand_property_identifier_pattern" => Some(ctx.text(p).to_string()),
                    "pair_pattern" => p
                        .child_by_field_name("value")
                        .filter(|v| v.kind() == "identifier")
                        .map(|v| ctx.text(v).to_string()),
                    _ => None,
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

/// `a.b.c` for identifier/member chains.
fn dotted_text(node: Node<'_>, ctx: &ExtractContext<'_>) -> Option<String> {
    let mut segments = Vec::new();
    let mut current = node;
    loop {
        if segments.len() >= MAX_DOTTED_SEGMENTS {
            return None;
        }
        match current.kind() {
            "identifier" | "this" => {
                segments.push(ctx.text(current));
                break;
            }
            "member_expression" => {
                segments.push(ctx.text(current.child_by_field_name("property")?));
                current = current.child_by_field_name("object")?;
            }
            _ => return None,
        }
    }
    segments.reverse();
    Some(segments.join("."))
}
