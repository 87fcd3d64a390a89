//! Definition lookup.
//!
//! `find_definition` walks enclosing scopes outward from the reference.
//! Within each scope it enumerates the identifiers declared there and
//! classifies each candidate by walking up its declarator chain. Matching
//! uses the searchable text (the original spelling when captured), so a
//! renamed definition still resolves under its old name.

use upp_core::{is_identifier_kind, SourceNode};

use super::scope::is_scope_kind;
use super::Helpers;
use crate::error::UppError;

/// What counts as a definition for a lookup.
#[derive(Debug, Clone, Copy)]
pub struct FindOptions {
    /// Accept variable/function/typedef/field/parameter declarations.
    pub variable: bool,
    /// Accept struct/union/enum tags.
    pub tag: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            variable: true,
            tag: false,
        }
    }
}

/// Declaration kinds that terminate a declarator chain.
fn is_declaration_kind(kind: &str) -> bool {
    matches!(
        kind,
        "parameter_declaration"
            | "declaration"
            | "type_definition"
            | "field_declaration"
            | "function_definition"
    )
}

fn is_declarator_link(kind: &str) -> bool {
    matches!(
        kind,
        "pointer_declarator"
            | "array_declarator"
            | "function_declarator"
            | "parenthesized_declarator"
            | "attributed_declarator"
            | "init_declarator"
    )
}

impl Helpers {
    /// Resolve a name from an identifier node, or from a scope node plus an
    /// explicit name. Walks enclosing scopes outward; errors when the name
    /// never classifies as a declaration.
    pub fn find_definition(
        &self,
        target: &SourceNode,
        name: Option<&str>,
        opts: FindOptions,
    ) -> Result<SourceNode, UppError> {
        // Memoize only default-shaped, name-derived lookups; an explicit
        // name or option set would alias other results under the same id.
        let memoize = name.is_none() && opts.variable && !opts.tag;
        let name = match name {
            Some(n) => n.to_owned(),
            None => target.searchable_text(),
        };
        if name.is_empty() {
            return Err(UppError::unresolved(name).with_node(target));
        }

        if memoize {
            if let Some(hit) = self.caches().borrow().definitions.get(&target.id()) {
                if hit.is_valid() {
                    return Ok(hit.clone());
                }
            }
        }

        let mut scope = if is_scope_kind(target.kind()) {
            Some(target.clone())
        } else {
            self.enclosing_scope(target)
        };

        while let Some(s) = scope {
            for candidate in self.scope_identifiers(&s) {
                if candidate.searchable_text() != name {
                    continue;
                }
                if let Some(def) = classify_declaration(&candidate, opts) {
                    if memoize {
                        self.caches()
                            .borrow_mut()
                            .definitions
                            .insert(target.id(), def.clone());
                    }
                    return Ok(def);
                }
            }
            scope = self.enclosing_scope(&s);
        }
        Err(UppError::unresolved(name).with_node(target))
    }

    /// Permissive variant of [`Helpers::find_definition`].
    pub fn find_definition_or_null(
        &self,
        target: &SourceNode,
        name: Option<&str>,
        opts: FindOptions,
    ) -> Option<SourceNode> {
        self.find_definition(target, name, opts).ok()
    }
}

/// Classify an identifier occurrence: is it the declared name of some
/// declaration, and if so, which node represents the declaration?
pub(crate) fn classify_declaration(candidate: &SourceNode, opts: FindOptions) -> Option<SourceNode> {
    debug_assert!(is_identifier_kind(candidate.kind()));
    let mut prev = candidate.clone();
    let mut cur = candidate.parent();
    while let Some(node) = cur {
        let kind = node.kind();
        if matches!(kind, "struct_specifier" | "union_specifier" | "enum_specifier") {
            // The specifier's own tag; a bodyless specifier is a use, not a
            // definition.
            if opts.tag
                && node.child_by_field("name").as_ref() == Some(candidate)
                && node.child_by_field("body").is_some()
            {
                return Some(node);
            }
            return None;
        }
        if is_declaration_kind(kind) {
            if opts.variable && prev.field_name() == Some("declarator") {
                return Some(node);
            }
            return None;
        }
        if kind == "enumerator" {
            if opts.variable && node.child_by_field("name").as_ref() == Some(candidate) {
                return Some(node);
            }
            return None;
        }
        if kind == "init_declarator" {
            // References inside initializer values do not declare.
            if node.child_by_field("value").as_ref() == Some(&prev) {
                return None;
            }
        } else if !is_declarator_link(kind) {
            return None;
        }
        prev = node.clone();
        cur = prev.parent();
    }
    None
}

/// The identifier that names a declaration node.
pub(crate) fn declaration_name_node(def: &SourceNode) -> Option<SourceNode> {
    match def.kind() {
        "struct_specifier" | "union_specifier" | "enum_specifier" | "enumerator" => {
            def.child_by_field("name")
        }
        _ => {
            let mut node = def.child_by_field("declarator")?;
            loop {
                if is_identifier_kind(node.kind()) {
                    return Some(node);
                }
                let next = node
                    .child_by_field("declarator")
                    .or_else(|| node.children().into_iter().find(|c| is_identifier_kind(c.kind())));
                match next {
                    Some(n) => node = n,
                    None => return None,
                }
            }
        }
    }
}
