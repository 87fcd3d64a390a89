//! Scope resolution for C.
//!
//! A scope is a `compound_statement`, `translation_unit`,
//! `field_declaration_list` or `enumerator_list`. A `function_definition`
//! additionally acts as the scope of its parameters: the body's compound
//! statement chains up through it, while the function's own name declarator
//! chains past it to the parent scope.

use upp_core::{is_identifier_kind, SourceNode};

use super::Helpers;

pub(crate) fn is_scope_kind(kind: &str) -> bool {
    matches!(
        kind,
        "compound_statement" | "translation_unit" | "field_declaration_list" | "enumerator_list"
    )
}

impl Helpers {
    /// The nearest enclosing scope of a node, memoized by node id.
    pub fn enclosing_scope(&self, node: &SourceNode) -> Option<SourceNode> {
        if let Some(hit) = self.caches().borrow().enclosing.get(&node.id()) {
            return hit.clone();
        }
        let result = compute_enclosing_scope(node);
        self.caches()
            .borrow_mut()
            .enclosing
            .insert(node.id(), result.clone());
        result
    }

    /// All identifiers whose enclosing scope is exactly `scope`, memoized
    /// by scope id.
    pub fn scope_identifiers(&self, scope: &SourceNode) -> Vec<SourceNode> {
        if let Some(hit) = self.caches().borrow().scope_idents.get(&scope.id()) {
            return hit.clone();
        }
        let mut idents = Vec::new();
        for node in scope.descendants() {
            if is_identifier_kind(node.kind()) && self.enclosing_scope(&node).as_ref() == Some(scope)
            {
                idents.push(node);
            }
        }
        self.caches()
            .borrow_mut()
            .scope_idents
            .insert(scope.id(), idents.clone());
        idents
    }

    /// Whether `scope` (or any scope on its chain) encloses `node`.
    pub fn scope_contains(&self, scope: &SourceNode, node: &SourceNode) -> bool {
        let mut cur = self.enclosing_scope(node);
        while let Some(s) = cur {
            if &s == scope {
                return true;
            }
            cur = self.enclosing_scope(&s);
        }
        false
    }
}

fn compute_enclosing_scope(node: &SourceNode) -> Option<SourceNode> {
    let mut saw_parameter_list = false;
    let mut came_from = node.clone();
    let mut cur = node.parent();
    while let Some(ancestor) = cur {
        let kind = ancestor.kind();
        if is_scope_kind(kind) {
            return Some(ancestor);
        }
        if kind == "parameter_list" {
            saw_parameter_list = true;
        }
        if kind == "function_definition" {
            let from_body = came_from.field_name() == Some("body");
            if saw_parameter_list || from_body {
                return Some(ancestor);
            }
            // The function's own name declarator resolves in the parent
            // scope; keep walking.
        }
        came_from = ancestor.clone();
        cur = came_from.parent();
    }
    None
}
