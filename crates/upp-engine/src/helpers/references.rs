//! Reference enumeration and deferred per-reference rewriting.

use std::rc::Rc;

use upp_core::{is_identifier_kind, SourceNode};

use super::definitions::declaration_name_node;
use super::Helpers;
use crate::error::UppError;
use crate::macros::MacroValue;
use crate::transform::rules::{PendingRule, TransformRule};

impl Helpers {
    /// Every identifier in the tree that resolves back to `def`.
    ///
    /// For detached definitions (fragments produced by macros mid-flight)
    /// resolution cannot succeed, so a fallback accepts identifiers whose
    /// scope chain reaches the definition's saved scope.
    pub fn find_references(&self, def: &SourceNode) -> Vec<SourceNode> {
        let Some(name_node) = declaration_name_node(def) else {
            return Vec::new();
        };
        let name = name_node.searchable_text();
        let detached = def.tree().map(|t| t != self.tree()).unwrap_or(true);
        let def_scope = self.enclosing_scope(&name_node);

        let Some(root) = self.tree().root() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for ident in root.find_where(|n| is_identifier_kind(n.kind())) {
            if ident == name_node {
                continue;
            }
            if ident.searchable_text() != name {
                continue;
            }
            let resolved = self.find_definition_or_null(&ident, None, Default::default());
            let is_ref = match (&resolved, detached) {
                (Some(d), false) => d == def,
                // Detached definition: compare scope identity instead.
                (_, true) => match &def_scope {
                    Some(scope) => self
                        .enclosing_scope(&ident)
                        .map(|s| &s == scope || self.scope_contains(scope, &ident))
                        .unwrap_or(false),
                    None => resolved.is_none(),
                },
                (None, false) => false,
            };
            if is_ref {
                out.push(ident);
            }
        }
        out
    }

    /// Register a pending rule that fires on the declaration's references
    /// (and on the declaring identifier itself) as the tree evolves. The
    /// callback's second argument is true only for the declaring
    /// identifier, so one pass can treat declaration and references
    /// differently.
    pub fn with_references(
        &self,
        def: &SourceNode,
        callback: impl Fn(&SourceNode, bool) -> Result<MacroValue, UppError> + 'static,
    ) {
        let Some(name_node) = declaration_name_node(def) else {
            return;
        };
        name_node.capture_text();
        let name = name_node.searchable_text();
        let def_for_match = def.clone();
        let name_id = name_node.id();
        let matcher: Rc<dyn Fn(&SourceNode, &Helpers) -> bool> = Rc::new(move |node, helpers| {
            if !is_identifier_kind(node.kind()) {
                return false;
            }
            if node.searchable_text() != name {
                return false;
            }
            if node.id() == name_id {
                return true;
            }
            match helpers.find_definition_or_null(node, None, Default::default()) {
                Some(resolved) => {
                    if resolved == def_for_match {
                        return true;
                    }
                    // A declaration in the same scope as the original.
                    match (
                        declaration_name_node(&resolved).and_then(|n| helpers.enclosing_scope(&n)),
                        declaration_name_node(&def_for_match)
                            .and_then(|n| helpers.enclosing_scope(&n)),
                    ) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
                }
                None => {
                    // Possibly-detached declaration: accept identifiers that
                    // lexically live under its scope.
                    declaration_name_node(&def_for_match)
                        .and_then(|n| helpers.enclosing_scope(&n))
                        .map(|scope| {
                            helpers.enclosing_scope(node).as_ref() == Some(&scope)
                                || helpers.scope_contains(&scope, node)
                        })
                        .unwrap_or(false)
                }
            }
        });
        let action: Rc<dyn Fn(&SourceNode, &Helpers) -> Result<MacroValue, UppError>> =
            Rc::new(move |node, _helpers| callback(node, node.id() == name_id));
        let context = self.context_node();
        self.add_pending_rule(PendingRule::new(matcher, action, context));
    }

    /// Register a pending rule that fires once on exactly `node`.
    pub fn with_node(
        &self,
        node: &SourceNode,
        callback: impl Fn(&SourceNode, &Helpers) -> Result<MacroValue, UppError> + 'static,
    ) {
        let target = node.clone();
        let matcher: Rc<dyn Fn(&SourceNode, &Helpers) -> bool> =
            Rc::new(move |candidate, _| candidate == &target);
        let context = self.context_node();
        self.add_pending_rule(PendingRule::new(matcher, Rc::new(callback), context));
    }

    /// Register a pending rule matching nodes of the given kinds inside
    /// `scope` (any-of semantics for the kind list).
    pub fn with_match(
        &self,
        scope: &SourceNode,
        kinds: &[&str],
        callback: impl Fn(&SourceNode, &Helpers) -> Result<MacroValue, UppError> + 'static,
    ) {
        let scope = scope.clone();
        let kinds: Vec<String> = kinds.iter().map(|k| (*k).to_owned()).collect();
        let matcher: Rc<dyn Fn(&SourceNode, &Helpers) -> bool> = Rc::new(move |node, _| {
            kinds.iter().any(|k| k == node.kind())
                && (scope.is_ancestor_of(node) || &scope == node)
        });
        let context = self.context_node();
        self.add_pending_rule(PendingRule::new(matcher, Rc::new(callback), context));
    }

    /// Register an eager transform rule combining a node-kind filter with a
    /// custom predicate; evaluated on every node the walk visits.
    pub fn with_pattern(
        &self,
        kind: &str,
        predicate: impl Fn(&SourceNode, &Helpers) -> bool + 'static,
        callback: impl Fn(&SourceNode, &Helpers) -> Result<MacroValue, UppError> + 'static,
    ) {
        let kind = kind.to_owned();
        let matcher: Rc<dyn Fn(&SourceNode, &Helpers) -> bool> =
            Rc::new(move |node, helpers| node.kind() == kind && predicate(node, helpers));
        self.add_transform_rule(TransformRule::new(matcher, Rc::new(callback)));
    }
}
