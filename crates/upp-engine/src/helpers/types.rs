//! Type extraction and function-signature decomposition.

use std::collections::HashSet;

use upp_core::{is_identifier_kind, SourceNode};

use super::definitions::declaration_name_node;
use super::{FindOptions, Helpers};
use crate::error::UppError;

/// Decomposed function declarator.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub return_type: String,
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub node: SourceNode,
    pub name_node: SourceNode,
    pub body_node: Option<SourceNode>,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub node: SourceNode,
    pub type_text: String,
    pub name: Option<String>,
}

impl Helpers {
    /// Canonical type string of a declared identifier: the declaration's
    /// base type plus the pointer/array shape accumulated on the way up
    /// from the identifier.
    ///
    /// With `resolve`, typedef names are chased through `find_definition`
    /// (terminating on cycles); unresolved names fall back to the helpers
    /// of fully loaded dependencies.
    pub fn get_type(&self, target: &SourceNode, resolve: bool) -> Result<String, UppError> {
        let (decl, stars, brackets) = outer_declaration(target)
            .ok_or_else(|| UppError::unresolved(target.searchable_text()).with_node(target))?;
        let type_node = decl
            .child_by_field("type")
            .ok_or_else(|| UppError::unresolved(target.searchable_text()).with_node(target))?;

        let mut base = type_node.text();
        let mut stars = stars;

        if resolve {
            let mut visited: HashSet<u64> = HashSet::new();
            let mut current = type_node;
            while current.kind() == "type_identifier" && visited.insert(current.id()) {
                let Some((next_base, next_node, extra_stars)) = self.resolve_typedef(&current)
                else {
                    break;
                };
                stars += extra_stars;
                base = next_base;
                match next_node {
                    Some(node) => current = node,
                    None => break,
                }
            }
        }

        Ok(format_type(&base, stars, brackets))
    }

    /// Chase one typedef level: returns the underlying base text, the type
    /// node to keep chasing (when itself a typedef name), and the pointer
    /// depth added by the typedef's declarator.
    fn resolve_typedef(
        &self,
        name_node: &SourceNode,
    ) -> Option<(String, Option<SourceNode>, usize)> {
        let def = self
            .find_definition_or_null(name_node, None, FindOptions::default())
            .or_else(|| {
                let name = name_node.searchable_text();
                self.dependency_helpers().into_iter().find_map(|h| {
                    let root = h.tree().root()?;
                    h.find_definition_or_null(&root, Some(&name), FindOptions::default())
                })
            })?;
        if def.kind() != "type_definition" {
            return None;
        }
        let underlying = def.child_by_field("type")?;
        let mut stars = 0usize;
        if let Some(mut declarator) = def.child_by_field("declarator") {
            while declarator.kind() == "pointer_declarator" {
                stars += 1;
                match declarator.child_by_field("declarator") {
                    Some(next) => declarator = next,
                    None => break,
                }
            }
        }
        let next = if underlying.kind() == "type_identifier" {
            Some(underlying.clone())
        } else {
            None
        };
        Some((underlying.text(), next, stars))
    }

    /// Decompose a function definition or declaration, drilling through
    /// pointer and parenthesized declarator wrappers to the innermost
    /// `function_declarator`.
    pub fn get_function_signature(
        &self,
        fn_node: &SourceNode,
    ) -> Result<FunctionSignature, UppError> {
        let type_node = fn_node
            .child_by_field("type")
            .ok_or_else(|| UppError::consume("node has no type field").with_node(fn_node))?;
        let mut stars = 0usize;
        let mut declarator = fn_node
            .child_by_field("declarator")
            .ok_or_else(|| UppError::consume("node has no declarator").with_node(fn_node))?;
        loop {
            match declarator.kind() {
                "pointer_declarator" => {
                    stars += 1;
                    declarator = declarator
                        .child_by_field("declarator")
                        .ok_or_else(|| UppError::consume("malformed declarator").with_node(fn_node))?;
                }
                "parenthesized_declarator" => {
                    declarator = declarator
                        .named_children()
                        .into_iter()
                        .next()
                        .ok_or_else(|| UppError::consume("malformed declarator").with_node(fn_node))?;
                }
                "function_declarator" => break,
                _ => {
                    return Err(
                        UppError::consume("node is not a function declarator").with_node(fn_node)
                    );
                }
            }
        }

        let name_node = unwrap_to_identifier(&declarator)
            .ok_or_else(|| UppError::consume("function has no name").with_node(fn_node))?;
        let params = declarator
            .child_by_field("parameters")
            .map(|list| {
                list.named_children()
                    .into_iter()
                    .filter(|p| p.kind() == "parameter_declaration")
                    .map(|p| ParamDecl {
                        type_text: p
                            .child_by_field("type")
                            .map(|t| t.text())
                            .unwrap_or_default(),
                        name: declaration_name_node(&p).map(|n| n.text()),
                        node: p,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(FunctionSignature {
            return_type: format_type(&type_node.text(), stars, 0),
            name: name_node.text(),
            params,
            node: fn_node.clone(),
            name_node,
            body_node: fn_node.child_by_field("body"),
        })
    }
}

/// Walk from an identifier up through pointer/array declarators to the
/// declaration that carries the type, counting the shape on the way.
fn outer_declaration(target: &SourceNode) -> Option<(SourceNode, usize, usize)> {
    let mut stars = 0usize;
    let mut brackets = 0usize;
    let mut cur = target.clone();
    loop {
        let parent = cur.parent()?;
        match parent.kind() {
            "pointer_declarator" => stars += 1,
            "array_declarator" => brackets += 1,
            "declaration" | "parameter_declaration" | "field_declaration" | "type_definition"
            | "function_definition" => {
                return Some((parent, stars, brackets));
            }
            "init_declarator" | "function_declarator" | "parenthesized_declarator"
            | "attributed_declarator" => {}
            _ => return None,
        }
        cur = parent;
    }
}

fn unwrap_to_identifier(declarator: &SourceNode) -> Option<SourceNode> {
    let mut node = declarator.child_by_field("declarator")?;
    loop {
        if is_identifier_kind(node.kind()) {
            return Some(node);
        }
        node = node.child_by_field("declarator").or_else(|| {
            node.children()
                .into_iter()
                .find(|c| is_identifier_kind(c.kind()))
        })?;
    }
}

fn format_type(base: &str, stars: usize, brackets: usize) -> String {
    let mut out = base.to_owned();
    if stars > 0 {
        out.push(' ');
        out.push_str(&"*".repeat(stars));
    }
    for _ in 0..brackets {
        out.push_str("[]");
    }
    out
}
