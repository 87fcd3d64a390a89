//! Fragment synthesis: turning payload text into insertable nodes.
//!
//! Payloads that read as a clean translation unit (only top-level
//! declarations, no parse errors) are used directly. Anything else is
//! wrapped in a scratch function body and the inner statements extracted.
//! A single identifier is special-cased so the resulting node is a bare
//! identifier rather than an expression statement.

use std::sync::LazyLock;

use regex::Regex;

use crate::lang::Lang;
use crate::node::{is_identifier_kind, SourceNode};
use crate::tree::{migrate_subtree, SourceTree};

const WRAP_PREFIX: &str = "void __frag() {\n";

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// Top-level kinds acceptable in the translation-unit fast path.
fn is_toplevel_kind(kind: &str) -> bool {
    matches!(
        kind,
        "declaration"
            | "function_definition"
            | "type_definition"
            | "struct_specifier"
            | "union_specifier"
            | "enum_specifier"
            | "preproc_include"
            | "preproc_def"
            | "preproc_function_def"
            | "preproc_ifdef"
            | "preproc_if"
            | "preproc_call"
            | "comment"
            | ";"
    )
}

/// A synthesized tree plus the nodes that stand for the original payload.
///
/// `base` is the offset within the fragment tree's buffer corresponding to
/// byte 0 of the payload text, so attaching at target offset `at` shifts
/// every node by `at - base`.
pub struct Fragment {
    pub tree: SourceTree,
    pub nodes: Vec<SourceNode>,
    pub base: isize,
}

impl Fragment {
    pub fn single(&self) -> Option<SourceNode> {
        if self.nodes.len() == 1 {
            Some(self.nodes[0].clone())
        } else {
            None
        }
    }
}

/// Parse `text` into an insertable fragment.
pub fn fragment(text: &str, lang: &Lang) -> Fragment {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Fragment {
            tree: SourceTree::holding(text.to_owned(), lang.clone()),
            nodes: Vec::new(),
            base: 0,
        };
    }

    if IDENT_RE.is_match(trimmed) {
        if let Some(frag) = identifier_fragment(text, trimmed, lang) {
            return frag;
        }
    }

    // Translation-unit fast path.
    let tree = SourceTree::new(text, lang.clone());
    if !tree.had_errors() {
        if let Some(root) = tree.root() {
            let children = root.children();
            if !children.is_empty() && children.iter().all(|c| is_toplevel_kind(c.kind())) {
                return Fragment {
                    nodes: children,
                    tree,
                    base: 0,
                };
            }
        }
    }

    statement_fragment(text, lang)
}

/// Sentinel declaration path: parse the identifier inside a scratch body
/// and drill down to the bare identifier node.
fn identifier_fragment(text: &str, trimmed: &str, lang: &Lang) -> Option<Fragment> {
    let lead = text.find(trimmed).unwrap_or(0);
    let src = format!("{WRAP_PREFIX}{trimmed};\n}}");
    let tree = SourceTree::new(&src, lang.clone());
    let root = tree.root()?;
    let ident = root
        .find_where(|n| is_identifier_kind(n.kind()) && n.text() == trimmed)
        .into_iter()
        .next()?;
    Some(Fragment {
        nodes: vec![ident],
        tree,
        base: WRAP_PREFIX.len() as isize - lead as isize,
    })
}

/// Wrap the payload in `void __frag() { ... }` and extract the inner
/// statements. Multiple statements are re-emitted into a fresh tree whose
/// buffer is exactly the payload.
fn statement_fragment(text: &str, lang: &Lang) -> Fragment {
    let src = format!("{WRAP_PREFIX}{text}\n}}");
    let tree = SourceTree::new(&src, lang.clone());
    let base = WRAP_PREFIX.len() as isize;

    let stmts: Vec<SourceNode> = tree
        .root()
        .and_then(|root| {
            root.children()
                .into_iter()
                .find(|c| c.kind() == "function_definition")
        })
        .and_then(|def| def.child_by_field("body"))
        .map(|body| {
            body.children()
                .into_iter()
                .filter(|c| c.kind() != "{" && c.kind() != "}")
                .collect()
        })
        .unwrap_or_default();

    if stmts.len() > 1 {
        let holding = SourceTree::holding(text.to_owned(), lang.clone());
        for stmt in &stmts {
            if let (Some(parent), Some(i)) = (stmt.parent(), stmt.index_in_parent()) {
                parent.remove_child_at(i);
            }
            stmt.set_parent(None);
            migrate_subtree(stmt, &holding, -base);
        }
        return Fragment {
            tree: holding,
            nodes: stmts,
            base: 0,
        };
    }

    Fragment {
        tree,
        nodes: stmts,
        base,
    }
}
