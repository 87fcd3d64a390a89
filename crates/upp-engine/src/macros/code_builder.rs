//! Template-style code assembly.
//!
//! The builder alternates text parts with interpolated values. Node values
//! are stood in by sentinel identifiers while the composed text is
//! prepared and parsed; the sentinels are then replaced by the original
//! nodes, so every node value keeps its identity inside the result tree.

use std::collections::HashSet;
use std::fmt::Display;

use upp_core::{fragment, NodeContent, SourceNode};

use crate::error::UppError;
use crate::helpers::Helpers;
use crate::macros::MacroValue;
use crate::transform::prepare;

const SENTINEL_PREFIX: &str = "__UPP_NODE_STABILITY_p_";

enum Slot {
    Node(SourceNode),
    List(Vec<MacroValue>),
}

pub struct CodeBuilder {
    helpers: Helpers,
    text: String,
    slots: Vec<(String, Slot)>,
    seen_nodes: HashSet<u64>,
    counter: usize,
}

impl CodeBuilder {
    pub fn new(helpers: Helpers) -> Self {
        Self {
            helpers,
            text: String::new(),
            slots: Vec::new(),
            seen_nodes: HashSet::new(),
            counter: 0,
        }
    }

    pub fn text(mut self, part: impl AsRef<str>) -> Self {
        self.text.push_str(part.as_ref());
        self
    }

    /// Interpolate a node by identity. A stale node, or a node already
    /// interpolated into this builder, degrades to its text.
    pub fn node(mut self, node: &SourceNode) -> Self {
        if !node.is_valid() {
            tracing::warn!("code builder: stale node interpolated as text");
            self.text.push_str("/* stale node */ ");
            self.text.push_str(&node.searchable_text());
            return self;
        }
        if !self.seen_nodes.insert(node.id()) {
            tracing::warn!("code builder: node interpolated twice, falling back to text");
            self.text.push_str(&node.text());
            return self;
        }
        let sentinel = self.next_sentinel();
        self.text.push_str(&sentinel);
        self.slots.push((sentinel, Slot::Node(node.clone())));
        self
    }

    /// Interpolate a list of nodes/strings as one slot; the expansion
    /// separator is chosen from the sentinel's parent node kind.
    pub fn list(mut self, items: Vec<MacroValue>) -> Self {
        let sentinel = self.next_sentinel();
        self.text.push_str(&sentinel);
        self.slots.push((sentinel, Slot::List(items)));
        self
    }

    /// Interpolate anything else, stringified.
    pub fn value(mut self, value: impl Display) -> Self {
        self.text.push_str(&value.to_string());
        self
    }

    fn next_sentinel(&mut self) -> String {
        let sentinel = format!("{SENTINEL_PREFIX}{}", self.counter);
        self.counter += 1;
        sentinel
    }

    /// Assemble: prepare the composed text (masking nested invocations),
    /// parse it as a fragment, then substitute every sentinel.
    pub fn build(self) -> Result<MacroValue, UppError> {
        let lang = self.helpers.tree().lang();
        let masked = if self.text.contains('@') {
            prepare::prepare_source(&self.text, &lang, false).clean
        } else {
            self.text.clone()
        };

        let frag = fragment(&masked, &lang);
        self.helpers.hold(frag.tree.clone());
        let mut tops = frag.nodes.clone();

        for (sentinel, slot) in &self.slots {
            let found = tops
                .iter()
                .flat_map(|n| {
                    let mut all = vec![n.clone()];
                    all.extend(n.descendants());
                    all
                })
                .find(|n| n.is_valid() && n.kind() == "identifier" && n.text() == *sentinel);

            match (found, slot) {
                (Some(site), Slot::Node(node)) => {
                    if node.is_valid() && node.parent().is_some() {
                        let holding = node.remove();
                        self.helpers.hold(holding);
                    }
                    let attached = site.replace_with(NodeContent::Node(node.clone()), false);
                    swap_tops(&mut tops, &site, attached);
                }
                (Some(site), Slot::List(items)) => {
                    let separator = list_separator(&site);
                    let content = list_content(items, separator);
                    let attached = site.replace_with(content, false);
                    swap_tops(&mut tops, &site, attached);
                }
                (None, slot) => {
                    // Mangled sentinel (inside a larger token or comment):
                    // patch by text substitution.
                    let text = frag.tree.text();
                    if let Some(pos) = text.find(sentinel.as_str()) {
                        let replacement = match slot {
                            Slot::Node(node) => node.text(),
                            Slot::List(items) => list_text(items, ", "),
                        };
                        frag.tree.edit(pos, pos + sentinel.len(), &replacement);
                    }
                }
            }
        }

        tops.retain(|n| n.is_valid());
        match tops.len() {
            0 => Ok(MacroValue::Str(frag.tree.text())),
            1 => Ok(MacroValue::Node(tops.remove(0))),
            _ => Ok(MacroValue::Nodes(
                tops.into_iter().map(MacroValue::Node).collect(),
            )),
        }
    }
}

fn swap_tops(tops: &mut Vec<SourceNode>, site: &SourceNode, attached: Vec<SourceNode>) {
    if let Some(pos) = tops.iter().position(|n| n == site) {
        tops.splice(pos..pos + 1, attached);
    }
}

/// Separator appropriate for the slot's surroundings: statements on their
/// own lines, comma lists, otherwise spaces.
fn list_separator(site: &SourceNode) -> &'static str {
    let parent_kind = site
        .ancestors()
        .into_iter()
        .map(|a| a.kind())
        .find(|k| *k != "expression_statement");
    match parent_kind {
        Some("compound_statement") | Some("translation_unit") | Some("field_declaration_list") => {
            "\n"
        }
        Some("argument_list") | Some("parameter_list") | Some("initializer_list")
        | Some("enumerator_list") => ", ",
        _ => " ",
    }
}

fn list_content(items: &[MacroValue], separator: &'static str) -> NodeContent {
    let mut parts = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            parts.push(NodeContent::Text(separator.to_owned()));
        }
        if let Some(content) = item.clone().into_content() {
            parts.push(content);
        }
    }
    NodeContent::List(parts)
}

fn list_text(items: &[MacroValue], separator: &str) -> String {
    items
        .iter()
        .filter_map(|v| v.clone().into_content())
        .map(|c| c.to_text())
        .collect::<Vec<_>>()
        .join(separator)
}
