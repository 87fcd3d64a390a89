//! The transform driver.
//!
//! `transform` orchestrates one file: source preparation, the recursive
//! node walk (masked-invocation evaluation plus rule application), and the
//! bounded fixed-point sweep of pending rules over newly inserted nodes.

pub mod prepare;
pub mod rules;

#[cfg(test)]
mod prepare_tests;
#[cfg(test)]
mod transform_tests;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use upp_core::{NodeContent, SourceNode, SourceTree};

use crate::error::UppError;
use crate::helpers::Helpers;
use crate::macros::{evaluate_macro, MacroValue};
use crate::registry::{Context, LoadKind, Registry};

use prepare::{Invocation, Prepared};

/// Bound on fixed-point sweeps over pending rules.
pub const MAX_ITERATIONS: usize = 20;

/// Hard budget on total pending-rule firings per file; a backstop against
/// rules that mint fresh matching nodes forever.
pub const MAX_RULE_FIRINGS: usize = 512;

/// Nesting bound for fixed-point sweeps started from within a sweep.
const MAX_SWEEP_DEPTH: usize = 8;

fn fire_allowed(registry: &Registry, ctx: &Context) -> bool {
    if ctx.try_fire(MAX_RULE_FIRINGS) {
        return true;
    }
    if ctx.mark_budget_warned() {
        tracing::warn!("pending-rule firing budget ({MAX_RULE_FIRINGS}) exhausted");
        registry.diagnostics().borrow_mut().warning(
            Some("UPP005"),
            0..0,
            format!("pending-rule firing budget ({MAX_RULE_FIRINGS}) exhausted"),
        );
    }
    false
}

impl Registry {
    /// Transform one file's source and return the resulting text.
    pub fn transform(&self, source: &str, origin: &Path) -> Result<String, UppError> {
        self.transform_with(source, origin, None)
    }

    /// Transform with an optional parent context (used when this file is a
    /// dependency of another transform).
    pub fn transform_with(
        &self,
        source: &str,
        origin: &Path,
        parent: Option<&Context>,
    ) -> Result<String, UppError> {
        let lang = upp_core::c();
        let ctx = Context::new(origin);
        ctx.set_parent(parent.cloned());

        // An initial tree and helpers exist before preparation finishes so
        // child dependencies can observe this registry mid-flight.
        let initial = SourceTree::new(source, lang.clone());
        ctx.set_tree(initial.clone(), self.helpers_for(&initial));
        self.set_last_context(&ctx);
        if parent.is_none() {
            self.set_main_context_if_empty(&ctx);
        }

        let prepared = prepare::prepare_source(source, &lang, self.comments());
        self.apply_prepared(&prepared, origin)?;

        let tree = SourceTree::new(&prepared.clean, lang.clone());
        let helpers = self.helpers_for(&tree);
        ctx.set_tree(tree.clone(), helpers.clone());
        ctx.set_invocations(prepared.invocations.clone());
        link_invocation_nodes(&tree, &prepared);

        if let Some(root) = tree.root() {
            transform_node(self, &helpers, &ctx, &root, false)?;
            evaluate_pending_rules(self, &helpers, &ctx, vec![root])?;
        }
        Ok(tree.text())
    }

    /// Side-effect phase of preparation: register the collected `@define`
    /// macros and discovery-load every `@include`.
    pub(crate) fn apply_prepared(&self, prepared: &Prepared, origin: &Path) -> Result<(), UppError> {
        for def in &prepared.defines {
            self.register_script_macro(&def.name, &def.params, &def.body, origin, def.index);
        }
        for inv in &prepared.invocations {
            if inv.name == "include" {
                if let Some(arg) = inv.args.first() {
                    self.load_dependency(arg, origin, LoadKind::Discovery)?;
                }
            }
        }
        Ok(())
    }
}

/// Attach each discovered invocation to the comment node that masks it.
fn link_invocation_nodes(tree: &SourceTree, prepared: &Prepared) {
    let Some(root) = tree.root() else {
        return;
    };
    for inv in &prepared.invocations {
        if let Some(node) = root.descendant_for_range(inv.start, inv.end) {
            if node.kind() == "comment" {
                *inv.node.borrow_mut() = Some(node);
            }
        }
    }
}

/// The invocation record for a masked comment met during the walk; built
/// ad hoc for invocations injected by macro output.
fn invocation_for(ctx: &Context, node: &SourceNode, name: String, args: Vec<String>) -> Invocation {
    for inv in ctx.invocations() {
        if inv.node.borrow().as_ref() == Some(node) {
            return inv;
        }
    }
    let start = node.start().max(0) as usize;
    let end = node.end().max(0) as usize;
    let text = node.tree().map(|t| t.text()).unwrap_or_default();
    let (line, col) = prepare::line_col(&text, start);
    Invocation {
        name,
        args,
        start,
        end,
        line,
        col,
        node: Rc::new(RefCell::new(Some(node.clone()))),
    }
}

/// Walk one node: masked invocations, eager rules, pending rules, then the
/// children. Guarded by the transform stack (physical cycles) and the
/// transformed set (memoization).
pub(crate) fn transform_node(
    registry: &Registry,
    helpers: &Helpers,
    ctx: &Context,
    node: &SourceNode,
    force: bool,
) -> Result<(), UppError> {
    if !node.is_valid() {
        return Ok(());
    }
    if ctx.on_stack(node) {
        return Ok(());
    }
    if !force && ctx.was_transformed(node) {
        return Ok(());
    }
    ctx.push_stack(node);
    let result = visit(registry, helpers, ctx, node);
    ctx.pop_stack(node);
    ctx.mark_transformed(node);
    result?;

    // Post-walk: children inserted during the visit get their own pass,
    // retried until the child list settles.
    loop {
        let fresh: Vec<SourceNode> = node
            .children()
            .into_iter()
            .filter(|c| c.is_valid() && !ctx.was_transformed(c) && !ctx.on_stack(c))
            .collect();
        if fresh.is_empty() {
            break;
        }
        for child in fresh {
            transform_node(registry, helpers, ctx, &child, false)?;
        }
    }
    Ok(())
}

fn visit(
    registry: &Registry,
    helpers: &Helpers,
    ctx: &Context,
    node: &SourceNode,
) -> Result<(), UppError> {
    if node.kind() == "comment" {
        if let Some((name, args)) = prepare::parse_invocation_text(&node.text()) {
            let invocation = invocation_for(ctx, node, name, args);
            match evaluate_macro(registry, ctx, helpers, &invocation, node) {
                Ok(value) => apply_value(registry, helpers, ctx, node, value)?,
                // A failing macro contributes nothing; the walk continues.
                Err(err) => registry.report(&err, Some(ctx.origin())),
            }
            return Ok(());
        }
    }

    for rule in registry.transform_rules_snapshot() {
        if !node.is_valid() {
            return Ok(());
        }
        if !rule.active.get() {
            continue;
        }
        if !(rule.matcher)(node, helpers) {
            continue;
        }
        match (rule.action)(node, helpers) {
            Ok(value) => apply_value(registry, helpers, ctx, node, value)?,
            Err(err) => registry.report(&err, Some(ctx.origin())),
        }
    }

    for rule in registry.pending_snapshot() {
        if !node.is_valid() {
            return Ok(());
        }
        if ctx.rule_applied(node, rule.id) {
            continue;
        }
        if !(rule.matcher)(node, helpers) {
            continue;
        }
        if !fire_allowed(registry, ctx) {
            break;
        }
        ctx.mark_rule_applied(node, rule.id);
        match (rule.action)(node, helpers) {
            Ok(value) => {
                apply_value(registry, helpers, ctx, node, value)?;
                helpers.invalidate_caches();
            }
            Err(err) => registry.report(&err, Some(ctx.origin())),
        }
    }

    if !node.is_valid() {
        return Ok(());
    }
    for child in node.children() {
        transform_node(registry, helpers, ctx, &child, false)?;
    }
    Ok(())
}

/// Splice a macro/rule result into the tree. Returns the nodes now at the
/// site and whether the original node survived by identity morph.
fn replace_with_value(
    registry: &Registry,
    helpers: &Helpers,
    ctx: &Context,
    node: &SourceNode,
    value: MacroValue,
) -> Result<(Vec<SourceNode>, bool), UppError> {
    match value {
        MacroValue::Undefined => Ok((Vec::new(), false)),
        MacroValue::Null => {
            node.replace_with("", false);
            Ok((Vec::new(), false))
        }
        MacroValue::Node(n) => Ok((node.replace_with(NodeContent::Node(n), true), false)),
        MacroValue::Tree(t) => Ok((node.replace_with(NodeContent::Tree(t), true), false)),
        MacroValue::Nodes(items) => {
            let content = NodeContent::List(
                items
                    .into_iter()
                    .filter_map(MacroValue::into_content)
                    .collect(),
            );
            Ok((node.replace_with(content, true), false))
        }
        MacroValue::Str(s) => {
            // Textual results that still carry invocations are re-prepared
            // so the nested invocations arrive masked.
            let payload = if s.contains('@') {
                let prepared = prepare::prepare_source(&s, &helpers.tree().lang(), false);
                registry.apply_prepared(&prepared, ctx.origin())?;
                prepared.clean
            } else {
                s
            };
            let new = node.replace_with(payload, true);
            let morphed = new.len() == 1 && new[0] == *node;
            Ok((new, morphed))
        }
    }
}

/// Replacement plus its follow-up: a pending-rule fixed point over the
/// injected geometry, then a forced transform of each new node.
fn apply_value(
    registry: &Registry,
    helpers: &Helpers,
    ctx: &Context,
    node: &SourceNode,
    value: MacroValue,
) -> Result<(), UppError> {
    if value.is_undefined() {
        return Ok(());
    }
    let (new_nodes, morphed) = replace_with_value(registry, helpers, ctx, node, value)?;
    if new_nodes.is_empty() {
        return Ok(());
    }
    evaluate_pending_rules(registry, helpers, ctx, new_nodes.clone())?;
    for fresh in new_nodes {
        if !fresh.is_valid() {
            continue;
        }
        if morphed && fresh == *node {
            // The morphed node is our own frame; step out of it for the
            // recursive pass and back in afterwards.
            ctx.pop_stack(node);
            let result = transform_node(registry, helpers, ctx, &fresh, true);
            ctx.push_stack(node);
            result?;
        } else {
            transform_node(registry, helpers, ctx, &fresh, true)?;
        }
    }
    Ok(())
}

/// Fixed-point evaluation of pending rules over seed subtrees.
///
/// Each iteration clears the mutation flag and semantic caches, then
/// visits every seed descendant in descending start/end order (deeper and
/// later nodes first, preserving parent offsets). Rules fire at most once
/// per node identity; freshly inserted nodes become the next iteration's
/// seeds. Stops when an iteration neither mutates nor seeds, or at the
/// iteration bound.
pub(crate) fn evaluate_pending_rules(
    registry: &Registry,
    helpers: &Helpers,
    ctx: &Context,
    seeds: Vec<SourceNode>,
) -> Result<(), UppError> {
    if !ctx.enter_sweep(MAX_SWEEP_DEPTH) {
        // Deeply nested sweep; the enclosing sweeps will pick the seeds up.
        return Ok(());
    }
    let result = run_sweeps(registry, helpers, ctx, seeds);
    ctx.leave_sweep();
    result
}

fn run_sweeps(
    registry: &Registry,
    helpers: &Helpers,
    ctx: &Context,
    seeds: Vec<SourceNode>,
) -> Result<(), UppError> {
    let mut seeds = seeds;
    for _ in 0..MAX_ITERATIONS {
        if registry.pending_snapshot().is_empty() {
            return Ok(());
        }
        ctx.take_mutated();
        helpers.invalidate_caches();

        let mut next_seeds: Vec<SourceNode> = Vec::new();
        for seed in &seeds {
            if !seed.is_valid() {
                continue;
            }
            let mut nodes = vec![seed.clone()];
            nodes.extend(seed.descendants());
            nodes.sort_by(|a, b| b.start().cmp(&a.start()).then(b.end().cmp(&a.end())));

            for candidate in nodes {
                if !candidate.is_valid() {
                    continue;
                }
                for rule in registry.pending_snapshot() {
                    if !candidate.is_valid() {
                        break;
                    }
                    if ctx.rule_applied(&candidate, rule.id) {
                        continue;
                    }
                    if !(rule.matcher)(&candidate, helpers) {
                        continue;
                    }
                    if !fire_allowed(registry, ctx) {
                        return Ok(());
                    }
                    ctx.mark_rule_applied(&candidate, rule.id);
                    match (rule.action)(&candidate, helpers) {
                        Ok(value) => {
                            let (fresh, _) =
                                replace_with_value(registry, helpers, ctx, &candidate, value)?;
                            for new_node in fresh {
                                if new_node.is_valid() {
                                    transform_node(registry, helpers, ctx, &new_node, true)?;
                                    next_seeds.push(new_node);
                                }
                            }
                            helpers.invalidate_caches();
                        }
                        Err(err) => registry.report(&err, Some(ctx.origin())),
                    }
                }
            }
        }

        let mutated = ctx.take_mutated();
        if next_seeds.is_empty() && !mutated {
            return Ok(());
        }
        if !next_seeds.is_empty() {
            seeds = next_seeds;
        }
    }

    tracing::warn!("pending-rule evaluation did not settle after {MAX_ITERATIONS} iterations");
    registry.diagnostics().borrow_mut().warning(
        Some("UPP005"),
        0..0,
        format!("pending-rule evaluation stopped after {MAX_ITERATIONS} iterations"),
    );
    Ok(())
}
