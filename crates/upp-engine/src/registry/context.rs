//! Per-file transformation state.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use upp_core::{SourceNode, SourceTree};

use crate::helpers::Helpers;
use crate::transform::prepare::Invocation;

pub(crate) struct ContextInner {
    origin: PathBuf,
    tree: RefCell<Option<SourceTree>>,
    helpers: RefCell<Option<Helpers>>,
    invocations: RefCell<Vec<Invocation>>,
    /// Nodes already visited by the walk.
    transformed: RefCell<HashSet<u64>>,
    /// Nodes currently mid-transformation; guards physical cycles.
    stack: RefCell<Vec<u64>>,
    /// node id -> ids of pending rules that already fired on it.
    applied: RefCell<HashMap<u64, HashSet<u64>>>,
    mutated: Cell<bool>,
    parent: RefCell<Option<Context>>,
    /// Total pending-rule firings; a hard budget against runaway rules.
    firings: Cell<usize>,
    budget_warned: Cell<bool>,
    /// Nesting depth of fixed-point sweeps.
    sweep_depth: Cell<usize>,
}

/// Shared handle to one file's transformation state.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Rc<ContextInner>,
}

impl Context {
    pub fn new(origin: &Path) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                origin: origin.to_path_buf(),
                tree: RefCell::new(None),
                helpers: RefCell::new(None),
                invocations: RefCell::new(Vec::new()),
                transformed: RefCell::new(HashSet::new()),
                stack: RefCell::new(Vec::new()),
                applied: RefCell::new(HashMap::new()),
                mutated: Cell::new(false),
                parent: RefCell::new(None),
                firings: Cell::new(0),
                budget_warned: Cell::new(false),
                sweep_depth: Cell::new(0),
            }),
        }
    }

    pub fn origin(&self) -> &Path {
        &self.inner.origin
    }

    pub fn tree(&self) -> Option<SourceTree> {
        self.inner.tree.borrow().clone()
    }

    pub fn helpers(&self) -> Option<Helpers> {
        self.inner.helpers.borrow().clone()
    }

    pub fn set_tree(&self, tree: SourceTree, helpers: Helpers) {
        // Track mutations so the fixed-point sweep knows when to go again.
        let flag = Rc::downgrade(&self.inner);
        tree.add_mutation_hook(Rc::new(move |_, _, _| {
            if let Some(inner) = flag.upgrade() {
                inner.mutated.set(true);
            }
        }));
        *self.inner.tree.borrow_mut() = Some(tree);
        *self.inner.helpers.borrow_mut() = Some(helpers);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.invocations.borrow().clone()
    }

    pub fn set_invocations(&self, invocations: Vec<Invocation>) {
        *self.inner.invocations.borrow_mut() = invocations;
    }

    pub fn parent(&self) -> Option<Context> {
        self.inner.parent.borrow().clone()
    }

    pub fn set_parent(&self, parent: Option<Context>) {
        *self.inner.parent.borrow_mut() = parent;
    }

    // ----- walk bookkeeping -------------------------------------------------

    pub fn was_transformed(&self, node: &SourceNode) -> bool {
        self.inner.transformed.borrow().contains(&node.id())
    }

    pub fn mark_transformed(&self, node: &SourceNode) {
        self.inner.transformed.borrow_mut().insert(node.id());
    }

    pub fn on_stack(&self, node: &SourceNode) -> bool {
        self.inner.stack.borrow().contains(&node.id())
    }

    pub fn push_stack(&self, node: &SourceNode) {
        self.inner.stack.borrow_mut().push(node.id());
    }

    pub fn pop_stack(&self, node: &SourceNode) {
        let mut stack = self.inner.stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|id| *id == node.id()) {
            stack.remove(pos);
        }
    }

    pub fn rule_applied(&self, node: &SourceNode, rule_id: u64) -> bool {
        self.inner
            .applied
            .borrow()
            .get(&node.id())
            .map(|set| set.contains(&rule_id))
            .unwrap_or(false)
    }

    pub fn mark_rule_applied(&self, node: &SourceNode, rule_id: u64) {
        self.inner
            .applied
            .borrow_mut()
            .entry(node.id())
            .or_default()
            .insert(rule_id);
    }

    pub fn take_mutated(&self) -> bool {
        self.inner.mutated.replace(false)
    }

    pub fn mark_mutated(&self) {
        self.inner.mutated.set(true);
    }

    /// Consume one unit of the pending-rule firing budget; false once the
    /// budget is exhausted.
    pub fn try_fire(&self, budget: usize) -> bool {
        let used = self.inner.firings.get();
        if used >= budget {
            return false;
        }
        self.inner.firings.set(used + 1);
        true
    }

    /// One-shot flag for the budget warning.
    pub fn mark_budget_warned(&self) -> bool {
        !self.inner.budget_warned.replace(true)
    }

    pub fn enter_sweep(&self, max_depth: usize) -> bool {
        let depth = self.inner.sweep_depth.get();
        if depth >= max_depth {
            return false;
        }
        self.inner.sweep_depth.set(depth + 1);
        true
    }

    pub fn leave_sweep(&self) {
        let depth = self.inner.sweep_depth.get();
        self.inner.sweep_depth.set(depth.saturating_sub(1));
    }
}
