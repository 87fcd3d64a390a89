//! Semantic helpers for C.
//!
//! Stateless over the tree contents, but memoizes three tables keyed by
//! node id: definitions, per-scope identifiers, and enclosing scopes. The
//! tables are invalidated by comparing the tree's mutation version rather
//! than by eager clearing.

mod definitions;
mod references;
mod scope;
mod types;

#[cfg(test)]
mod definitions_tests;
#[cfg(test)]
mod scope_tests;
#[cfg(test)]
mod types_tests;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use upp_core::{SourceNode, SourceTree};

use crate::transform::prepare::Invocation;
use crate::transform::rules::{PendingRule, TransformRule};

pub use definitions::FindOptions;
pub use types::{FunctionSignature, ParamDecl};

#[derive(Default)]
pub(crate) struct SemanticCaches {
    pub(crate) definitions: HashMap<u64, SourceNode>,
    pub(crate) scope_idents: HashMap<u64, Vec<SourceNode>>,
    pub(crate) enclosing: HashMap<u64, Option<SourceNode>>,
}

/// Mutable fields installed around each macro evaluation and restored
/// afterwards.
#[derive(Default, Clone)]
pub(crate) struct EvalState {
    pub(crate) invocation: Option<Invocation>,
    pub(crate) context_node: Option<SourceNode>,
    pub(crate) last_consumed: Option<SourceNode>,
    pub(crate) active_transform_node: Option<SourceNode>,
    pub(crate) consume_cursor: Option<usize>,
}

pub(crate) struct HelpersInner {
    tree: SourceTree,
    caches: RefCell<SemanticCaches>,
    cache_version: Cell<u64>,
    /// Shared across the registry chain: helpers of fully loaded
    /// dependencies.
    dependency_helpers: Rc<RefCell<Vec<Helpers>>>,
    pending: Rc<RefCell<Vec<PendingRule>>>,
    transform_rules: Rc<RefCell<Vec<TransformRule>>>,
    pub(crate) eval: RefCell<EvalState>,
    /// Holding trees kept alive for the duration of the transformation
    /// (detached nodes die with their tree).
    holdings: RefCell<Vec<SourceTree>>,
}

/// Shared handle to the helper surface for one tree.
#[derive(Clone)]
pub struct Helpers {
    pub(crate) inner: Rc<HelpersInner>,
}

impl PartialEq for Helpers {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Helpers {
    pub fn new(
        tree: SourceTree,
        pending: Rc<RefCell<Vec<PendingRule>>>,
        transform_rules: Rc<RefCell<Vec<TransformRule>>>,
        dependency_helpers: Rc<RefCell<Vec<Helpers>>>,
    ) -> Self {
        Self {
            inner: Rc::new(HelpersInner {
                cache_version: Cell::new(tree.version()),
                tree,
                caches: RefCell::default(),
                dependency_helpers,
                pending,
                transform_rules,
                eval: RefCell::default(),
                holdings: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn tree(&self) -> SourceTree {
        self.inner.tree.clone()
    }

    /// Drop memoized tables when the tree mutated since they were filled.
    pub(crate) fn ensure_fresh(&self) {
        let version = self.inner.tree.version();
        if self.inner.cache_version.get() != version {
            *self.inner.caches.borrow_mut() = SemanticCaches::default();
            self.inner.cache_version.set(version);
        }
    }

    pub fn invalidate_caches(&self) {
        *self.inner.caches.borrow_mut() = SemanticCaches::default();
        self.inner.cache_version.set(self.inner.tree.version());
    }

    pub(crate) fn caches(&self) -> &RefCell<SemanticCaches> {
        self.ensure_fresh();
        &self.inner.caches
    }

    /// Helpers of every fully loaded dependency, consulted for cross-tree
    /// type resolution.
    pub fn dependency_helpers(&self) -> Vec<Helpers> {
        self.inner.dependency_helpers.borrow().clone()
    }

    pub fn add_dependency_helpers(&self, helpers: Helpers) {
        if self
            .inner
            .dependency_helpers
            .borrow()
            .iter()
            .any(|h| h == &helpers)
        {
            return;
        }
        self.inner.dependency_helpers.borrow_mut().push(helpers);
    }

    /// Keep a holding tree alive until the transformation ends.
    pub fn hold(&self, tree: SourceTree) {
        self.inner.holdings.borrow_mut().push(tree);
    }

    pub(crate) fn add_pending_rule(&self, rule: PendingRule) {
        self.inner.pending.borrow_mut().push(rule);
    }

    pub(crate) fn add_transform_rule(&self, rule: TransformRule) {
        self.inner.transform_rules.borrow_mut().push(rule);
    }

    pub(crate) fn eval_state(&self) -> EvalState {
        self.inner.eval.borrow().clone()
    }

    pub(crate) fn set_eval_state(&self, state: EvalState) {
        *self.inner.eval.borrow_mut() = state;
    }

    /// The invocation currently being expanded, if any.
    pub fn invocation(&self) -> Option<Invocation> {
        self.inner.eval.borrow().invocation.clone()
    }

    pub fn context_node(&self) -> Option<SourceNode> {
        self.inner.eval.borrow().context_node.clone()
    }
}
