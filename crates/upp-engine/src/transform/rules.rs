//! Rewrite rules.
//!
//! Transform rules run eagerly against every node the walk visits. Pending
//! rules are deferred: they re-fire against newly inserted nodes until the
//! fixed-point sweep settles, at most once per node identity (tracked in
//! the context's applied-rules map).

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use upp_core::SourceNode;

use crate::error::UppError;
use crate::helpers::Helpers;
use crate::macros::MacroValue;

pub type RuleMatcher = Rc<dyn Fn(&SourceNode, &Helpers) -> bool>;
pub type RuleAction = Rc<dyn Fn(&SourceNode, &Helpers) -> Result<MacroValue, UppError>>;

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_rule_id() -> u64 {
    NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Eagerly evaluated rule, checked on every visited node.
#[derive(Clone)]
pub struct TransformRule {
    pub active: Rc<Cell<bool>>,
    pub matcher: RuleMatcher,
    pub action: RuleAction,
}

impl TransformRule {
    pub fn new(matcher: RuleMatcher, action: RuleAction) -> Self {
        Self {
            active: Rc::new(Cell::new(true)),
            matcher,
            action,
        }
    }
}

/// Deferred rule, evaluated against newly inserted nodes until fixed point.
#[derive(Clone)]
pub struct PendingRule {
    pub id: u64,
    pub matcher: RuleMatcher,
    pub action: RuleAction,
    /// Node that was current when the rule was registered.
    pub context_node: Option<SourceNode>,
}

impl PendingRule {
    pub fn new(matcher: RuleMatcher, action: RuleAction, context_node: Option<SourceNode>) -> Self {
        Self {
            id: next_rule_id(),
            matcher,
            action,
            context_node,
        }
    }
}
