//! Macro evaluation.
//!
//! Resolves the macro through the registry chain, enforces arity, installs
//! the helper context fields for the duration of the call, and dispatches
//! to the native implementation or the compiled script.

use std::path::Path;

use upp_core::SourceNode;

use crate::error::UppError;
use crate::helpers::Helpers;
use crate::macros::script::BoundArg;
use crate::macros::{CodeBuilder, MacroDef, MacroImpl, MacroValue};
use crate::registry::{Context, Registry};
use crate::transform::prepare::Invocation;

/// The surface a native macro sees while expanding.
pub struct Expansion<'a> {
    registry: &'a Registry,
    context: &'a Context,
    helpers: &'a Helpers,
    invocation: Invocation,
    /// The masked comment node carrying the invocation.
    node: Option<SourceNode>,
}

impl<'a> Expansion<'a> {
    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    pub fn helpers(&self) -> &Helpers {
        self.helpers
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn node(&self) -> Option<&SourceNode> {
        self.node.as_ref()
    }

    pub fn origin(&self) -> &Path {
        self.context.origin()
    }

    /// Template-style code assembly preserving node identity.
    pub fn code(&self) -> CodeBuilder {
        CodeBuilder::new(self.helpers.clone())
    }

    /// Store a deferred rewrite; the returned invocation text triggers it
    /// when the walk reaches it.
    pub fn defer(
        &self,
        task: impl Fn(&mut Expansion<'_>) -> Result<MacroValue, UppError> + 'static,
    ) -> String {
        self.registry.defer(std::rc::Rc::new(task))
    }

    /// Pull the next logical node after the invocation out of the tree.
    ///
    /// The node's identifiers are captured and the node is removed (unless
    /// it physically contains the invocation itself); repeated calls
    /// advance the cursor.
    pub fn consume(&mut self, expected: Option<&str>) -> Result<SourceNode, UppError> {
        let state = self.helpers.eval_state();
        let cursor = state.consume_cursor.unwrap_or(self.invocation.end);

        let anchor = self
            .node
            .clone()
            .filter(|n| n.is_valid())
            .or_else(|| {
                let tree = self.helpers.tree();
                tree.root()?.descendant_for_range(cursor, cursor)
            })
            .ok_or_else(|| UppError::consume("nothing to consume"))?;

        let node = next_logical(&anchor, cursor)
            .ok_or_else(|| UppError::consume("no node follows the invocation"))?;

        if let Some(kind) = expected {
            if node.kind() != kind {
                return Err(UppError::consume(format!(
                    "macro '{}' expected a {kind} here, found {}",
                    self.invocation.name,
                    node.kind()
                ))
                .with_node(&node));
            }
        }

        node.capture_identifiers();
        let start = node.start().max(0) as usize;
        let contains_invocation = self
            .node
            .as_ref()
            .map(|c| &node == c || node.is_ancestor_of(c))
            .unwrap_or(false);
        if !contains_invocation {
            let holding = node.remove();
            self.helpers.hold(holding);
        }

        let mut state = self.helpers.eval_state();
        state.last_consumed = Some(node.clone());
        state.consume_cursor = Some(start);
        self.helpers.set_eval_state(state);
        Ok(node)
    }
}

/// The next named, non-comment node at or after `min_start`, found by a
/// next-sibling-then-parent walk.
fn next_logical(from: &SourceNode, min_start: usize) -> Option<SourceNode> {
    let mut cur = from.clone();
    loop {
        let mut sibling = cur.next_named_sibling();
        while let Some(s) = sibling {
            if s.start() >= min_start as isize && s.kind() != "comment" {
                return Some(s);
            }
            sibling = s.next_named_sibling();
        }
        cur = cur.parent()?;
    }
}

/// Evaluate one masked invocation against its macro.
pub fn evaluate_macro(
    registry: &Registry,
    context: &Context,
    helpers: &Helpers,
    invocation: &Invocation,
    node: &SourceNode,
) -> Result<MacroValue, UppError> {
    let def = registry
        .lookup_macro(&invocation.name)
        .ok_or_else(|| UppError::unknown_macro(&invocation.name).with_node(node))?;

    check_arity(&def, invocation.args.len()).map_err(|e| e.with_node(node))?;

    let saved = helpers.eval_state();
    let mut state = saved.clone();
    state.invocation = Some(invocation.clone());
    state.context_node = Some(node.clone());
    state.last_consumed = None;
    state.active_transform_node = Some(node.clone());
    state.consume_cursor = Some(node.end().max(0) as usize);
    helpers.set_eval_state(state);

    let result = dispatch(&def, registry, context, helpers, invocation, node);

    helpers.set_eval_state(saved);
    result.map_err(|e| match e.node() {
        Some(_) => e,
        None => e.with_node(node),
    })
}

fn dispatch(
    def: &MacroDef,
    registry: &Registry,
    context: &Context,
    helpers: &Helpers,
    invocation: &Invocation,
    node: &SourceNode,
) -> Result<MacroValue, UppError> {
    match &def.imp {
        MacroImpl::Native(imp) => {
            let mut exp = Expansion {
                registry,
                context,
                helpers,
                invocation: invocation.clone(),
                node: Some(node.clone()),
            };
            imp.expand(&mut exp, &invocation.args)
        }
        MacroImpl::Script(Some(script)) => {
            let env = bind_script_env(def, node, &invocation.args);
            script.eval(&env).map_err(|e| {
                UppError::macro_runtime(&def.name, e.to_string()).with_node(node)
            })
        }
        // The body failed to compile; that was reported at registration.
        MacroImpl::Script(None) => Ok(MacroValue::Undefined),
    }
}

fn check_arity(def: &MacroDef, got: usize) -> Result<(), UppError> {
    let transformer = def.params.is_transformer();
    let formal = def.params.len().saturating_sub(transformer as usize);
    if def.params.variadic {
        let min = formal.saturating_sub(1);
        if got < min {
            return Err(UppError::arity(&def.name, format!("at least {min}"), got));
        }
    } else if got != formal {
        return Err(UppError::arity(&def.name, formal.to_string(), got));
    }
    Ok(())
}

fn bind_script_env(
    def: &MacroDef,
    node: &SourceNode,
    args: &[String],
) -> Vec<(String, BoundArg)> {
    let mut env = Vec::with_capacity(def.params.len());
    let mut names = def.params.names.iter();
    if def.params.is_transformer() {
        if let Some(name) = names.next() {
            env.push((name.clone(), BoundArg::One(node.text())));
        }
    }
    let names: Vec<&String> = names.collect();
    let positional = if def.params.variadic {
        names.len().saturating_sub(1)
    } else {
        names.len()
    };
    for (i, name) in names.iter().take(positional).enumerate() {
        env.push((
            (*name).clone(),
            BoundArg::One(args.get(i).cloned().unwrap_or_default()),
        ));
    }
    if def.params.variadic {
        if let Some(rest_name) = names.last() {
            let rest: Vec<String> = args.iter().skip(positional).cloned().collect();
            env.push(((*rest_name).clone(), BoundArg::Rest(rest)));
        }
    }
    env
}
