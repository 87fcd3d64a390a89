//! The macro registry.
//!
//! A registry owns its macro table and eager transform rules; the loaded
//! dependencies map, pending rules, main context, dependency helpers,
//! cache and configuration are shared by reference with the root. Child
//! registries (one per dependency) propagate macro registrations upward so
//! names become visible to the requesting file.

pub mod cache;
pub mod config;
pub mod context;
mod deps;

#[cfg(test)]
mod registry_tests;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

use upp_core::SourceTree;

use crate::error::UppError;
use crate::helpers::Helpers;
use crate::macros::builtin;
use crate::macros::{Expansion, MacroDef, MacroImpl, MacroLanguage, MacroParams, MacroValue, Script};
use crate::transform::rules::{PendingRule, TransformRule};

pub use cache::{CacheEntry, DependencyCache};
pub use config::{DiagnosticsHandle, MaterializeFn, RegistryConfig};
pub use context::Context;
pub use deps::LoadKind;

/// Registry nesting bound.
pub const MAX_DEPTH: usize = 100;

/// Per-path dependency pass tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadState {
    pub discovery: bool,
    pub full: bool,
}

pub type DeferredTask = Rc<dyn Fn(&mut Expansion<'_>) -> Result<MacroValue, UppError>>;

pub(crate) struct SharedState {
    pub(crate) config: RegistryConfig,
    pub(crate) loaded: RefCell<HashMap<PathBuf, LoadState>>,
    pub(crate) pending: Rc<RefCell<Vec<PendingRule>>>,
    pub(crate) main_context: RefCell<Option<Context>>,
    pub(crate) dependency_helpers: Rc<RefCell<Vec<Helpers>>>,
    pub(crate) deferred: RefCell<HashMap<u64, DeferredTask>>,
    next_deferred: RefCell<u64>,
}

pub(crate) struct RegistryInner {
    pub(crate) parent: Option<Registry>,
    pub(crate) depth: usize,
    pub(crate) authoritative: bool,
    pub(crate) macros: RefCell<IndexMap<String, MacroDef>>,
    pub(crate) transform_rules: Rc<RefCell<Vec<TransformRule>>>,
    pub(crate) shared: Rc<SharedState>,
    /// Context of the most recent transform driven by this registry.
    pub(crate) last_context: RefCell<Option<Context>>,
}

/// Shared handle to a registry.
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Rc<RegistryInner>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        {
            let mut diags = config.diagnostics.borrow_mut();
            for code in &config.suppress {
                diags.suppress(code.clone());
            }
        }
        let registry = Self {
            inner: Rc::new(RegistryInner {
                parent: None,
                depth: 0,
                authoritative: true,
                macros: RefCell::new(IndexMap::new()),
                transform_rules: Rc::new(RefCell::new(Vec::new())),
                shared: Rc::new(SharedState {
                    config,
                    loaded: RefCell::new(HashMap::new()),
                    pending: Rc::new(RefCell::new(Vec::new())),
                    main_context: RefCell::new(None),
                    dependency_helpers: Rc::new(RefCell::new(Vec::new())),
                    deferred: RefCell::new(HashMap::new()),
                    next_deferred: RefCell::new(1),
                }),
                last_context: RefCell::new(None),
            }),
        };
        builtin::register_builtins(&registry);
        registry
    }

    /// Child registry for a dependency transform. Shares everything except
    /// the macro table and eager transform rules.
    pub fn child(&self, authoritative: bool) -> Result<Registry, UppError> {
        let depth = self.inner.depth + 1;
        if depth > MAX_DEPTH {
            return Err(UppError::depth_exceeded(MAX_DEPTH));
        }
        let registry = Self {
            inner: Rc::new(RegistryInner {
                parent: Some(self.clone()),
                depth,
                authoritative,
                macros: RefCell::new(IndexMap::new()),
                transform_rules: Rc::new(RefCell::new(Vec::new())),
                shared: Rc::clone(&self.inner.shared),
                last_context: RefCell::new(None),
            }),
        };
        builtin::register_builtins(&registry);
        Ok(registry)
    }

    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    pub fn is_authoritative(&self) -> bool {
        self.inner.authoritative
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.shared.config
    }

    pub fn diagnostics(&self) -> DiagnosticsHandle {
        Rc::clone(&self.inner.shared.config.diagnostics)
    }

    pub(crate) fn comments(&self) -> bool {
        self.inner.shared.config.comments
    }

    // ----- macros -----------------------------------------------------------

    /// Store a macro in this registry only (builtins are pre-registered in
    /// every registry and never propagate).
    pub(crate) fn register_local(&self, def: MacroDef) {
        self.inner
            .macros
            .borrow_mut()
            .insert(def.name.clone(), def);
    }

    /// Store a macro here and forward the registration up the parent chain
    /// so the name is visible to requesting files.
    pub fn register_macro(&self, def: MacroDef) {
        self.inner
            .macros
            .borrow_mut()
            .insert(def.name.clone(), def.clone());
        if let Some(parent) = &self.inner.parent {
            parent.register_macro(def);
        }
    }

    /// Register a `@define` macro. The body compiles eagerly; a syntax
    /// error is reported (`UPP003`) without aborting other macros.
    pub fn register_script_macro(
        &self,
        name: &str,
        params: &str,
        body: &str,
        origin: &std::path::Path,
        start_index: usize,
    ) {
        let compiled = match Script::compile(body) {
            Ok(script) => Some(Rc::new(script)),
            Err(err) => {
                self.diagnostics().borrow_mut().error_at(
                    err.code(),
                    start_index..start_index + name.len(),
                    origin.to_str(),
                    format!("in macro '{name}': {err}"),
                );
                None
            }
        };
        self.register_macro(MacroDef {
            name: name.to_owned(),
            params: MacroParams::parse(params),
            body: body.to_owned(),
            language: MacroLanguage::Script,
            origin: origin.to_path_buf(),
            start_index,
            imp: MacroImpl::Script(compiled),
        });
    }

    pub fn register_native(
        &self,
        name: &str,
        params: &str,
        imp: Rc<dyn crate::macros::NativeMacro>,
    ) {
        self.register_macro(MacroDef::native(name, params, imp));
    }

    /// Registry-chain lookup.
    pub fn lookup_macro(&self, name: &str) -> Option<MacroDef> {
        if let Some(def) = self.inner.macros.borrow().get(name) {
            return Some(def.clone());
        }
        self.inner
            .parent
            .as_ref()
            .and_then(|p| p.lookup_macro(name))
    }

    /// This registry's own macro table, in registration order.
    pub fn own_macros(&self) -> Vec<MacroDef> {
        self.inner.macros.borrow().values().cloned().collect()
    }

    // ----- rules ------------------------------------------------------------

    pub fn add_pending_rule(&self, rule: PendingRule) {
        self.inner.shared.pending.borrow_mut().push(rule);
    }

    pub fn add_transform_rule(&self, rule: TransformRule) {
        self.inner.transform_rules.borrow_mut().push(rule);
    }

    pub(crate) fn pending_snapshot(&self) -> Vec<PendingRule> {
        self.inner.shared.pending.borrow().clone()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.inner.shared.pending.borrow().len()
    }

    pub(crate) fn pending_since(&self, mark: usize) -> Vec<PendingRule> {
        self.inner.shared.pending.borrow()[mark..].to_vec()
    }

    pub(crate) fn transform_rules_snapshot(&self) -> Vec<TransformRule> {
        self.inner.transform_rules.borrow().clone()
    }

    // ----- shared state -----------------------------------------------------

    pub fn main_context(&self) -> Option<Context> {
        self.inner.shared.main_context.borrow().clone()
    }

    pub(crate) fn last_context(&self) -> Option<Context> {
        self.inner.last_context.borrow().clone()
    }

    pub(crate) fn set_last_context(&self, ctx: &Context) {
        *self.inner.last_context.borrow_mut() = Some(ctx.clone());
    }

    pub(crate) fn set_main_context_if_empty(&self, ctx: &Context) {
        let mut slot = self.inner.shared.main_context.borrow_mut();
        if slot.is_none() {
            *slot = Some(ctx.clone());
        }
    }

    pub(crate) fn load_state(&self, path: &std::path::Path) -> LoadState {
        self.inner
            .shared
            .loaded
            .borrow()
            .get(path)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn mark_loaded(&self, path: &std::path::Path, kind: LoadKind) {
        let mut loaded = self.inner.shared.loaded.borrow_mut();
        let state = loaded.entry(path.to_path_buf()).or_default();
        match kind {
            LoadKind::Discovery => state.discovery = true,
            LoadKind::Full => {
                state.discovery = true;
                state.full = true;
            }
        }
    }

    /// Build helpers bound to this registry's shared rule lists.
    pub fn helpers_for(&self, tree: &SourceTree) -> Helpers {
        Helpers::new(
            tree.clone(),
            Rc::clone(&self.inner.shared.pending),
            Rc::clone(&self.inner.transform_rules),
            Rc::clone(&self.inner.shared.dependency_helpers),
        )
    }

    pub(crate) fn track_dependency_helpers(&self, helpers: Helpers) {
        let mut list = self.inner.shared.dependency_helpers.borrow_mut();
        if !list.iter().any(|h| h == &helpers) {
            list.push(helpers);
        }
    }

    // ----- deferred tasks ---------------------------------------------------

    /// Store a deferred rewrite and return the invocation text that will
    /// trigger it when the walk reaches it.
    pub fn defer(&self, task: DeferredTask) -> String {
        let id = {
            let mut next = self.inner.shared.next_deferred.borrow_mut();
            let id = *next;
            *next += 1;
            id
        };
        self.inner.shared.deferred.borrow_mut().insert(id, task);
        format!("@__deferred_task({id})")
    }

    pub(crate) fn take_deferred(&self, id: u64) -> Option<DeferredTask> {
        self.inner.shared.deferred.borrow_mut().remove(&id)
    }

    // ----- diagnostics ------------------------------------------------------

    /// Report a macro failure; the walk continues.
    pub(crate) fn report(&self, err: &UppError, origin: Option<&std::path::Path>) {
        let range = err
            .node()
            .and_then(|n| n.byte_range())
            .unwrap_or(0..0);
        let path = origin
            .or(self.inner.shared.config.file_path.as_deref())
            .and_then(|p| p.to_str())
            .map(str::to_owned);
        self.diagnostics().borrow_mut().error_at(
            err.code(),
            range,
            path.as_deref(),
            err.to_string(),
        );
    }
}
