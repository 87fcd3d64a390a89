//! Dependency cache.
//!
//! Keyed by absolute path. An entry stores the macros and pending rules a
//! file registered, its transformed output, and where it materializes.
//! Writes are monotonic in authority: a discovery-only (non-authoritative)
//! entry never overwrites an authoritative one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::macros::MacroDef;
use crate::transform::rules::PendingRule;

/// Cached result of loading one dependency.
#[derive(Clone)]
pub struct CacheEntry {
    pub macros: Vec<MacroDef>,
    pub pending_rules: Vec<PendingRule>,
    pub output: String,
    /// Materialization target, when the dependency emits a file.
    pub materialize_to: Option<PathBuf>,
    pub authoritative: bool,
}

/// Shared in-process cache of loaded dependencies.
#[derive(Clone, Default)]
pub struct DependencyCache {
    entries: Rc<RefCell<HashMap<PathBuf, CacheEntry>>>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<CacheEntry> {
        self.entries.borrow().get(path).cloned()
    }

    /// Store an entry unless a more authoritative one is already present.
    /// Returns whether the entry was written.
    pub fn store(&self, path: &Path, entry: CacheEntry) -> bool {
        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries.get(path) {
            if existing.authoritative && !entry.authoritative {
                return false;
            }
        }
        entries.insert(path.to_path_buf(), entry);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.borrow().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
