//! Dependency loading.
//!
//! Two passes are tracked per target path. A discovery pass registers
//! macros and enumerates includes without transforming; a full pass
//! transforms end-to-end through a child registry and materializes
//! `.hup`/`.cup` targets. `full` subsumes `discovery`; repeats of either
//! are no-ops. The cache is consulted for full passes only, and only
//! authoritative entries replay.

use std::path::{Path, PathBuf};

use crate::error::UppError;
use crate::registry::cache::CacheEntry;
use crate::registry::Registry;
use crate::transform::prepare;

/// Which pass a dependency load performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Discovery,
    Full,
}

/// Strip one layer of quotes from an include argument.
pub(crate) fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('<').and_then(|s| s.strip_suffix('>')))
        .unwrap_or(raw)
}

/// Materialization target for generated suffixes.
pub(crate) fn materialize_target(path: &Path) -> Option<PathBuf> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("hup") => Some(path.with_extension("h")),
        Some("cup") => Some(path.with_extension("c")),
        _ => None,
    }
}

impl Registry {
    /// Resolve a dependency reference: absolute as-is, then relative to the
    /// origin's directory, then the include paths, then the std path.
    pub fn resolve_dependency(&self, target: &str, origin: &Path) -> Result<PathBuf, UppError> {
        let target = unquote(target);
        let candidate = Path::new(target);
        if candidate.is_absolute() {
            if candidate.is_file() {
                return Ok(candidate.to_path_buf());
            }
            return Err(UppError::dependency_not_found(target));
        }
        let mut roots: Vec<PathBuf> = Vec::new();
        if let Some(dir) = origin.parent() {
            roots.push(dir.to_path_buf());
        }
        roots.extend(self.config().include_paths.iter().cloned());
        roots.push(self.config().std_path.clone());
        for root in roots {
            let joined = root.join(target);
            if joined.is_file() {
                return Ok(joined);
            }
        }
        Err(UppError::dependency_not_found(target))
    }

    /// Load a dependency. Returns the resolved path so callers (the
    /// `include` builtin) can shape the emitted directive.
    pub fn load_dependency(
        &self,
        target: &str,
        origin: &Path,
        kind: LoadKind,
    ) -> Result<PathBuf, UppError> {
        let path = self.resolve_dependency(target, origin)?;
        let state = self.load_state(&path);
        match kind {
            LoadKind::Discovery if state.discovery || state.full => return Ok(path),
            LoadKind::Full if state.full => return Ok(path),
            _ => {}
        }
        // Mark before descending so include cycles terminate.
        self.mark_loaded(&path, kind);

        match kind {
            LoadKind::Discovery => self.load_discovery(&path)?,
            LoadKind::Full => self.load_full(&path)?,
        }
        Ok(path)
    }

    /// Parse and prepare without transforming: seed the macro namespace and
    /// chase nested includes.
    fn load_discovery(&self, path: &Path) -> Result<(), UppError> {
        let source = std::fs::read_to_string(path).map_err(UppError::io)?;
        let prepared = prepare::prepare_source(&source, &upp_core::c(), self.comments());
        for def in &prepared.defines {
            self.register_script_macro(&def.name, &def.params, &def.body, path, def.index);
        }
        for inv in &prepared.invocations {
            if inv.name == "include" {
                if let Some(arg) = inv.args.first() {
                    self.load_dependency(arg, path, LoadKind::Discovery)?;
                }
            }
        }
        Ok(())
    }

    /// Transform end-to-end through a child registry, track its helpers for
    /// cross-tree resolution, materialize and cache.
    fn load_full(&self, path: &Path) -> Result<(), UppError> {
        if let Some(cache) = &self.config().cache {
            if let Some(entry) = cache.get(path) {
                if entry.authoritative {
                    self.replay(&entry);
                    return Ok(());
                }
            }
        }

        let source = std::fs::read_to_string(path).map_err(UppError::io)?;
        let child = self.child(true)?;
        let pending_mark = self.pending_len();
        let output = child.transform_with(&source, path, self.main_context().as_ref())?;

        if let Some(helpers) = child_helpers(&child, path) {
            self.track_dependency_helpers(helpers);
        }

        let materialize_to = materialize_target(path);
        if let (Some(out), Some(hook)) = (&materialize_to, &self.config().on_materialize) {
            hook(out, &output, child.is_authoritative());
        }

        if let Some(cache) = &self.config().cache {
            cache.store(
                path,
                CacheEntry {
                    macros: child.own_macros(),
                    pending_rules: self.pending_since(pending_mark),
                    output,
                    materialize_to,
                    authoritative: child.is_authoritative(),
                },
            );
        }
        Ok(())
    }

    /// Re-register a cached dependency's contribution and re-issue its
    /// materialization.
    fn replay(&self, entry: &CacheEntry) {
        for def in &entry.macros {
            self.register_macro(def.clone());
        }
        for rule in &entry.pending_rules {
            self.add_pending_rule(rule.clone());
        }
        if let (Some(out), Some(hook)) = (&entry.materialize_to, &self.config().on_materialize) {
            hook(out, &entry.output, entry.authoritative);
        }
    }
}

/// The helpers of a finished child transform, keyed off its context.
fn child_helpers(child: &Registry, path: &Path) -> Option<crate::helpers::Helpers> {
    let ctx = child.last_context()?;
    if ctx.origin() == path {
        ctx.helpers()
    } else {
        None
    }
}
