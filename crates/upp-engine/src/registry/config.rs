//! Registry configuration.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use upp_core::Diagnostics;

use super::cache::DependencyCache;

/// Callback for every file to be emitted: path, final text, authority flag.
pub type MaterializeFn = Rc<dyn Fn(&Path, &str, bool)>;

/// Shared diagnostics sink.
pub type DiagnosticsHandle = Rc<RefCell<Diagnostics>>;

/// Options recognized by [`super::Registry::new`].
#[derive(Clone)]
pub struct RegistryConfig {
    pub on_materialize: Option<MaterializeFn>,
    /// Current file, for diagnostics.
    pub file_path: Option<PathBuf>,
    /// Root for searching standard headers.
    pub std_path: PathBuf,
    /// Extra search roots for `@include`.
    pub include_paths: Vec<PathBuf>,
    pub cache: Option<DependencyCache>,
    pub diagnostics: DiagnosticsHandle,
    /// Diagnostic codes to silence.
    pub suppress: Vec<String>,
    /// Preserve removed `@define` spans as block comments.
    pub comments: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let std_path = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("std");
        Self {
            on_materialize: None,
            file_path: None,
            std_path,
            include_paths: Vec::new(),
            cache: None,
            diagnostics: Rc::new(RefCell::new(Diagnostics::new())),
            suppress: Vec::new(),
            comments: false,
        }
    }
}

impl RegistryConfig {
    pub fn with_materialize(mut self, f: MaterializeFn) -> Self {
        self.on_materialize = Some(f);
        self
    }

    pub fn with_cache(mut self, cache: DependencyCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_std_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.std_path = path.into();
        self
    }

    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }
}
