//! Registry, cache and macro-table tests.

use std::path::Path;
use std::rc::Rc;

use crate::macros::{Expansion, MacroParams, MacroValue};
use crate::registry::cache::{CacheEntry, DependencyCache};
use crate::registry::{Registry, RegistryConfig, MAX_DEPTH};

#[test]
fn builtins_are_preregistered() {
    let registry = Registry::new(RegistryConfig::default());
    assert!(registry.lookup_macro("include").is_some());
    assert!(registry.lookup_macro("implements").is_some());
    assert!(registry.lookup_macro("__deferred_task").is_some());
}

#[test]
fn script_macros_register_and_compile_eagerly() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_script_macro("greet", "name", "`name`", Path::new("a.cup"), 0);
    let def = registry.lookup_macro("greet").expect("registered");
    assert_eq!(def.params, MacroParams::parse("name"));
    assert!(!registry.diagnostics().borrow().has_errors());
}

#[test]
fn bad_script_bodies_report_upp003_without_aborting() {
    let registry = Registry::new(RegistryConfig::default());
    registry.register_script_macro("bad", "", "return )", Path::new("a.cup"), 0);
    let diags = registry.diagnostics();
    assert!(diags.borrow().has_errors());
    assert!(diags.borrow().iter().any(|d| d.code() == Some("UPP003")));
    // The macro still exists; expanding it just contributes nothing.
    assert!(registry.lookup_macro("bad").is_some());
}

#[test]
fn child_registrations_propagate_upward() {
    let parent = Registry::new(RegistryConfig::default());
    let child = parent.child(true).expect("child");
    child.register_script_macro("shared", "", "`1`", Path::new("b.hup"), 0);
    assert!(parent.lookup_macro("shared").is_some());
    assert!(child.lookup_macro("shared").is_some());
}

#[test]
fn children_see_parent_macros() {
    let parent = Registry::new(RegistryConfig::default());
    parent.register_script_macro("above", "", "`1`", Path::new("a.cup"), 0);
    let child = parent.child(true).expect("child");
    assert!(child.lookup_macro("above").is_some());
}

#[test]
fn registry_depth_is_bounded() {
    let mut registry = Registry::new(RegistryConfig::default());
    for _ in 0..MAX_DEPTH {
        registry = registry.child(true).expect("within bound");
    }
    assert!(registry.child(true).is_err());
}

#[test]
fn cache_writes_are_monotonic_in_authority() {
    let cache = DependencyCache::new();
    let path = Path::new("/dep/b.hup");
    let entry = |text: &str, authoritative| CacheEntry {
        macros: Vec::new(),
        pending_rules: Vec::new(),
        output: text.to_owned(),
        materialize_to: None,
        authoritative,
    };

    assert!(cache.store(path, entry("discovery", false)));
    assert!(cache.store(path, entry("full", true)));
    // Non-authoritative entries never overwrite authoritative ones.
    assert!(!cache.store(path, entry("late discovery", false)));
    let stored = cache.get(path).expect("entry");
    assert!(stored.authoritative);
    assert_eq!(stored.output, "full");
}

#[test]
fn deferred_tasks_run_once() {
    let registry = Registry::new(RegistryConfig::default());
    let text = registry.defer(Rc::new(|_exp: &mut Expansion<'_>| {
        Ok(MacroValue::Str("done".into()))
    }));
    assert!(text.starts_with("@__deferred_task("));
    let id: u64 = text
        .trim_start_matches("@__deferred_task(")
        .trim_end_matches(')')
        .parse()
        .expect("id");
    assert!(registry.take_deferred(id).is_some());
    assert!(registry.take_deferred(id).is_none());
}
