//! Built-in macros, pre-registered in every registry.

use std::rc::Rc;

use crate::error::UppError;
use crate::macros::{Expansion, MacroDef, MacroValue};
use crate::registry::{LoadKind, Registry};

pub(crate) fn register_builtins(registry: &Registry) {
    registry.register_local(MacroDef::native("include", "file", Rc::new(include)));
    registry.register_local(MacroDef::native("implements", "pkg", Rc::new(implements)));
    registry.register_local(MacroDef::native(
        "__deferred_task",
        "id",
        Rc::new(deferred_task),
    ));
}

/// `@include("file")`: load the dependency. Header-like targets (`.hup`)
/// expand to the `#include` directive for their companion `.h`.
fn include(exp: &mut Expansion<'_>, args: &[String]) -> Result<MacroValue, UppError> {
    let arg = args.first().cloned().unwrap_or_default();
    let origin = exp.origin().to_path_buf();
    let path = exp.registry().load_dependency(&arg, &origin, LoadKind::Full)?;
    if path.extension().and_then(|e| e.to_str()) == Some("hup") {
        let header = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| format!("{s}.h"))
            .unwrap_or_else(|| "?.h".to_owned());
        return Ok(MacroValue::Str(format!("#include \"{header}\"")));
    }
    Ok(MacroValue::Null)
}

/// `@implements(pkg)`: marker for downstream policies; expands to nothing
/// and leaves the masked comment in place.
fn implements(_exp: &mut Expansion<'_>, _args: &[String]) -> Result<MacroValue, UppError> {
    Ok(MacroValue::Undefined)
}

/// `@__deferred_task(id)`: run the deferred rewrite stored under `id`.
fn deferred_task(exp: &mut Expansion<'_>, args: &[String]) -> Result<MacroValue, UppError> {
    let task = args
        .first()
        .and_then(|a| a.trim().parse::<u64>().ok())
        .and_then(|id| exp.registry().take_deferred(id));
    match task {
        Some(task) => task(exp),
        None => Ok(MacroValue::Undefined),
    }
}
