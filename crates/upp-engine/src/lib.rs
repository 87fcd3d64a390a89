//! upp-engine: the macro transformation engine.
//!
//! - `registry` - macro tables, include graph, dependency cache, expansion
//!   driver configuration
//! - `transform` - source preparation, the node walk, pending-rule fixed
//!   point
//! - `helpers` - semantic helpers for C (scopes, definitions, references,
//!   types)
//! - `macros` - macro records, the script sandbox, built-ins, the code
//!   builder
//! - `error` - the engine error type

pub mod error;
pub mod helpers;
pub mod macros;
pub mod registry;
pub mod transform;

pub use error::{UppError, UppErrorKind};
pub use helpers::{FindOptions, FunctionSignature, Helpers, ParamDecl};
pub use macros::{
    CodeBuilder, Expansion, MacroDef, MacroLanguage, MacroParams, MacroValue, NativeMacro, Script,
};
pub use registry::{
    CacheEntry, Context, DependencyCache, DiagnosticsHandle, LoadKind, MaterializeFn, Registry,
    RegistryConfig,
};
pub use transform::prepare::{prepare_source, split_args, Invocation, Prepared};
pub use transform::rules::{PendingRule, TransformRule};
pub use transform::MAX_ITERATIONS;
