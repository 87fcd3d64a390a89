//! Macro records and values.
//!
//! A macro is either a script compiled from a `@define` body or a native
//! trait object. Both expand through [`Expansion`], which exposes the
//! helper surface (consume, code builder, semantic queries, rule
//! registration) to the macro body.

pub mod builtin;
pub mod code_builder;
pub mod eval;
pub mod script;

#[cfg(test)]
mod code_builder_tests;
#[cfg(test)]
mod script_tests;

use std::path::PathBuf;
use std::rc::Rc;

use upp_core::{NodeContent, SourceNode, SourceTree};

use crate::error::UppError;

pub use code_builder::CodeBuilder;
pub use eval::{evaluate_macro, Expansion};
pub use script::Script;

/// What a macro expansion produces.
#[derive(Clone)]
pub enum MacroValue {
    /// A single node; replaces the invocation in place, morphing identity
    /// when possible.
    Node(SourceNode),
    /// A list of nodes and strings; replaces the invocation as a sequence.
    Nodes(Vec<MacroValue>),
    /// A whole tree (e.g. a holding tree from `remove`).
    Tree(SourceTree),
    /// Text, emitted verbatim (re-prepared when it contains `@`).
    Str(String),
    /// Delete the invocation.
    Null,
    /// No change; the masked invocation stays as a comment.
    Undefined,
}

impl MacroValue {
    /// Convert into insertable content. `Undefined` has no content.
    pub fn into_content(self) -> Option<NodeContent> {
        match self {
            MacroValue::Node(n) => Some(NodeContent::Node(n)),
            MacroValue::Nodes(items) => Some(NodeContent::List(
                items.into_iter().filter_map(|v| v.into_content()).collect(),
            )),
            MacroValue::Tree(t) => Some(NodeContent::Tree(t)),
            MacroValue::Str(s) => Some(NodeContent::Text(s)),
            MacroValue::Null => Some(NodeContent::Text(String::new())),
            MacroValue::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, MacroValue::Undefined)
    }
}

impl From<&str> for MacroValue {
    fn from(value: &str) -> Self {
        MacroValue::Str(value.to_owned())
    }
}

impl From<String> for MacroValue {
    fn from(value: String) -> Self {
        MacroValue::Str(value)
    }
}

impl From<SourceNode> for MacroValue {
    fn from(value: SourceNode) -> Self {
        MacroValue::Node(value)
    }
}

/// Declared parameter list; the final parameter may be the variadic marker
/// `...rest`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroParams {
    pub names: Vec<String>,
    pub variadic: bool,
}

impl MacroParams {
    /// Parse a raw parameter list such as `"fmt, ...rest"`.
    pub fn parse(raw: &str) -> Self {
        let mut names = Vec::new();
        let mut variadic = false;
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some(rest) = part.strip_prefix("...") {
                names.push(rest.to_owned());
                variadic = true;
            } else {
                names.push(part.to_owned());
            }
        }
        Self { names, variadic }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Minimum accepted argument count.
    pub fn min_args(&self) -> usize {
        if self.variadic {
            self.names.len().saturating_sub(1)
        } else {
            self.names.len()
        }
    }

    /// Whether the first formal parameter is the transformer convention
    /// (`node` receives the current context node).
    pub fn is_transformer(&self) -> bool {
        self.names.first().map(String::as_str) == Some("node")
    }
}

/// Where a macro body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroLanguage {
    Script,
    NativeInternal,
}

/// A macro implementation written against the engine API.
pub trait NativeMacro {
    fn expand(&self, exp: &mut Expansion<'_>, args: &[String]) -> Result<MacroValue, UppError>;
}

impl<F> NativeMacro for F
where
    F: Fn(&mut Expansion<'_>, &[String]) -> Result<MacroValue, UppError>,
{
    fn expand(&self, exp: &mut Expansion<'_>, args: &[String]) -> Result<MacroValue, UppError> {
        self(exp, args)
    }
}

#[derive(Clone)]
pub enum MacroImpl {
    /// Compiled script; `None` when the body failed to compile (the error
    /// was reported at registration).
    Script(Option<Rc<Script>>),
    Native(Rc<dyn NativeMacro>),
}

/// Registered macro record.
#[derive(Clone)]
pub struct MacroDef {
    pub name: String,
    pub params: MacroParams,
    pub body: String,
    pub language: MacroLanguage,
    pub origin: PathBuf,
    pub start_index: usize,
    pub imp: MacroImpl,
}

impl MacroDef {
    pub fn native(name: &str, params: &str, imp: Rc<dyn NativeMacro>) -> Self {
        Self {
            name: name.to_owned(),
            params: MacroParams::parse(params),
            body: String::new(),
            language: MacroLanguage::NativeInternal,
            origin: PathBuf::new(),
            start_index: 0,
            imp: MacroImpl::Native(imp),
        }
    }
}
