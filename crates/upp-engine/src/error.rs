//! Engine error type.
//!
//! Errors carry an optional attached node so diagnostics can render a
//! caret into the offending source range.

use upp_core::SourceNode;

/// What went wrong.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UppErrorKind {
    /// Invocation of a name no registry in the chain knows.
    #[error("unknown macro '{0}'")]
    UnknownMacro(String),

    /// Wrong number of arguments to a macro.
    #[error("macro '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// `find_definition` could not resolve a name.
    #[error("cannot resolve '{0}'")]
    Unresolved(String),

    /// `consume` pulled a node of the wrong shape.
    #[error("{0}")]
    Consume(String),

    /// A dependency path did not resolve against any search root.
    #[error("dependency not found: {0}")]
    DependencyNotFound(String),

    /// A macro script failed at expansion time.
    #[error("macro '{name}' failed: {message}")]
    MacroRuntime { name: String, message: String },

    /// Macro body did not compile.
    #[error("macro body syntax error: {0}")]
    ScriptSyntax(String),

    /// Registry nesting exceeded the depth bound.
    #[error("registry nesting exceeds {0} levels")]
    DepthExceeded(usize),

    /// File system failure while loading a dependency.
    #[error("{0}")]
    Io(String),
}

impl UppErrorKind {
    /// Diagnostic code for this error, when one exists.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            UppErrorKind::UnknownMacro(_) => Some("UPP001"),
            UppErrorKind::Arity { .. } => Some("UPP002"),
            UppErrorKind::ScriptSyntax(_) => Some("UPP003"),
            UppErrorKind::MacroRuntime { .. } => Some("UPP004"),
            UppErrorKind::DepthExceeded(_) => Some("UPP006"),
            UppErrorKind::DependencyNotFound(_) => Some("UPP007"),
            UppErrorKind::Consume(_) => Some("UPP008"),
            UppErrorKind::Unresolved(_) | UppErrorKind::Io(_) => None,
        }
    }
}

/// Engine error with an optional attached node.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct UppError {
    kind: UppErrorKind,
    node: Option<SourceNode>,
}

impl UppError {
    pub fn new(kind: UppErrorKind) -> Self {
        Self { kind, node: None }
    }

    pub fn with_node(mut self, node: &SourceNode) -> Self {
        self.node = Some(node.clone());
        self
    }

    pub fn kind(&self) -> &UppErrorKind {
        &self.kind
    }

    pub fn node(&self) -> Option<&SourceNode> {
        self.node.as_ref()
    }

    pub fn code(&self) -> Option<&'static str> {
        self.kind.code()
    }

    pub fn unknown_macro(name: impl Into<String>) -> Self {
        Self::new(UppErrorKind::UnknownMacro(name.into()))
    }

    pub fn arity(name: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        Self::new(UppErrorKind::Arity {
            name: name.into(),
            expected: expected.into(),
            got,
        })
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::new(UppErrorKind::Unresolved(name.into()))
    }

    pub fn consume(message: impl Into<String>) -> Self {
        Self::new(UppErrorKind::Consume(message.into()))
    }

    pub fn dependency_not_found(path: impl Into<String>) -> Self {
        Self::new(UppErrorKind::DependencyNotFound(path.into()))
    }

    pub fn macro_runtime(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(UppErrorKind::MacroRuntime {
            name: name.into(),
            message: message.into(),
        })
    }

    pub fn script_syntax(message: impl Into<String>) -> Self {
        Self::new(UppErrorKind::ScriptSyntax(message.into()))
    }

    pub fn depth_exceeded(depth: usize) -> Self {
        Self::new(UppErrorKind::DepthExceeded(depth))
    }

    pub fn io(err: std::io::Error) -> Self {
        Self::new(UppErrorKind::Io(err.to_string()))
    }
}

impl From<UppErrorKind> for UppError {
    fn from(kind: UppErrorKind) -> Self {
        Self::new(kind)
    }
}
