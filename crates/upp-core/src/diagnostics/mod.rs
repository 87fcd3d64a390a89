//! Diagnostics infrastructure.
//!
//! Messages are collected into a [`Diagnostics`] bag and rendered through
//! [`DiagnosticsPrinter`]. Codes (e.g. `UPP003`) can be silenced through
//! the suppression set before they are recorded.

mod message;
mod printer;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::ops::Range;

pub use message::{DiagnosticMessage, Severity};
pub use printer::DiagnosticsPrinter;

/// Collection of diagnostic messages from preparation and transformation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    messages: Vec<DiagnosticMessage>,
    suppress: HashSet<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Silence a diagnostic code; suppressed messages are dropped at record
    /// time.
    pub fn suppress(&mut self, code: impl Into<String>) {
        self.suppress.insert(code.into());
    }

    pub fn error(
        &mut self,
        code: Option<&'static str>,
        range: Range<usize>,
        msg: impl Into<String>,
    ) {
        self.push(DiagnosticMessage::new(Severity::Error, code, range, msg));
    }

    pub fn warning(
        &mut self,
        code: Option<&'static str>,
        range: Range<usize>,
        msg: impl Into<String>,
    ) {
        self.push(DiagnosticMessage::new(Severity::Warning, code, range, msg));
    }

    pub fn error_at(
        &mut self,
        code: Option<&'static str>,
        range: Range<usize>,
        path: Option<&str>,
        msg: impl Into<String>,
    ) {
        let mut message = DiagnosticMessage::new(Severity::Error, code, range, msg);
        message.path = path.map(str::to_owned);
        self.push(message);
    }

    pub fn push(&mut self, message: DiagnosticMessage) {
        if let Some(code) = message.code() {
            if self.suppress.contains(code) {
                return;
            }
        }
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticMessage> {
        self.messages.iter()
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|d| d.is_error())
    }

    pub fn has_warnings(&self) -> bool {
        self.messages.iter().any(|d| d.is_warning())
    }

    pub fn error_count(&self) -> usize {
        self.messages.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages.iter().filter(|d| d.is_warning()).count()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for message in other.messages {
            self.push(message);
        }
    }

    pub fn printer(&self) -> DiagnosticsPrinter<'_, '_> {
        DiagnosticsPrinter::new(self)
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticMessage;
    type IntoIter = std::vec::IntoIter<DiagnosticMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
