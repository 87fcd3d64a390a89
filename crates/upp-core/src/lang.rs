//! Parser adapter over the tree-sitter C grammar.
//!
//! The engine only ever needs "parse this string as C"; everything richer
//! (node kinds, fields, ranges) is read off the resulting tree. `Lang` is a
//! cheap cloneable handle so trees and fragments can re-parse without
//! threading a parser around.

use std::sync::{Arc, LazyLock};

use arborium_tree_sitter::{Language, Tree};

/// User-facing language handle.
pub type Lang = Arc<LangInner>;

/// Language implementation: name plus the tree-sitter grammar.
pub struct LangInner {
    name: &'static str,
    ts_lang: Language,
}

impl LangInner {
    fn new(name: &'static str, ts_lang: Language) -> Self {
        Self { name, ts_lang }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Parse source code into a tree-sitter tree.
    pub fn parse(&self, source: &str) -> Tree {
        let mut parser = arborium_tree_sitter::Parser::new();
        parser
            .set_language(&self.ts_lang)
            .expect("failed to set language");
        parser.parse(source, None).expect("failed to parse source")
    }
}

impl std::fmt::Debug for LangInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lang").field("name", &self.name).finish()
    }
}

/// The C language.
pub fn c() -> Lang {
    static LANG: LazyLock<Lang> =
        LazyLock::new(|| Arc::new(LangInner::new("c", arborium_c::language().into())));
    Arc::clone(&LANG)
}
