//! Source preparation: the pure phase that turns annotated source into
//! parseable C.
//!
//! `@define` blocks are extracted (brace-balanced, comment/string/escape
//! aware) and their spans replaced by line-structure-preserving whitespace
//! or a block-comment passthrough. `@name(args)` invocations are then
//! discovered - skipping comments, string/char literals and system-header
//! brackets - and wrapped in `/*...*/` so the parser produces a comment
//! node at each invocation site.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use upp_core::{Lang, SourceNode, SourceTree};

static DEFINE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*@define\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)\s*\{")
        .expect("define head regex")
});

static INVOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").expect("invocation regex"));

/// One extracted `@define` block.
#[derive(Debug, Clone)]
pub struct DefineBlock {
    /// Byte offset of the block in the raw source.
    pub index: usize,
    /// Length of the full span, head through closing brace.
    pub full_len: usize,
    pub name: String,
    pub params: String,
    pub body: String,
}

/// One discovered `@name(args)` occurrence.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
    /// Byte range of the masking comment in the clean source.
    pub start: usize,
    pub end: usize,
    /// 1-based position of the `@` in the de-defined source.
    pub line: usize,
    pub col: usize,
    /// The comment node carrying the masked invocation, filled in once the
    /// clean source is parsed.
    pub node: Rc<RefCell<Option<SourceNode>>>,
}

/// Result of source preparation.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// The masked source: `@define` spans neutralized, invocations wrapped
    /// in comments.
    pub clean: String,
    pub defines: Vec<DefineBlock>,
    pub invocations: Vec<Invocation>,
}

/// Prepare annotated source. Pure: macro registration and include loading
/// are the registry's side-effect phase.
pub fn prepare_source(source: &str, lang: &Lang, comments: bool) -> Prepared {
    let raw_tree = SourceTree::new(source, lang.clone());
    let defines = extract_defines(source, &raw_tree);
    let dedefined = blank_defines(source, &defines, comments);

    let clean_tree = SourceTree::new(&dedefined, lang.clone());
    let spans = scan_invocations(&dedefined, &clean_tree);
    let (clean, invocations) = mask_invocations(&dedefined, spans);

    Prepared {
        clean,
        defines,
        invocations,
    }
}

/// Parse the inside of a masking comment (`@name` or `@name(args)`).
pub fn parse_invocation_text(text: &str) -> Option<(String, Vec<String>)> {
    let inner = text.strip_prefix("/*")?.strip_suffix("*/")?;
    let inner = inner.trim();
    let rest = inner.strip_prefix('@')?;
    let name_len = rest
        .char_indices()
        .take_while(|(i, c)| {
            if *i == 0 {
                c.is_ascii_alphabetic() || *c == '_'
            } else {
                c.is_ascii_alphanumeric() || *c == '_'
            }
        })
        .count();
    if name_len == 0 {
        return None;
    }
    let name = rest[..name_len].to_owned();
    let tail = rest[name_len..].trim_start();
    let args = match tail.strip_prefix('(') {
        Some(arg_tail) => match arg_tail.find(')') {
            Some(close) => split_args(&arg_tail[..close]),
            None => return None,
        },
        None if tail.is_empty() => Vec::new(),
        None => return None,
    };
    Some((name, args))
}

/// Split an argument list on commas; fragments are trimmed, empty ones
/// dropped, quoted literals keep their quotes.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Node kinds where an `@` can never start an invocation.
fn is_ignored_kind(kind: &str) -> bool {
    matches!(
        kind,
        "comment"
            | "string_literal"
            | "string_content"
            | "char_literal"
            | "character"
            | "escape_sequence"
            | "system_lib_string"
    )
}

fn position_ignored(tree: &SourceTree, pos: usize) -> bool {
    let Some(root) = tree.root() else {
        return false;
    };
    let Some(node) = root.descendant_for_range(pos, pos + 1) else {
        return false;
    };
    if is_ignored_kind(node.kind()) {
        return true;
    }
    node.ancestors().iter().any(|a| is_ignored_kind(a.kind()))
}

fn extract_defines(source: &str, raw_tree: &SourceTree) -> Vec<DefineBlock> {
    let mut defines = Vec::new();
    let mut resume_at = 0usize;
    for caps in DEFINE_HEAD.captures_iter(source) {
        let whole = caps.get(0).expect("whole match");
        if whole.start() < resume_at {
            continue;
        }
        let at = whole
            .as_str()
            .find('@')
            .map(|o| whole.start() + o)
            .unwrap_or(whole.start());
        if position_ignored(raw_tree, at) {
            continue;
        }
        let open = whole.end() - 1;
        let Some(close) = matching_brace(source, open) else {
            continue;
        };
        defines.push(DefineBlock {
            index: whole.start(),
            full_len: close + 1 - whole.start(),
            name: caps[1].to_owned(),
            params: caps[2].to_owned(),
            body: source[open + 1..close].to_owned(),
        });
        resume_at = close + 1;
    }
    defines
}

/// Find the `}` matching the `{` at `open`, respecting line/block comments,
/// string/char literals, backtick templates, and backslash escapes.
fn matching_brace(source: &str, open: usize) -> Option<usize> {
    #[derive(PartialEq)]
    enum State {
        Normal,
        LineComment,
        BlockComment,
        Str,
        Char,
        Template,
    }
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut state = State::Normal;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match state {
            State::Normal => match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                b'"' => state = State::Str,
                b'\'' => state = State::Char,
                b'`' => state = State::Template,
                _ => {}
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    state = State::Normal;
                    i += 1;
                }
            }
            State::Str => match b {
                b'\\' => i += 1,
                b'"' => state = State::Normal,
                _ => {}
            },
            State::Char => match b {
                b'\\' => i += 1,
                b'\'' => state = State::Normal,
                _ => {}
            },
            State::Template => {
                if b == b'`' {
                    state = State::Normal;
                }
            }
        }
        i += 1;
    }
    None
}

/// Neutralize the define spans: equal-length whitespace that preserves line
/// structure, or a block-comment passthrough when `comments` is set.
fn blank_defines(source: &str, defines: &[DefineBlock], comments: bool) -> String {
    let mut out: Vec<u8> = source.as_bytes().to_vec();
    for def in defines {
        let span = def.index..def.index + def.full_len;
        if comments && def.full_len >= 4 {
            for i in span.clone() {
                // Close-delimiters inside the body would terminate the
                // passthrough comment early.
                if out[i] == b'/' && i > span.start && out[i - 1] == b'*' {
                    out[i] = b' ';
                }
            }
            out[span.start] = b'/';
            out[span.start + 1] = b'*';
            out[span.end - 2] = b'*';
            out[span.end - 1] = b'/';
        } else {
            for i in span {
                if out[i] != b'\n' {
                    out[i] = b' ';
                }
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| source.to_owned())
}

struct InvocationSpan {
    start: usize,
    end: usize,
    name: String,
    args: Vec<String>,
}

fn scan_invocations(source: &str, clean_tree: &SourceTree) -> Vec<InvocationSpan> {
    let bytes = source.as_bytes();
    let mut spans: Vec<InvocationSpan> = Vec::new();
    for caps in INVOCATION.captures_iter(source) {
        let whole = caps.get(0).expect("whole match");
        let at = whole.start();
        if let Some(last) = spans.last() {
            if at < last.end {
                continue;
            }
        }
        // No invocation directly after a comment opener or closer.
        if at > 0 && matches!(bytes[at - 1], b'/' | b'*') {
            continue;
        }
        if position_ignored(clean_tree, at) {
            continue;
        }
        let name = caps[1].to_owned();
        if name == "define" {
            continue;
        }
        let mut end = whole.end();
        let mut args = Vec::new();
        let mut j = end;
        while j < bytes.len() && (bytes[j] as char).is_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'(' {
            if let Some(close_rel) = source[j + 1..].find(')') {
                let close = j + 1 + close_rel;
                args = split_args(&source[j + 1..close]);
                end = close + 1;
            }
        }
        spans.push(InvocationSpan {
            start: at,
            end,
            name,
            args,
        });
    }
    spans
}

/// Wrap each invocation span in `/*...*/`, tracking the masked positions.
fn mask_invocations(source: &str, spans: Vec<InvocationSpan>) -> (String, Vec<Invocation>) {
    let mut out = String::with_capacity(source.len() + spans.len() * 4);
    let mut invocations = Vec::with_capacity(spans.len());
    let mut copied = 0usize;
    for span in spans {
        out.push_str(&source[copied..span.start]);
        let masked_start = out.len();
        out.push_str("/*");
        out.push_str(&source[span.start..span.end]);
        out.push_str("*/");
        let masked_end = out.len();
        copied = span.end;

        let (line, col) = line_col(source, span.start);
        invocations.push(Invocation {
            name: span.name,
            args: span.args,
            start: masked_start,
            end: masked_end,
            line,
            col,
            node: Rc::new(RefCell::new(None)),
        });
    }
    out.push_str(&source[copied..]);
    (out, invocations)
}

pub(crate) fn line_col(source: &str, pos: usize) -> (usize, usize) {
    let before = &source[..pos.min(source.len())];
    let line = before.bytes().filter(|&b| b == b'\n').count() + 1;
    let col = pos - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
    (line, col)
}
