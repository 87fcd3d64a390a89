//! The macro script language.
//!
//! `@define` bodies compile eagerly at registration time into a small
//! expression language: string and backtick-template literals, `+`
//! concatenation, parameter references, `rest.length`, integer literals
//! and `return`. Backtick templates substitute parameter names by the
//! invocation's argument text. A single-expression body (no `;`, no
//! newline, no `return`) is implicitly wrapped as `return (body)`.

use std::sync::LazyLock;

use logos::Logos;
use regex::Regex;

use crate::error::UppError;
use crate::macros::MacroValue;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[token("return")]
    Return,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    #[regex(r"`[^`]*`")]
    Template,

    #[regex(r"[0-9]+")]
    Number,

    #[token("+")]
    Plus,

    #[token(".")]
    Dot,

    #[token(";")]
    Semi,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,
}

#[derive(Debug, Clone)]
struct Token {
    kind: Tok,
    text: String,
    at: usize,
}

#[derive(Debug, Clone)]
enum Term {
    Str(String),
    Template(String),
    Num(i64),
    Param(String),
    /// `name.length` - element count of a variadic parameter.
    Length(String),
    Paren(Box<Expr>),
}

#[derive(Debug, Clone)]
struct Expr {
    terms: Vec<Term>,
}

#[derive(Debug, Clone)]
enum Stmt {
    Return(Option<Expr>),
    Expr(Expr),
}

/// A compiled macro body.
#[derive(Debug, Clone)]
pub struct Script {
    stmts: Vec<Stmt>,
}

/// Argument bound to a formal parameter at expansion time.
#[derive(Debug, Clone)]
pub enum BoundArg {
    One(String),
    Rest(Vec<String>),
}

impl BoundArg {
    fn as_text(&self) -> String {
        match self {
            BoundArg::One(s) => s.clone(),
            BoundArg::Rest(items) => items.join(", "),
        }
    }
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Num(i64),
}

impl Value {
    fn into_text(self) -> String {
        match self {
            Value::Str(s) => s,
            Value::Num(n) => n.to_string(),
        }
    }
}

impl Script {
    /// Compile a macro body. Syntax errors surface as `UPP003`.
    pub fn compile(body: &str) -> Result<Script, UppError> {
        let tokens = lex(body)?;
        let single_expression = !tokens
            .iter()
            .any(|t| matches!(t.kind, Tok::Semi | Tok::Return));
        let mut parser = Parser { tokens, pos: 0 };
        let stmts = if single_expression && !parser.tokens.is_empty() {
            let expr = parser.expr()?;
            parser.expect_end()?;
            vec![Stmt::Return(Some(expr))]
        } else {
            parser.stmts()?
        };
        Ok(Script { stmts })
    }

    /// Run the script against bound arguments. A script without a `return`
    /// contributes nothing.
    pub fn eval(&self, env: &[(String, BoundArg)]) -> Result<MacroValue, UppError> {
        for stmt in &self.stmts {
            match stmt {
                Stmt::Return(None) => return Ok(MacroValue::Undefined),
                Stmt::Return(Some(expr)) => {
                    return Ok(MacroValue::Str(eval_expr(expr, env)?.into_text()));
                }
                Stmt::Expr(expr) => {
                    eval_expr(expr, env)?;
                }
            }
        }
        Ok(MacroValue::Undefined)
    }
}

fn lex(body: &str) -> Result<Vec<Token>, UppError> {
    let mut tokens = Vec::new();
    let mut lexer = Tok::lexer(body);
    while let Some(item) = lexer.next() {
        match item {
            Ok(kind) => tokens.push(Token {
                kind,
                text: lexer.slice().to_owned(),
                at: lexer.span().start,
            }),
            Err(()) => {
                return Err(UppError::script_syntax(format!(
                    "unexpected character at offset {}",
                    lexer.span().start
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: Tok) -> bool {
        if self.peek().map(|t| t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: Tok) -> Result<Token, UppError> {
        match self.bump() {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(UppError::script_syntax(format!(
                "expected {kind:?}, found '{}' at offset {}",
                tok.text, tok.at
            ))),
            None => Err(UppError::script_syntax(format!("expected {kind:?} at end"))),
        }
    }

    fn expect_end(&mut self) -> Result<(), UppError> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(UppError::script_syntax(format!(
                "trailing input '{}' at offset {}",
                tok.text, tok.at
            ))),
        }
    }

    fn stmts(&mut self) -> Result<Vec<Stmt>, UppError> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            if self.eat(Tok::Semi) {
                continue;
            }
            if self.eat(Tok::Return) {
                if self.peek().is_none() || self.peek().map(|t| t.kind) == Some(Tok::Semi) {
                    self.eat(Tok::Semi);
                    stmts.push(Stmt::Return(None));
                } else {
                    let expr = self.expr()?;
                    self.eat(Tok::Semi);
                    stmts.push(Stmt::Return(Some(expr)));
                }
            } else {
                let expr = self.expr()?;
                self.eat(Tok::Semi);
                stmts.push(Stmt::Expr(expr));
            }
        }
        Ok(stmts)
    }

    fn expr(&mut self) -> Result<Expr, UppError> {
        let mut terms = vec![self.term()?];
        while self.eat(Tok::Plus) {
            terms.push(self.term()?);
        }
        Ok(Expr { terms })
    }

    fn term(&mut self) -> Result<Term, UppError> {
        let Some(tok) = self.bump() else {
            return Err(UppError::script_syntax("unexpected end of macro body"));
        };
        match tok.kind {
            Tok::Str => Ok(Term::Str(unescape(&tok.text))),
            Tok::Template => {
                let inner = tok.text[1..tok.text.len() - 1].to_owned();
                Ok(Term::Template(inner))
            }
            Tok::Number => {
                let value = tok.text.parse::<i64>().map_err(|_| {
                    UppError::script_syntax(format!("bad number '{}' at offset {}", tok.text, tok.at))
                })?;
                Ok(Term::Num(value))
            }
            Tok::Ident => {
                if self.eat(Tok::Dot) {
                    let prop = self.expect(Tok::Ident)?;
                    if prop.text != "length" {
                        return Err(UppError::script_syntax(format!(
                            "unknown property '{}' at offset {}",
                            prop.text, prop.at
                        )));
                    }
                    Ok(Term::Length(tok.text))
                } else {
                    Ok(Term::Param(tok.text))
                }
            }
            Tok::LParen => {
                let expr = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(Term::Paren(Box::new(expr)))
            }
            _ => Err(UppError::script_syntax(format!(
                "unexpected '{}' at offset {}",
                tok.text, tok.at
            ))),
        }
    }
}

fn eval_expr(expr: &Expr, env: &[(String, BoundArg)]) -> Result<Value, UppError> {
    let mut acc: Option<Value> = None;
    for term in &expr.terms {
        let value = eval_term(term, env)?;
        acc = Some(match acc {
            None => value,
            Some(Value::Num(a)) => match value {
                Value::Num(b) => Value::Num(a + b),
                Value::Str(b) => Value::Str(format!("{a}{b}")),
            },
            Some(Value::Str(a)) => Value::Str(format!("{a}{}", value.into_text())),
        });
    }
    Ok(acc.unwrap_or(Value::Str(String::new())))
}

fn eval_term(term: &Term, env: &[(String, BoundArg)]) -> Result<Value, UppError> {
    match term {
        Term::Str(s) => Ok(Value::Str(s.clone())),
        Term::Num(n) => Ok(Value::Num(*n)),
        Term::Template(raw) => Ok(Value::Str(substitute(raw, env))),
        Term::Param(name) => match lookup(name, env) {
            Some(arg) => Ok(Value::Str(arg.as_text())),
            None => Err(UppError::script_syntax(format!("unknown identifier '{name}'"))),
        },
        Term::Length(name) => match lookup(name, env) {
            Some(BoundArg::Rest(items)) => Ok(Value::Num(items.len() as i64)),
            Some(BoundArg::One(_)) => Ok(Value::Num(1)),
            None => Err(UppError::script_syntax(format!("unknown identifier '{name}'"))),
        },
        Term::Paren(expr) => eval_expr(expr, env),
    }
}

fn lookup<'e>(name: &str, env: &'e [(String, BoundArg)]) -> Option<&'e BoundArg> {
    env.iter().find(|(n, _)| n == name).map(|(_, a)| a)
}

/// Replace whole-word parameter names in a backtick template by their
/// argument text.
fn substitute(raw: &str, env: &[(String, BoundArg)]) -> String {
    static WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("word regex"));
    WORD.replace_all(raw, |caps: &regex::Captures<'_>| {
        let word = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        match lookup(word, env) {
            Some(arg) => arg.as_text(),
            None => word.to_owned(),
        }
    })
    .into_owned()
}

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
