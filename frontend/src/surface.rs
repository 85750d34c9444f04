use kernel::ast::Term;
use kernel::Declaration;
use num_bigint::{BigInt, BigUint};
use std::sync::Arc;

/// Source location info
#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    /// Span covering `self` through `other`, positioned at `self`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            col: self.col,
        }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end.max(self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub kind: SyntaxKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxKind {
    List(Vec<Syntax>),
    Symbol(String),
    String(String),
    Nat(BigUint),
    /// A signed literal such as `-3` or `+3`.
    Int(BigInt),
    Hole,
}

impl Syntax {
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            SyntaxKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Syntax]> {
        match &self.kind {
            SyntaxKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn pretty_print(&self) -> String {
        match &self.kind {
            SyntaxKind::List(list) => {
                let inner: Vec<String> = list.iter().map(|s| s.pretty_print()).collect();
                format!("({})", inner.join(" "))
            }
            SyntaxKind::Symbol(s) => s.clone(),
            SyntaxKind::String(s) => format!("{:?}", s),
            SyntaxKind::Nat(n) => n.to_string(),
            SyntaxKind::Int(i) if i.sign() == num_bigint::Sign::Minus => i.to_string(),
            SyntaxKind::Int(i) => format!("+{}", i),
            SyntaxKind::Hole => "_".to_string(),
        }
    }
}

/// A top-level form of a source file, lowered to kernel terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// `def`, `theorem`, `axiom` and `fixpoint`.
    Declare(Declaration),
    /// Print the type of a term.
    Check(Arc<Term>),
    /// Print the normal form of a term.
    Eval(Arc<Term>),
}

impl Command {
    pub fn declaration(&self) -> Option<&Declaration> {
        match &self.kind {
            CommandKind::Declare(decl) => Some(decl),
            _ => None,
        }
    }
}
