//! Lowering of S-expressions to kernel terms and top-level commands.
//!
//! Names bound by an enclosing `fun`, `pi`, `let` or `fix` become variables;
//! every other name refers to a global constant and is resolved by the kernel.

use crate::parser::{ParseError, Parser};
use crate::surface::{Command, CommandKind, Span, Syntax, SyntaxKind};
use kernel::ast::{Level, Name, Term};
use kernel::config::default_max_depth;
use kernel::Declaration;
use std::sync::Arc;
use thiserror::Error;

const KEYWORDS: &[&str] = &[
    "fun", "lambda", "pi", "forall", "->", "let", "fix", ":", "Sort", "def", "theorem", "axiom",
    "fixpoint", "check", "eval",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationParseError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("malformed `{form}`: expected {expected}")]
    Malformed {
        form: String,
        expected: &'static str,
        span: Span,
    },
    #[error("`{0}` is a keyword and cannot be used here")]
    Keyword(String, Span),
    #[error("unknown command `{0}`")]
    UnknownCommand(String, Span),
    #[error("expected a top-level command, found `{0}`")]
    NotACommand(String, Span),
    #[error("universe level `{0}` is too large")]
    LevelTooLarge(String, Span),
    #[error("term nested deeper than {max_depth}")]
    TooDeep { max_depth: usize, span: Span },
}

impl DeclarationParseError {
    pub fn span(&self) -> Span {
        match self {
            DeclarationParseError::Parse(err) => err.span(),
            DeclarationParseError::Malformed { span, .. }
            | DeclarationParseError::Keyword(_, span)
            | DeclarationParseError::UnknownCommand(_, span)
            | DeclarationParseError::NotACommand(_, span)
            | DeclarationParseError::LevelTooLarge(_, span)
            | DeclarationParseError::TooDeep { span, .. } => *span,
        }
    }
}

type Result<T> = std::result::Result<T, DeclarationParseError>;

fn malformed(form: &str, expected: &'static str, span: Span) -> DeclarationParseError {
    DeclarationParseError::Malformed {
        form: form.to_string(),
        expected,
        span,
    }
}

/// Parse and lower a whole source file.
pub fn parse_program(source: &str) -> Result<Vec<Command>> {
    parse_program_with_depth(source, default_max_depth())
}

/// [`parse_program`] with a bound on both list nesting and the depth of the
/// lowered terms.
pub fn parse_program_with_depth(source: &str, max_depth: usize) -> Result<Vec<Command>> {
    let syntax = Parser::new(source).with_max_depth(max_depth).parse()?;
    let commands = DeclarationParser::new()
        .with_max_depth(max_depth)
        .parse(syntax)?;
    log::trace!("lowered {} command(s)", commands.len());
    Ok(commands)
}

/// Parse and lower a single closed term.
pub fn parse_term(source: &str) -> Result<Arc<Term>> {
    parse_term_with_depth(source, default_max_depth())
}

pub fn parse_term_with_depth(source: &str, max_depth: usize) -> Result<Arc<Term>> {
    let syntax = Parser::new(source).with_max_depth(max_depth).parse()?;
    match syntax.as_slice() {
        [single] => DeclarationParser::new().with_max_depth(max_depth).lower(single),
        [] => Err(ParseError::UnexpectedEof(Span::default()).into()),
        [_, second, ..] => Err(malformed("term", "a single expression", second.span)),
    }
}

pub struct DeclarationParser {
    locals: Vec<Name>,
    /// Depth of the term under construction at the current position.
    depth: usize,
    max_depth: usize,
}

impl Default for DeclarationParser {
    fn default() -> Self {
        DeclarationParser {
            locals: Vec::new(),
            depth: 0,
            max_depth: default_max_depth(),
        }
    }
}

impl DeclarationParser {
    pub fn new() -> Self {
        DeclarationParser::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parse(&mut self, syntax_nodes: Vec<Syntax>) -> Result<Vec<Command>> {
        syntax_nodes
            .iter()
            .map(|syntax| self.parse_command(syntax))
            .collect()
    }

    fn parse_command(&mut self, syntax: &Syntax) -> Result<Command> {
        let items = match syntax.as_list() {
            Some(items) if !items.is_empty() => items,
            _ => return Err(DeclarationParseError::NotACommand(syntax.pretty_print(), syntax.span)),
        };
        let Some(head) = items[0].as_symbol() else {
            return Err(DeclarationParseError::NotACommand(syntax.pretty_print(), syntax.span));
        };
        let kind = match (head, &items[1..]) {
            ("def", [name, ty, value]) => {
                let name = self.binder_name(name)?;
                CommandKind::Declare(Declaration::definition(name, self.lower(ty)?, self.lower(value)?))
            }
            ("theorem", [name, ty, proof]) => {
                let name = self.binder_name(name)?;
                CommandKind::Declare(Declaration::theorem(name, self.lower(ty)?, self.lower(proof)?))
            }
            ("axiom", [name, ty]) => {
                let name = self.binder_name(name)?;
                CommandKind::Declare(Declaration::axiom(name, self.lower(ty)?))
            }
            // `(fixpoint f T body)` is `(def f T (fix (f T) body))`.
            ("fixpoint", [name, ty, body]) => {
                let name = self.binder_name(name)?;
                let ty = self.lower(ty)?;
                let body = self.with_local(name.clone(), |p| p.lower(body))?;
                let value = Term::fix(name.clone(), ty.clone(), body);
                CommandKind::Declare(Declaration::definition(name, ty, value))
            }
            ("check", [term]) => CommandKind::Check(self.lower(term)?),
            ("eval", [term]) => CommandKind::Eval(self.lower(term)?),
            ("def" | "theorem" | "fixpoint", _) => {
                return Err(malformed(head, "a name, a type and a body", syntax.span))
            }
            ("axiom", _) => return Err(malformed(head, "a name and a type", syntax.span)),
            ("check" | "eval", _) => return Err(malformed(head, "one term", syntax.span)),
            _ => return Err(DeclarationParseError::UnknownCommand(head.to_string(), items[0].span)),
        };
        Ok(Command {
            kind,
            span: syntax.span,
        })
    }

    /// Lower a term in the current scope.
    pub fn lower(&mut self, syntax: &Syntax) -> Result<Arc<Term>> {
        match &syntax.kind {
            SyntaxKind::Hole => Ok(Term::hole()),
            SyntaxKind::Nat(n) => Ok(Term::nat_big(n.clone())),
            SyntaxKind::Int(i) => Ok(Term::int(i.clone())),
            SyntaxKind::String(s) => Ok(Term::string(s.clone())),
            SyntaxKind::Symbol(name) => self.lower_symbol(name, syntax.span),
            SyntaxKind::List(items) => {
                self.nested(1, syntax.span, |p| p.lower_list(items, syntax.span))
            }
        }
    }

    /// Run `f` with the term depth raised by `levels`. Flat forms such as
    /// `(-> A B C ...)` or `(f a b ...)` lower to a chain as deep as they are
    /// long, so they count one level per element.
    fn nested<T>(
        &mut self,
        levels: usize,
        span: Span,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.depth + levels > self.max_depth {
            return Err(DeclarationParseError::TooDeep {
                max_depth: self.max_depth,
                span,
            });
        }
        self.depth += levels;
        let result = f(self);
        self.depth -= levels;
        result
    }

    fn lower_symbol(&self, name: &str, span: Span) -> Result<Arc<Term>> {
        if self.locals.iter().any(|local| local == name) {
            return Ok(Term::var(name));
        }
        match name {
            "Type" => Ok(Term::type0()),
            "Prop" => Ok(Term::prop()),
            _ if KEYWORDS.contains(&name) => Err(DeclarationParseError::Keyword(name.to_string(), span)),
            _ => Ok(Term::constant(name)),
        }
    }

    fn lower_list(&mut self, items: &[Syntax], span: Span) -> Result<Arc<Term>> {
        let Some((head, rest)) = items.split_first() else {
            return Err(malformed("()", "a non-empty application", span));
        };
        let keyword = head.as_symbol().filter(|s| !self.locals.iter().any(|l| l == s));
        match (keyword, rest) {
            (Some("fun" | "lambda"), [binders, body]) => {
                let binders = self.binders(binders)?;
                self.nested(binders.len().saturating_sub(1), span, |p| {
                    p.lower_binders(binders, body, |x, a, b| Term::lam(x, a, b))
                })
            }
            (Some("pi" | "forall"), [binders, body]) => {
                let binders = self.binders(binders)?;
                self.nested(binders.len().saturating_sub(1), span, |p| {
                    p.lower_binders(binders, body, |x, a, b| Term::pi(x, a, b))
                })
            }
            (Some("->"), [_, _, ..]) => {
                let mut types = self.nested(rest.len() - 1, span, |p| {
                    rest.iter().map(|ty| p.lower(ty)).collect::<Result<Vec<_>>>()
                })?;
                let mut result = types.pop().unwrap_or_else(Term::hole);
                while let Some(domain) = types.pop() {
                    result = Term::arrow(domain, result);
                }
                Ok(result)
            }
            (Some("let"), [binding, body]) => {
                let (name, ty, value) = match binding.as_list() {
                    Some([name, value]) => (self.binder_name(name)?, Term::hole(), self.lower(value)?),
                    Some([name, ty, value]) => {
                        (self.binder_name(name)?, self.lower(ty)?, self.lower(value)?)
                    }
                    _ => return Err(malformed("let", "(let (x [type] value) body)", binding.span)),
                };
                let body = self.with_local(name.clone(), |p| p.lower(body))?;
                Ok(Term::let_in(name, ty, value, body))
            }
            (Some("fix"), [binding, body]) => {
                let Some([name, ty]) = binding.as_list() else {
                    return Err(malformed("fix", "(fix (f type) body)", binding.span));
                };
                let name = self.binder_name(name)?;
                let ty = self.lower(ty)?;
                let body = self.with_local(name.clone(), |p| p.lower(body))?;
                Ok(Term::fix(name, ty, body))
            }
            (Some(":"), [term, ty]) => Ok(Term::ann(self.lower(term)?, self.lower(ty)?)),
            // The top level has no successor, so it cannot be written.
            (Some("Sort"), [level]) => match &level.kind {
                SyntaxKind::Nat(n) => u32::try_from(n)
                    .ok()
                    .filter(|n| *n < u32::MAX)
                    .map(|n| Term::sort(Level(n)))
                    .ok_or_else(|| DeclarationParseError::LevelTooLarge(n.to_string(), level.span)),
                _ => Err(malformed("Sort", "a numeric level", level.span)),
            },
            (Some(form @ ("fun" | "lambda" | "pi" | "forall")), _) => {
                Err(malformed(form, "a binder list and a body", span))
            }
            (Some(form @ ("let" | "fix")), _) => Err(malformed(form, "a binding and a body", span)),
            (Some("->"), _) => Err(malformed("->", "at least two types", span)),
            (Some(":"), _) => Err(malformed(":", "a term and a type", span)),
            (Some("Sort"), _) => Err(malformed("Sort", "a numeric level", span)),
            _ => self.nested(rest.len().saturating_sub(1), span, |p| {
                let fun = p.lower(head)?;
                let args = rest
                    .iter()
                    .map(|arg| p.lower(arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Term::apps(fun, args))
            }),
        }
    }

    /// `x`, `(x A)`, `(x : A)` or a list of those: `((x A) (y B) z)`.
    fn binders(&mut self, syntax: &Syntax) -> Result<Vec<(Name, Syntax)>> {
        let hole = |span| Syntax {
            kind: SyntaxKind::Hole,
            span,
        };
        match &syntax.kind {
            SyntaxKind::Symbol(_) | SyntaxKind::Hole => {
                Ok(vec![(self.binder_name(syntax)?, hole(syntax.span))])
            }
            SyntaxKind::List(items) => match items.as_slice() {
                [name, colon, ty] if colon.as_symbol() == Some(":") && name.as_list().is_none() => {
                    Ok(vec![(self.binder_name(name)?, ty.clone())])
                }
                [name, ty] if name.as_list().is_none() => Ok(vec![(self.binder_name(name)?, ty.clone())]),
                [] => Err(malformed("binder", "at least one binder", syntax.span)),
                _ => {
                    let mut all = Vec::new();
                    for item in items {
                        if matches!(item.kind, SyntaxKind::List(ref inner) if inner.len() < 2) {
                            return Err(malformed("binder", "(name type)", item.span));
                        }
                        all.extend(self.binders(item)?);
                    }
                    Ok(all)
                }
            },
            _ => Err(malformed("binder", "a name or (name type)", syntax.span)),
        }
    }

    /// Lower nested binders; each domain sees the binders before it.
    fn lower_binders(
        &mut self,
        binders: Vec<(Name, Syntax)>,
        body: &Syntax,
        build: fn(Name, Arc<Term>, Arc<Term>) -> Arc<Term>,
    ) -> Result<Arc<Term>> {
        let saved = self.locals.len();
        let mut domains = Vec::with_capacity(binders.len());
        let mut result = Ok(());
        for (name, ty) in &binders {
            match self.lower(ty) {
                Ok(domain) => domains.push((name.clone(), domain)),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            self.locals.push(name.clone());
        }
        let body = result.and_then(|()| self.lower(body));
        self.locals.truncate(saved);
        let mut term = body?;
        for (name, domain) in domains.into_iter().rev() {
            term = build(name, domain, term);
        }
        Ok(term)
    }

    fn with_local<T>(&mut self, name: Name, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.locals.push(name);
        let result = f(self);
        self.locals.pop();
        result
    }

    fn binder_name(&self, syntax: &Syntax) -> Result<Name> {
        match &syntax.kind {
            SyntaxKind::Hole => Ok(kernel::ast::ANONYMOUS.to_string()),
            SyntaxKind::Symbol(s) if KEYWORDS.contains(&s.as_str()) || s == "Type" || s == "Prop" => {
                Err(DeclarationParseError::Keyword(s.clone(), syntax.span))
            }
            SyntaxKind::Symbol(s) => Ok(s.clone()),
            _ => Err(malformed("binder", "a name", syntax.span)),
        }
    }
}
