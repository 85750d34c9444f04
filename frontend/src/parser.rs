use crate::surface::{Span, Syntax, SyntaxKind};
use kernel::config::default_max_depth;
use num_bigint::{BigInt, BigUint};
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof(Span),
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char, Span),
    #[error("unmatched closing parenthesis")]
    UnmatchedParen(Span),
    #[error("unterminated string literal")]
    UnterminatedString(Span),
    #[error("unknown escape `\\{0}` in string literal")]
    InvalidEscape(char, Span),
    #[error("lists nested deeper than {max_depth}")]
    TooDeep { max_depth: usize, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedEof(span)
            | ParseError::UnexpectedChar(_, span)
            | ParseError::UnmatchedParen(span)
            | ParseError::UnterminatedString(span)
            | ParseError::InvalidEscape(_, span)
            | ParseError::TooDeep { span, .. } => *span,
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.chars().peekable(),
            pos: 0,
            line: 1,
            col: 0,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn current_span(&self) -> Span {
        Span {
            start: self.pos,
            end: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    /// Whitespace and `;` line comments.
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.next();
            } else if c == ';' {
                while let Some(nc) = self.peek() {
                    if nc == '\n' {
                        break;
                    }
                    self.next();
                }
            } else {
                break;
            }
        }
    }

    /// Characters up to the next delimiter.
    fn take_atom(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';' {
                break;
            }
            s.push(c);
            self.next();
        }
        s
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(input),
            depth: 0,
            max_depth: default_max_depth(),
        }
    }

    /// Bound on list nesting; deeper input is rejected before it is read.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Read every expression in the input.
    pub fn parse(&mut self) -> Result<Vec<Syntax>, ParseError> {
        let mut exprs = Vec::new();
        self.lexer.skip_whitespace();
        while let Some(c) = self.lexer.peek() {
            if c == ')' {
                return Err(ParseError::UnmatchedParen(self.lexer.current_span()));
            }
            exprs.push(self.parse_expr()?);
            self.lexer.skip_whitespace();
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<Syntax, ParseError> {
        self.lexer.skip_whitespace();
        let start = self.lexer.current_span();

        match self.lexer.peek() {
            Some('(') => {
                if self.depth >= self.max_depth {
                    return Err(ParseError::TooDeep {
                        max_depth: self.max_depth,
                        span: start,
                    });
                }
                self.lexer.next();
                self.depth += 1;
                let list = self.parse_list_items();
                self.depth -= 1;
                Ok(self.finish(SyntaxKind::List(list?), start))
            }
            Some(')') => Err(ParseError::UnmatchedParen(start)),
            Some('"') => self.parse_string(start),
            Some(c) if c.is_ascii_digit() => {
                let digits = self.lexer.take_atom();
                match digits.parse::<BigUint>() {
                    Ok(n) => Ok(self.finish(SyntaxKind::Nat(n), start)),
                    Err(_) => Err(ParseError::UnexpectedChar(first_non_digit(&digits, c), start)),
                }
            }
            Some(c) => {
                let atom = self.lexer.take_atom();
                if atom.is_empty() {
                    return Err(ParseError::UnexpectedChar(c, start));
                }
                // `-3` and `+3` are integers; `-` and `->` stay symbols.
                if let Some(digits) = atom.strip_prefix(&['-', '+'][..]) {
                    if digits.starts_with(|d: char| d.is_ascii_digit()) {
                        let Ok(magnitude) = digits.parse::<BigUint>() else {
                            return Err(ParseError::UnexpectedChar(first_non_digit(digits, c), start));
                        };
                        let value = BigInt::from(magnitude);
                        let value = if atom.starts_with('-') { -value } else { value };
                        return Ok(self.finish(SyntaxKind::Int(value), start));
                    }
                }
                let kind = if atom == "_" {
                    SyntaxKind::Hole
                } else {
                    SyntaxKind::Symbol(atom)
                };
                Ok(self.finish(kind, start))
            }
            None => Err(ParseError::UnexpectedEof(start)),
        }
    }

    fn parse_list_items(&mut self) -> Result<Vec<Syntax>, ParseError> {
        let mut list = Vec::new();
        loop {
            self.lexer.skip_whitespace();
            match self.lexer.peek() {
                Some(')') => {
                    self.lexer.next();
                    return Ok(list);
                }
                None => return Err(ParseError::UnexpectedEof(self.lexer.current_span())),
                _ => list.push(self.parse_expr()?),
            }
        }
    }

    fn parse_string(&mut self, start: Span) -> Result<Syntax, ParseError> {
        self.lexer.next();
        let mut s = String::new();
        loop {
            match self.lexer.next() {
                Some('"') => return Ok(self.finish(SyntaxKind::String(s), start)),
                Some('\\') => {
                    let escape_span = self.lexer.current_span();
                    match self.lexer.next() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('\\') => s.push('\\'),
                        Some('"') => s.push('"'),
                        Some(other) => return Err(ParseError::InvalidEscape(other, escape_span)),
                        None => return Err(ParseError::UnterminatedString(start)),
                    }
                }
                Some(c) => s.push(c),
                None => return Err(ParseError::UnterminatedString(start)),
            }
        }
    }

    fn finish(&self, kind: SyntaxKind, start: Span) -> Syntax {
        Syntax {
            kind,
            span: start.to(self.lexer.current_span()),
        }
    }
}

fn first_non_digit(digits: &str, fallback: char) -> char {
    digits
        .chars()
        .find(|c| !c.is_ascii_digit())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<Syntax> {
        Parser::new(input).parse().expect("input should parse")
    }

    #[test]
    fn test_parse_nested_lists() {
        let exprs = parse("(fun (x Nat) (Nat.add x 1)) ; trailing comment\n_");
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[0].pretty_print(), "(fun (x Nat) (Nat.add x 1))");
        assert_eq!(exprs[1].kind, SyntaxKind::Hole);
    }

    #[test]
    fn test_literals() {
        let exprs = parse(r#"123456789012345678901234567890 "a \"quoted\"\n""#);
        assert_eq!(
            exprs[0].kind,
            SyntaxKind::Nat("123456789012345678901234567890".parse().unwrap())
        );
        assert_eq!(exprs[1].kind, SyntaxKind::String("a \"quoted\"\n".into()));
    }

    #[test]
    fn test_spans_track_lines() {
        let exprs = parse("(a)\n  (bb c)");
        let second = &exprs[1];
        assert_eq!((second.span.line, second.span.col), (2, 2));
        assert_eq!(second.span.range(), 6..12);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Parser::new("(a b").parse(),
            Err(ParseError::UnexpectedEof(_))
        ));
        assert!(matches!(
            Parser::new("a)").parse(),
            Err(ParseError::UnmatchedParen(_))
        ));
        assert!(matches!(
            Parser::new("\"open").parse(),
            Err(ParseError::UnterminatedString(_))
        ));
        assert!(matches!(
            Parser::new("12x").parse(),
            Err(ParseError::UnexpectedChar('x', _))
        ));
        assert!(matches!(
            Parser::new(r#""\q""#).parse(),
            Err(ParseError::InvalidEscape('q', _))
        ));
        assert!(matches!(
            Parser::new("-4x").parse(),
            Err(ParseError::UnexpectedChar('x', _))
        ));
    }

    #[test]
    fn test_signed_integers() {
        let exprs = parse("-42 +7 - -> -x");
        assert_eq!(exprs[0].kind, SyntaxKind::Int(BigInt::from(-42)));
        assert_eq!(exprs[1].kind, SyntaxKind::Int(BigInt::from(7)));
        assert_eq!(exprs[2].kind, SyntaxKind::Symbol("-".into()));
        assert_eq!(exprs[3].kind, SyntaxKind::Symbol("->".into()));
        assert_eq!(exprs[4].kind, SyntaxKind::Symbol("-x".into()));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}x{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = Parser::new(&deep).with_max_depth(64).parse().unwrap_err();
        assert!(matches!(err, ParseError::TooDeep { max_depth: 64, .. }), "{:?}", err);
        assert_eq!(err.span().col, 64);

        let ok = format!("{}x{}", "(".repeat(64), ")".repeat(64));
        assert!(Parser::new(&ok).with_max_depth(64).parse().is_ok());
    }
}
