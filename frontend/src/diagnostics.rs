use crate::declaration_parser::DeclarationParseError;
use crate::parser::ParseError;
use crate::surface::Span;
use kernel::checker::{ElaborationError, ErrorKind};
use kernel::{DeclarationError, EnvironmentError, ReduceError};
use std::fmt;

fn is_unknown_span(span: Span) -> bool {
    span.start == 0 && span.end == 0 && span.line == 0 && span.col == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A message about a source location, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub span: Option<Span>,
    pub labels: Vec<(Span, String)>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            span: None,
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        if !is_unknown_span(span) {
            self.span = Some(span);
        }
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        if !is_unknown_span(span) {
            self.labels.push((span, message.into()));
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn message_with_code(&self) -> String {
        match self.code {
            Some(code) => format!("[{}] {}", code, self.message),
            None => self.message.clone(),
        }
    }

    pub fn from_parse_error(err: &DeclarationParseError) -> Self {
        let code = match err {
            DeclarationParseError::TooDeep { .. }
            | DeclarationParseError::Parse(ParseError::TooDeep { .. }) => "K006",
            DeclarationParseError::Parse(_) => "P001",
            _ => "P002",
        };
        Diagnostic::error(err.to_string())
            .with_code(code)
            .with_span(err.span())
            .with_label(err.span(), "here")
    }

    /// A kernel failure located at the command that caused it.
    pub fn from_declaration_error(err: &DeclarationError, span: Span) -> Self {
        match err {
            DeclarationError::Elaboration { name, source } => {
                Diagnostic::from_elaboration_error(source, span)
                    .with_label(span, format!("while checking `{}`", name))
            }
            DeclarationError::Environment(env_err) => Diagnostic::error(env_err.to_string())
                .with_code(environment_code(env_err))
                .with_span(span)
                .with_label(span, "in this declaration"),
        }
    }

    pub fn from_elaboration_error(err: &ElaborationError, span: Span) -> Self {
        let mut diagnostic = Diagnostic::error(err.kind.to_string())
            .with_code(error_code(&err.kind))
            .with_span(span)
            .with_note(format!("in `{}`", err.term));
        if !err.context.is_empty() {
            let bindings: Vec<String> = err
                .context
                .iter()
                .map(|(name, ty)| format!("{} : {}", name, ty))
                .collect();
            diagnostic = diagnostic.with_note(format!("context: {}", bindings.join(", ")));
        }
        diagnostic
    }

    pub fn from_reduce_error(err: &ReduceError, span: Span) -> Self {
        Diagnostic::error(err.to_string())
            .with_code("K006")
            .with_span(span)
            .with_label(span, "while normalizing this")
    }
}

/// Stable codes for kernel errors.
pub fn error_code(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::UnboundVariable(_) => "K001",
        ErrorKind::UnknownDefinition(_) => "K002",
        ErrorKind::NotAFunction { .. } => "K003",
        ErrorKind::UnificationFailure { .. } => "K004",
        ErrorKind::OccursCheck { .. } => "K005",
        ErrorKind::NonTermination(_) => "K006",
        ErrorKind::NotAType { .. } => "K007",
        ErrorKind::NotAProposition { .. } => "K008",
        ErrorKind::UnsolvedMetavariable(_) => "K009",
        ErrorKind::CannotInferHole => "K010",
        ErrorKind::UniverseTooLarge(_) => "K011",
    }
}

fn environment_code(err: &EnvironmentError) -> &'static str {
    match err {
        EnvironmentError::DuplicateDefinition(_) => "E001",
        EnvironmentError::UnknownDefinition(_) => "E002",
        EnvironmentError::ReservedName(_) => "E003",
        EnvironmentError::OpenTerm { .. } => "E004",
        EnvironmentError::TooDeep { .. } => "E005",
    }
}

/// Receives diagnostics in order of arrival.
pub trait DiagnosticHandler {
    fn handle(&mut self, diagnostic: Diagnostic);
}
