//! Runs source files against an environment.
//!
//! Consecutive declarations are checked together as one batch, so independent
//! definitions are checked in parallel; `check` and `eval` commands see every
//! declaration above them.

use frontend::diagnostics::{Diagnostic, DiagnosticHandler, Severity};
use frontend::{parse_program_with_depth, Command, CommandKind, Span};
use kernel::ast::{Name, Term};
use kernel::env::Environment;
use kernel::{check_module, elaborate, normalize_for_display, Declaration, DeclarationError, EnvironmentError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("cannot read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Defined(Name),
    Type { term: Arc<Term>, ty: Arc<Term> },
    Value(Arc<Term>),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Defined(name) => write!(f, "defined {}", name),
            Output::Type { term, ty } => write!(f, "{} : {}", term, ty),
            Output::Value(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub outputs: Vec<Output>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProcessingResult {
    /// Warnings such as redefinitions do not count.
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }
}

impl DiagnosticHandler for ProcessingResult {
    fn handle(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Parse, check and run `source`, adding its declarations to `env`.
pub fn process_source(source: &str, env: &mut Environment) -> ProcessingResult {
    let mut result = ProcessingResult::default();
    let commands = match parse_program_with_depth(source, env.config().max_depth) {
        Ok(commands) => commands,
        Err(err) => {
            result.handle(Diagnostic::from_parse_error(&err));
            return result;
        }
    };
    process_commands(commands, env, &mut result);
    result
}

pub fn process_file(path: &Path, env: &mut Environment) -> Result<(String, ProcessingResult), DriverError> {
    let source = fs::read_to_string(path).map_err(|source| DriverError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("processing {}", path.display());
    let result = process_source(&source, env);
    Ok((source, result))
}

fn process_commands(commands: Vec<Command>, env: &mut Environment, result: &mut ProcessingResult) {
    let mut batch: Vec<(Declaration, Span)> = Vec::new();
    for command in commands {
        match command.kind {
            CommandKind::Declare(decl) => batch.push((decl, command.span)),
            CommandKind::Check(term) => {
                flush(&mut batch, env, result);
                match elaborate(&term, None, env) {
                    Ok((term, ty)) => result.outputs.push(Output::Type { term, ty }),
                    Err(err) => result.handle(Diagnostic::from_elaboration_error(&err, command.span)),
                }
            }
            CommandKind::Eval(term) => {
                flush(&mut batch, env, result);
                let elaborated = match elaborate(&term, None, env) {
                    Ok((term, _)) => term,
                    Err(err) => {
                        result.handle(Diagnostic::from_elaboration_error(&err, command.span));
                        continue;
                    }
                };
                match normalize_for_display(&elaborated, env) {
                    Ok(value) => result.outputs.push(Output::Value(value)),
                    Err(err) => result.handle(Diagnostic::from_reduce_error(&err, command.span)),
                }
            }
        }
    }
    flush(&mut batch, env, result);
}

fn flush(batch: &mut Vec<(Declaration, Span)>, env: &mut Environment, result: &mut ProcessingResult) {
    if batch.is_empty() {
        return;
    }
    let pending = std::mem::take(batch);
    let spans: Vec<(Name, Span)> = pending.iter().map(|(d, s)| (d.name.clone(), *s)).collect();
    let report = check_module(pending.into_iter().map(|(d, _)| d).collect(), env);
    log::debug!(
        "batch of {} declaration(s) took {} wave(s)",
        spans.len(),
        report.waves
    );

    // A redefinition is reported at the last declaration of the name.
    for name in &report.redefined {
        let span = spans.iter().rev().find(|(n, _)| n == name).map(|(_, s)| *s);
        result.handle(
            Diagnostic::warning(format!("`{}` was redefined", name))
                .with_code("W001")
                .with_span(span.unwrap_or_default())
                .with_label(span.unwrap_or_default(), "replaces the earlier definition"),
        );
    }
    result
        .outputs
        .extend(report.defined.into_iter().map(Output::Defined));
    for (name, err) in &report.failures {
        // A duplicate is reported at the later occurrence.
        let duplicate = matches!(
            err,
            DeclarationError::Environment(EnvironmentError::DuplicateDefinition(_))
        );
        let mut matching = spans.iter().filter(|(n, _)| n == name).map(|(_, s)| *s);
        let span = if duplicate {
            matching.last()
        } else {
            matching.next()
        };
        result.handle(Diagnostic::from_declaration_error(err, span.unwrap_or_default()));
    }
}
