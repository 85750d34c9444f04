//! Terminal rendering of diagnostics with ariadne.

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use frontend::diagnostics::{Diagnostic, Severity};
use std::io::{self, Write};
use std::ops::Range;

pub fn write_diagnostic(
    diagnostic: &Diagnostic,
    filename: &str,
    source: &str,
    color: bool,
    out: &mut impl Write,
) -> io::Result<()> {
    let kind = match diagnostic.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
    };
    let offset = diagnostic.span.map(|span| span.start).unwrap_or(0);
    let mut report = Report::<(&str, Range<usize>)>::build(kind, filename, offset)
        .with_config(Config::default().with_color(color))
        .with_message(&diagnostic.message);
    if let Some(code) = diagnostic.code {
        report = report.with_code(code);
    }
    for (span, message) in &diagnostic.labels {
        report = report.with_label(
            Label::new((filename, span.range()))
                .with_message(message)
                .with_color(Color::Red),
        );
    }
    if !diagnostic.notes.is_empty() {
        report = report.with_note(diagnostic.notes.join("\n"));
    }
    report.finish().write((filename, Source::from(source)), out)
}

/// Render to a string without colors.
pub fn render_diagnostic(diagnostic: &Diagnostic, filename: &str, source: &str) -> String {
    let mut buffer = Vec::new();
    if write_diagnostic(diagnostic, filename, source, false, &mut buffer).is_err() {
        return diagnostic.message_with_code();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn print_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    let mut stderr = io::stderr();
    for diagnostic in diagnostics {
        if write_diagnostic(diagnostic, filename, source, true, &mut stderr).is_err() {
            eprintln!("{}: {}", filename, diagnostic.message_with_code());
        }
    }
}
