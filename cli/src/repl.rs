use crate::driver::{process_file, process_source};
use crate::render::render_diagnostic;
use frontend::diagnostics::Diagnostic;
use frontend::parse_term_with_depth;
use kernel::context::Context;
use kernel::env::Environment;
use kernel::reduce::whnf;
use kernel::{elaborate, normalize_for_display};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::Path;

const HISTORY_FILE: &str = ".cosmos_history";

const HELP: &str = "\
Commands:
  (def ...) (theorem ...) (axiom ...) (fixpoint ...) (check t) (eval t)
  :type <term>     Show the type of a term
  :eval <term>     Normalize a term, unfolding every definition
  :whnf <term>     Reduce a term to weak-head normal form
  :load <file>     Check and run a file
  :env             List definitions
  :clear           Remove every definition except the built-ins
  :help            Show this message
  :quit            Exit";

/// Outcome of one line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Continue(String),
    Quit,
}

pub struct Repl {
    env: Environment,
}

impl Repl {
    pub fn new(env: Environment) -> Self {
        Repl { env }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run one line and return what should be printed.
    pub fn execute(&mut self, line: &str) -> Step {
        let line = line.trim();
        if line.is_empty() {
            return Step::Continue(String::new());
        }
        let Some(command) = line.strip_prefix(':') else {
            return Step::Continue(self.run_source(line, "<repl>"));
        };
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        let output = match (name, arg) {
            ("quit" | "q" | "exit", _) => return Step::Quit,
            ("help" | "h", _) => HELP.to_string(),
            ("env", _) => self.list_env(),
            ("clear", _) => {
                self.env.clear();
                "environment cleared".to_string()
            }
            ("type" | "t" | "eval" | "whnf" | "load", "") => format!("usage: :{} <argument>", name),
            ("type" | "t", term) => self.with_term(term, |env, term| {
                elaborate(term, None, env)
                    .map(|(term, ty)| format!("{} : {}", term, ty))
                    .map_err(|err| err.to_string())
            }),
            ("eval", term) => self.with_term(term, |env, term| {
                let (term, _) = elaborate(term, None, env).map_err(|err| err.to_string())?;
                normalize_for_display(&term, env)
                    .map(|value| value.to_string())
                    .map_err(|err| err.to_string())
            }),
            ("whnf", term) => self.with_term(term, |env, term| {
                let (term, _) = elaborate(term, None, env).map_err(|err| err.to_string())?;
                whnf(&term, &Context::new(), env)
                    .map(|value| value.to_string())
                    .map_err(|err| err.to_string())
            }),
            ("load", path) => self.load(path),
            _ => format!("unknown command `:{}`; try :help", name),
        };
        Step::Continue(output)
    }

    fn with_term(
        &self,
        source: &str,
        f: impl FnOnce(&Environment, &std::sync::Arc<kernel::Term>) -> Result<String, String>,
    ) -> String {
        match parse_term_with_depth(source, self.env.config().max_depth) {
            Ok(term) => f(&self.env, &term).unwrap_or_else(|err| format!("error: {}", err)),
            Err(err) => render_diagnostic(&Diagnostic::from_parse_error(&err), "<repl>", source),
        }
    }

    fn run_source(&mut self, source: &str, filename: &str) -> String {
        let result = process_source(source, &mut self.env);
        let mut lines: Vec<String> = result.outputs.iter().map(|o| o.to_string()).collect();
        lines.extend(
            result
                .diagnostics
                .iter()
                .map(|d| render_diagnostic(d, filename, source).trim_end().to_string()),
        );
        lines.join("\n")
    }

    fn load(&mut self, path: &str) -> String {
        match process_file(Path::new(path), &mut self.env) {
            Ok((source, result)) => {
                let mut lines = vec![format!(
                    "loaded {}: {} output(s), {} error(s)",
                    path,
                    result.outputs.len(),
                    result.error_count()
                )];
                lines.extend(
                    result
                        .diagnostics
                        .iter()
                        .map(|d| render_diagnostic(d, path, &source).trim_end().to_string()),
                );
                lines.join("\n")
            }
            Err(err) => format!("error: {}", err),
        }
    }

    fn list_env(&self) -> String {
        let lines: Vec<String> = self
            .env
            .definitions()
            .filter(|def| !def.is_primitive())
            .map(|def| format!("{} : {}", def.name, def.ty))
            .collect();
        if lines.is_empty() {
            "no definitions".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Interactive loop on the terminal.
pub fn start(env: Environment) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new()?;
    if rl.load_history(HISTORY_FILE).is_err() {
        log::debug!("no history at {}", HISTORY_FILE);
    }
    let mut repl = Repl::new(env);

    println!("Cosmos {} (:help for commands)", env!("CARGO_PKG_VERSION"));
    loop {
        match rl.readline("cosmos> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    rl.add_history_entry(line.as_str())?;
                }
                match repl.execute(&line) {
                    Step::Quit => break,
                    Step::Continue(output) if output.is_empty() => {}
                    Step::Continue(output) => println!("{}", output),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    if let Err(err) = rl.save_history(HISTORY_FILE) {
        log::warn!("could not save history: {}", err);
    }
    Ok(())
}
