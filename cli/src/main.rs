use anyhow::Context as _;
use clap::{Parser, Subcommand};
use cli::driver::{process_file, Output};
use cli::render::print_diagnostics;
use cli::{configured_env, limit_arg, load_env_file, repl};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about = "Type checker and evaluator for the Cosmos language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Source file to run; starts the REPL when omitted
    #[arg(required = false)]
    file: Option<PathBuf>,

    /// Reduction steps allowed per normalization or unification
    /// (defaults to 100_000 unless COSMOS_FUEL is set)
    #[arg(long, global = true, value_parser = limit_arg)]
    fuel: Option<usize>,

    /// Nesting depth allowed while checking and reducing
    #[arg(long, global = true, value_parser = limit_arg)]
    max_depth: Option<usize>,

    /// Allow redefinition of existing names
    #[arg(long, global = true)]
    allow_redefine: bool,

    /// File of KEY=value settings such as COSMOS_FUEL, read before anything else
    #[arg(long = "env", global = true, value_name = "PATH", default_value = ".env")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check files without printing `check`/`eval` results
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Start the interactive loop, optionally loading files first
    Repl { files: Vec<PathBuf> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // Loaded first so RUST_LOG and the limits in the file take effect.
    let loaded = load_env_file(&cli.env_file);
    env_logger::init();
    match loaded {
        Ok(true) => log::debug!("loaded settings from {}", cli.env_file.display()),
        Ok(false) => log::debug!("no settings file at {}", cli.env_file.display()),
        Err(err) => {
            eprintln!("error: cannot load `{}`: {}", cli.env_file.display(), err);
            return ExitCode::from(2);
        }
    }
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

/// Returns whether everything checked.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut env = configured_env(cli.fuel, cli.max_depth, cli.allow_redefine);
    match (cli.command, cli.file) {
        (Some(Commands::Check { files }), _) => {
            let mut ok = true;
            for path in &files {
                let (source, result) = process_file(path, &mut env)?;
                let name = path.display().to_string();
                print_diagnostics(&result.diagnostics, &name, &source);
                let defined = result
                    .outputs
                    .iter()
                    .filter(|o| matches!(o, Output::Defined(_)))
                    .count();
                println!(
                    "{}: {} declaration(s), {} error(s)",
                    name,
                    defined,
                    result.error_count()
                );
                ok &= !result.has_errors();
            }
            Ok(ok)
        }
        (Some(Commands::Repl { files }), _) => {
            for path in &files {
                let (source, result) = process_file(path, &mut env)?;
                print_diagnostics(&result.diagnostics, &path.display().to_string(), &source);
            }
            repl::start(env).context("REPL failed")?;
            Ok(true)
        }
        (None, Some(path)) => {
            let (source, result) = process_file(&path, &mut env)?;
            for output in &result.outputs {
                if !matches!(output, Output::Defined(_)) {
                    println!("{}", output);
                }
            }
            print_diagnostics(&result.diagnostics, &path.display().to_string(), &source);
            Ok(!result.has_errors())
        }
        (None, None) => {
            repl::start(env).context("REPL failed")?;
            Ok(true)
        }
    }
}
