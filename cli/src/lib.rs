pub mod driver;
pub mod render;
pub mod repl;

use kernel::config::{parse_limit, ConfigError, KernelConfig};
use kernel::env::Environment;
use std::path::Path;

/// clap value parser for `--fuel` and `--max-depth`.
pub fn limit_arg(raw: &str) -> Result<usize, ConfigError> {
    parse_limit(raw)
}

/// A prelude environment with the command-line limits applied.
pub fn configured_env(fuel: Option<usize>, max_depth: Option<usize>, allow_redefine: bool) -> Environment {
    let mut config = KernelConfig::default();
    if let Some(fuel) = fuel {
        config = config.with_fuel(fuel);
    }
    if let Some(max_depth) = max_depth {
        config = config.with_max_depth(max_depth);
    }
    log::debug!("kernel limits: fuel {}, max depth {}", config.fuel, config.max_depth);
    let mut env = Environment::with_prelude().with_config(config);
    env.set_allow_redefine(allow_redefine);
    env
}

/// Load `KEY=value` lines from `path` into the process environment, so that
/// `COSMOS_FUEL` and `COSMOS_MAX_DEPTH` can live in a project file. Variables
/// already set win. Returns `false` when there is no such file.
pub fn load_env_file(path: &Path) -> Result<bool, dotenvy::Error> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(err) if err.not_found() => Ok(false),
        Err(err) => Err(err),
    }
}
