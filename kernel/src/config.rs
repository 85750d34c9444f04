use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_FUEL: usize = 100_000;
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Reduction budget, read once from `COSMOS_FUEL` when set.
pub fn default_fuel() -> usize {
    static DEFAULT: OnceLock<usize> = OnceLock::new();
    *DEFAULT.get_or_init(|| limit_from_env("COSMOS_FUEL", DEFAULT_FUEL))
}

/// Nesting bound, read once from `COSMOS_MAX_DEPTH` when set.
pub fn default_max_depth() -> usize {
    static DEFAULT: OnceLock<usize> = OnceLock::new();
    *DEFAULT.get_or_init(|| limit_from_env("COSMOS_MAX_DEPTH", DEFAULT_MAX_DEPTH))
}

fn limit_from_env(var: &str, fallback: usize) -> usize {
    match std::env::var(var) {
        Ok(raw) => match parse_limit(&raw) {
            Ok(limit) => {
                log::debug!("read {} from the environment: {}", var, limit);
                limit
            }
            Err(err) => {
                log::warn!("ignoring {}: {}", var, err);
                fallback
            }
        },
        Err(_) => fallback,
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid limit `{0}`: expected a positive integer")]
    InvalidLimit(String),
}

/// Parse a fuel or depth limit. Zero is rejected since nothing could be checked.
pub fn parse_limit(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidLimit(raw.to_string())),
    }
}

/// Resource limits shared by the reducer, unifier and checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Reduction steps allowed per normalization or unification request.
    pub fuel: usize,
    /// Nesting depth allowed for recursive checking and reduction.
    pub max_depth: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            fuel: default_fuel(),
            max_depth: default_max_depth(),
        }
    }
}

impl KernelConfig {
    pub fn with_fuel(mut self, fuel: usize) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_must_be_positive_integers() {
        assert_eq!(parse_limit(" 42 "), Ok(42));
        assert!(parse_limit("0").is_err());
        assert!(parse_limit("-3").is_err());
        assert!(parse_limit("lots").is_err());
    }

    #[test]
    fn builders_override_defaults() {
        let config = KernelConfig::default().with_fuel(10).with_max_depth(3);
        assert_eq!(config.fuel, 10);
        assert_eq!(config.max_depth, 3);
    }
}
