//! Configuration loader with environment variable support
//!
//! Precedence, lowest first: built-in defaults, TOML file, `WAGERING_*`
//! environment variables. The result is validated before it is returned.

use crate::config::WageringConfig;
use crate::errors::ConfigError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_API_HOST: &str = "WAGERING_API_HOST";
pub const ENV_API_PORT: &str = "WAGERING_API_PORT";
pub const ENV_DATA_DIR: &str = "WAGERING_DATA_DIR";
pub const ENV_SESSION_TTL_SECS: &str = "WAGERING_SESSION_TTL_SECS";
pub const ENV_MAX_WIN_MULTIPLIER: &str = "WAGERING_MAX_WIN_MULTIPLIER";
pub const ENV_RNG_SEED: &str = "WAGERING_RNG_SEED";

#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    /// Explicit variables; the process environment when `None`
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Read overrides from the given map instead of the process environment
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn load(&self) -> Result<WageringConfig, ConfigError> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => WageringConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<WageringConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    fn parsed<T: FromStr>(&self, name: &str, reason: &str) -> Result<Option<T>, ConfigError> {
        match self.var(name) {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    field: name.to_string(),
                    value,
                    reason: reason.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn apply_env_overrides(&self, config: &mut WageringConfig) -> Result<(), ConfigError> {
        if let Some(host) = self.var(ENV_API_HOST) {
            config.api.host = host;
        }
        if let Some(port) = self.parsed::<u16>(ENV_API_PORT, "Invalid port number")? {
            config.api.port = port;
        }
        if let Some(dir) = self.var(ENV_DATA_DIR) {
            config.storage.data_directory = dir;
        }
        if let Some(ttl) = self.parsed::<u64>(ENV_SESSION_TTL_SECS, "Invalid number of seconds")? {
            config.session.ttl_secs = ttl;
        }
        if let Some(ceiling) =
            self.parsed::<Decimal>(ENV_MAX_WIN_MULTIPLIER, "Invalid decimal multiplier")?
        {
            config.limits.max_win_multiplier = ceiling;
        }
        if let Some(seed) = self.parsed::<u64>(ENV_RNG_SEED, "Invalid seed")? {
            config.rng_seed = Some(seed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ConfigLoader::new().with_env(HashMap::new()).load().unwrap();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.session.ttl_secs, 7200);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nport = 9000\n[session]\nttl_secs = 60").unwrap();

        let config = ConfigLoader::new()
            .with_path(file.path())
            .with_env(env(&[
                (ENV_API_PORT, "9100"),
                (ENV_MAX_WIN_MULTIPLIER, "500"),
                (ENV_RNG_SEED, "7"),
            ]))
            .load()
            .unwrap();

        assert_eq!(config.api.port, 9100);
        assert_eq!(config.session.ttl_secs, 60);
        assert_eq!(config.limits.max_win_multiplier, dec!(500));
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn test_bad_env_value_names_the_variable() {
        let err = ConfigLoader::new()
            .with_env(env(&[(ENV_API_PORT, "not-a-port")]))
            .load()
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, ENV_API_PORT),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_validation_runs_after_overrides() {
        let err = ConfigLoader::new()
            .with_env(env(&[(ENV_SESSION_TTL_SECS, "0")]))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .with_path("/definitely/not/here.toml")
            .with_env(HashMap::new())
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::LoadFailed(_)));
    }
}
