//! Configuration loading.
//!
//! # Load Order
//!
//! 1. Default values
//! 2. Config file (`$KERNLINK_CONFIG`, else `<config dir>/kernlink/config.toml`)
//! 3. Environment variables (`KERNLINK_LOG`, `KERNLINK_RUNTIME_DIR`)
//!
//! Each layer overrides the previous one.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use kernlink_kernel::SessionConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_ENV: &str = "KERNLINK_CONFIG";
pub const LOG_ENV: &str = "KERNLINK_LOG";
pub const RUNTIME_DIR_ENV: &str = "KERNLINK_RUNTIME_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive such as `info` or `kernlink_kernel=debug`.
    pub level: String,
    /// Log file. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Loads the default config file, if any, and applies the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(default_path().as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.is_file() => Self::read(path)?,
            Some(path) => {
                debug!(path = %path.display(), "no config file");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Applies overrides from a variable lookup such as `std::env::var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(level) = var(LOG_ENV) {
            self.log.level = level;
        }

        if let Some(dir) = var(RUNTIME_DIR_ENV) {
            self.session.runtime_dir = Some(PathBuf::from(dir));
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|dir| dir.join("kernlink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use indoc::indoc;
    use std::time::Duration;

    #[googletest::test]
    fn missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();

        expect_that!(config, eq(Config::default()));
    }

    #[googletest::test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            indoc! {r#"
                [session]
                kernel_command = ["ipython", "kernel", "-f", "{connection_file}"]
                startup_timeout = 5

                [log]
                level = "debug"
                file = "/tmp/kernlink.log"
            "#},
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        expect_that!(config.session.kernel_command[0], eq("ipython"));
        expect_that!(config.session.startup_timeout, eq(Duration::from_secs(5)));
        expect_that!(config.log.file, some(eq(PathBuf::from("/tmp/kernlink.log"))));
    }

    #[googletest::test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_from(Some(&dir.path().join("absent.toml"))).unwrap();

        expect_that!(config.session, eq(SessionConfig::default()));
    }

    #[googletest::test]
    fn invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[session\n").unwrap();

        let result = Config::load_from(Some(&path));

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[googletest::test]
    fn environment_overrides_file() {
        let mut config = Config::default();

        config.apply_overrides(|name| match name {
            LOG_ENV => Some("trace".to_string()),
            RUNTIME_DIR_ENV => Some("/run/jupyter".to_string()),
            _ => None,
        });

        expect_that!(config.log.level, eq("trace"));
        expect_that!(
            config.session.runtime_dir,
            some(eq(PathBuf::from("/run/jupyter")))
        );
    }
}
