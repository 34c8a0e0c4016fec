//! Exporter configuration.
//!
//! We use `serde` to parse the options from the TOML config file,
//! and to write the default configuration to the TOML config file.

use std::{
    borrow::Cow,
    env::VarError,
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use error::{InvalidConfigError, InvalidSubstitutionError, LoadError, LoadErrorCause};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// AWS region to poll.
    pub region: String,
    /// Comma-separated tag keys, each one becomes an `aws_tag_<key>` label.
    pub instance_tags: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub listen_address: SocketAddr,
    /// Maximum duration of each fetch. Unbounded if unset.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub fetch_timeout: Option<Duration>,
}

impl Config {
    /// Checks the values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        if self.poll_interval.is_zero() {
            return Err(InvalidConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: String::from("eu-west-1"),
            instance_tags: String::new(),
            poll_interval: Duration::from_secs(4 * 60),
            listen_address: SocketAddr::from(([0, 0, 0, 0], 9190)),
            fetch_timeout: None,
        }
    }
}

/// Config values given on the command line, which take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub region: Option<String>,
    pub instance_tags: Option<String>,
    pub poll_interval: Option<Duration>,
    pub listen_address: Option<SocketAddr>,
    pub fetch_timeout: Option<Duration>,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(region) = self.region {
            config.region = region;
        }
        if let Some(tags) = self.instance_tags {
            config.instance_tags = tags;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(addr) = self.listen_address {
            config.listen_address = addr;
        }
        if let Some(timeout) = self.fetch_timeout {
            config.fetch_timeout = Some(timeout);
        }
    }
}

/// Loads the configuration from a TOML file.
///
/// If the file does not exist, the default configuration is returned.
/// Environment variables are substituted before parsing, see [`substitute_env`].
pub fn load(config_file: &Path) -> Result<Config, LoadError> {
    load_impl(config_file).map_err(|kind| LoadError {
        config_file: config_file.to_owned(),
        kind,
    })
}

fn load_impl(config_file: &Path) -> Result<Config, LoadErrorCause> {
    let content = match std::fs::read_to_string(config_file) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("Config file {config_file:?} not found, using the default configuration.");
            return Ok(Config::default());
        }
        Err(e) => return Err(LoadErrorCause::Read(e)),
    };
    let content = substitute_env(&content)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Writes the default configuration to `config_file`, overwriting it if it exists.
pub fn write_default(config_file: &Path) -> anyhow::Result<()> {
    let content = toml::to_string(&Config::default()).context("failed to serialize the default config")?;
    std::fs::write(config_file, content)
        .with_context(|| format!("failed to write the default config to {config_file:?}"))
}

/// Replaces the pattern `${VAR_NAME}` by the value of the `VAR_NAME` environment
/// variable.
///
/// The pattern can be escaped to prevent its replacement: `\${NOT_A_VAR}`.
/// If a variable does not exist or is invalid, returns an error.
pub fn substitute_env(input: &str) -> Result<Cow<'_, str>, InvalidSubstitutionError> {
    if !input.contains("${") {
        return Ok(Cow::Borrowed(input));
    }

    let mut res = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(begin) = rest.find("${") {
        if begin > 0 && rest.as_bytes()[begin - 1] == b'\\' {
            // escaped: drop the '\' and keep "${"
            res.push_str(&rest[..begin - 1]);
            res.push_str("${");
            rest = &rest[begin + 2..];
            continue;
        }

        res.push_str(&rest[..begin]);
        let end = rest[begin..].find('}').ok_or(InvalidSubstitutionError::WrongSyntax)? + begin;
        let name = &rest[begin + 2..end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(InvalidSubstitutionError::InvalidName(name.to_owned()));
        }
        match std::env::var(name) {
            Ok(value) => res.push_str(&value),
            Err(VarError::NotPresent) => return Err(InvalidSubstitutionError::Missing(name.to_owned())),
            Err(VarError::NotUnicode(_)) => return Err(InvalidSubstitutionError::InvalidValue(name.to_owned())),
        }
        rest = &rest[end + 1..];
    }
    res.push_str(rest);
    Ok(Cow::Owned(res))
}

pub mod error {
    use std::{io, path::PathBuf};
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("could not load config from {config_file:?}")]
    pub struct LoadError {
        pub config_file: PathBuf,
        #[source]
        pub(super) kind: LoadErrorCause,
    }

    #[derive(Error, Debug)]
    pub(super) enum LoadErrorCause {
        #[error("read failed")]
        Read(#[source] io::Error),
        #[error("env var substitution failed")]
        Substitution(#[from] InvalidSubstitutionError),
        #[error("invalid TOML config")]
        InvalidToml(#[from] toml::de::Error),
        #[error("invalid value")]
        InvalidValue(#[from] InvalidConfigError),
    }

    #[derive(Error, Debug, PartialEq)]
    pub enum InvalidConfigError {
        #[error("poll_interval must be greater than zero")]
        ZeroPollInterval,
    }

    #[derive(Error, Debug, PartialEq)]
    pub enum InvalidSubstitutionError {
        /// The environment variable does not exist.
        #[error("the environment variable {0} does not exist")]
        Missing(String),
        /// The value of the variable is not valid UTF-8.
        #[error("value of env var {0} is not valid UTF-8")]
        InvalidValue(String),
        /// The name of the variable contains a forbidden character.
        #[error("env var name {0:?} is not valid")]
        InvalidName(String),
        /// The substitution syntax has not been used properly.
        #[error("wrong use of the substitution syntax, it should be ${{ENV_VAR}}")]
        WrongSyntax,
    }
}
