//! Provenance tracking for resolved configuration values.

use std::fmt;

/// Where a resolved configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// The compiled-in default.
    Default,
    /// Loaded from a TOML configuration file.
    File,
    /// Loaded from an environment variable.
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigSource::Default => "default",
            ConfigSource::File => "file",
            ConfigSource::Environment => "environment",
        };
        f.write_str(s)
    }
}

/// A configuration value paired with where it was resolved from.
///
/// For environment-sourced values, `env_var` names the variable that
/// produced it, so a startup diagnostic can say exactly where a bad value
/// came from rather than just that one is bad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            env_var: None,
        }
    }

    pub fn from_env(value: T, var_name: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(var_name.into()),
        }
    }

    pub fn from_file(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::File,
            env_var: None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
            env_var: self.env_var,
        }
    }

    /// Resolve the three-layer precedence (defaults → file → environment)
    /// given this env-parsed value and an optional value read from the TOML
    /// file. Environment always wins when it was actually set; otherwise a
    /// present file value wins over the compiled-in default.
    pub fn resolve_with_file(self, file_value: Option<T>) -> Sourced<T> {
        if self.source == ConfigSource::Environment {
            return self;
        }
        match file_value {
            Some(value) => Sourced::from_file(value),
            None => self,
        }
    }

    /// A short provenance description suitable for a startup log line.
    pub fn describe(&self) -> String {
        match (&self.source, &self.env_var) {
            (ConfigSource::Environment, Some(var)) => format!("environment ({var})"),
            _ => self.source.to_string(),
        }
    }
}
