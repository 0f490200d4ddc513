//! Environment variable parsing with type safety and source tracking.
//!
//! Every binary in this workspace loads configuration through one of these
//! parsers so that a malformed value never reaches runtime: `EnvParser`
//! collects every error it encounters instead of failing on the first one,
//! so a single startup report can name every offending key at once.

use super::source::{ConfigSource, Sourced};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("invalid duration for {var}: {value}")]
    InvalidDuration { var: String, value: String },
}

/// Type-safe environment variable parser, prefixed `DOMRATE_`.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    pub fn new() -> Self {
        Self {
            prefix: "DOMRATE_",
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => Sourced::from_env(value, var_name),
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        default
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_u16_range(&mut self, name: &str, default: u16, min: u16, max: u16) -> Sourced<u16> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<u16>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::from_env(default, var_name)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "16-bit port number".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<u32>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::from_env(default, var_name)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "unsigned 32-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<u64>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::from_env(default, var_name)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "unsigned 64-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Parse a plain integer number of seconds into a [`Duration`].
    pub fn get_duration_secs(&mut self, name: &str, default: Duration) -> Sourced<Duration> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match humantime::parse_duration(&value)
                .or_else(|_| value.parse::<u64>().map(Duration::from_secs))
            {
                Ok(d) => Sourced::from_env(d, var_name),
                Err(_) => {
                    self.errors.push(EnvError::InvalidDuration {
                        var: var_name.clone(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_path(&mut self, name: &str, default: &str) -> Sourced<PathBuf> {
        let var_name = self.var_name(name);
        let (value, source) = match env::var(&var_name) {
            Ok(v) => (v, ConfigSource::Environment),
            Err(_) => (default.to_string(), ConfigSource::Default),
        };

        let expanded = if let Some(stripped) = value.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                home.join(stripped)
            } else {
                PathBuf::from(&value)
            }
        } else {
            PathBuf::from(&value)
        };

        if source == ConfigSource::Environment {
            Sourced::from_env(expanded, var_name)
        } else {
            Sourced::default_value(expanded)
        }
    }

    /// Comma-separated list of strings, trimmed, empty entries dropped.
    pub fn get_string_list(&mut self, name: &str, default: Vec<String>) -> Sourced<Vec<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(Vec::new(), var_name),
            Ok(value) => {
                let items: Vec<String> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Sourced::from_env(items, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Comma-separated list of `u64`s (used for `rerun_thresholds`, minutes).
    pub fn get_u64_list(&mut self, name: &str, default: Vec<u64>) -> Sourced<Vec<u64>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(Vec::new(), var_name),
            Ok(value) => {
                let mut items = Vec::new();
                for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    match part.parse::<u64>() {
                        Ok(n) => items.push(n),
                        Err(_) => {
                            self.errors.push(EnvError::InvalidValue {
                                var: var_name.clone(),
                                expected: "comma-separated list of unsigned integers".to_string(),
                                value: value.clone(),
                            });
                            return Sourced::default_value(default);
                        }
                    }
                }
                Sourced::from_env(items, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        unsafe { env::set_var(key, value) };
    }

    #[test]
    fn get_bool_accepts_common_truthy_spellings() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_TEST_BOOL_TRUE"];
        cleanup_env(&vars);
        for val in &["1", "true", "yes", "on", "TRUE"] {
            set_env("DOMRATE_TEST_BOOL_TRUE", val);
            let mut parser = EnvParser::new();
            let result = parser.get_bool("TEST_BOOL_TRUE", false);
            assert!(result.value, "expected true for '{val}'");
            assert!(!parser.has_errors());
        }
        cleanup_env(&vars);
    }

    #[test]
    fn get_bool_invalid_value_falls_back_to_default_and_records_error() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_BAD_BOOL"];
        cleanup_env(&vars);
        set_env("DOMRATE_BAD_BOOL", "maybe");
        let mut parser = EnvParser::new();
        let result = parser.get_bool("BAD_BOOL", false);
        assert!(!result.value);
        assert!(parser.has_errors());
        cleanup_env(&vars);
    }

    #[test]
    fn get_u16_range_out_of_range_keeps_default() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_TEST_PORT"];
        cleanup_env(&vars);
        set_env("DOMRATE_TEST_PORT", "70000");
        let mut parser = EnvParser::new();
        let result = parser.get_u16_range("TEST_PORT", 8010, 1, 65535);
        assert_eq!(result.value, 8010);
        assert!(parser.has_errors());
        cleanup_env(&vars);
    }

    #[test]
    fn get_duration_secs_parses_plain_integer_seconds() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_TEST_DELAY"];
        cleanup_env(&vars);
        set_env("DOMRATE_TEST_DELAY", "10");
        let mut parser = EnvParser::new();
        let result = parser.get_duration_secs("TEST_DELAY", Duration::from_secs(1));
        assert_eq!(result.value, Duration::from_secs(10));
        cleanup_env(&vars);
    }

    #[test]
    fn get_duration_secs_parses_humantime_suffix() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_TEST_DELAY2"];
        cleanup_env(&vars);
        set_env("DOMRATE_TEST_DELAY2", "5s");
        let mut parser = EnvParser::new();
        let result = parser.get_duration_secs("TEST_DELAY2", Duration::from_secs(1));
        assert_eq!(result.value, Duration::from_secs(5));
        cleanup_env(&vars);
    }

    #[test]
    fn get_u64_list_parses_thresholds() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_TEST_THRESHOLDS"];
        cleanup_env(&vars);
        set_env("DOMRATE_TEST_THRESHOLDS", "1, 5, 10, 30, 60");
        let mut parser = EnvParser::new();
        let result = parser.get_u64_list("TEST_THRESHOLDS", vec![]);
        assert_eq!(result.value, vec![1, 5, 10, 30, 60]);
        cleanup_env(&vars);
    }

    #[test]
    fn get_string_list_trims_and_drops_empty_entries() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_TEST_NORUN"];
        cleanup_env(&vars);
        set_env("DOMRATE_TEST_NORUN", "MXToolbox, Traceroute,,Nmap");
        let mut parser = EnvParser::new();
        let result = parser.get_string_list("TEST_NORUN", vec![]);
        assert_eq!(result.value, vec!["MXToolbox", "Traceroute", "Nmap"]);
        cleanup_env(&vars);
    }

    #[test]
    fn source_tracking_distinguishes_default_and_environment() {
        let _guard = env_test_lock();
        let vars = ["DOMRATE_TEST_SRC"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        let result = parser.get_string("TEST_SRC", "default");
        assert_eq!(result.source, ConfigSource::Default);

        set_env("DOMRATE_TEST_SRC", "from_env");
        let mut parser = EnvParser::new();
        let result = parser.get_string("TEST_SRC", "default");
        assert_eq!(result.source, ConfigSource::Environment);
        assert_eq!(result.env_var.as_deref(), Some("DOMRATE_TEST_SRC"));

        cleanup_env(&vars);
    }
}
