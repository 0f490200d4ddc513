//! TOML configuration file loading, the middle layer between compiled-in
//! defaults and environment variable overrides.

use crate::errors::DomRateError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load and parse a TOML configuration file if `path` is given and exists.
///
/// Returns `Ok(None)` when no path was given, so callers fall back to
/// compiled-in defaults without treating an absent `--config` flag as an
/// error. A path that *is* given but cannot be read or parsed is fatal,
/// matching "any value of unexpected type aborts startup".
pub fn load_toml_file<T: DeserializeOwned>(
    path: Option<&Path>,
) -> Result<Option<T>, DomRateError> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| DomRateError::InvalidConfigValue {
        key: "--config".to_string(),
        detail: format!("could not read {}: {e}", path.display()),
    })?;
    let parsed = toml::from_str(&contents).map_err(|e| DomRateError::InvalidConfigValue {
        key: "--config".to_string(),
        detail: format!("could not parse {} as TOML: {e}", path.display()),
    })?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn missing_path_returns_none() {
        let result: Option<Sample> = load_toml_file(None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn nonexistent_path_returns_none() {
        let result: Option<Sample> =
            load_toml_file(Some(Path::new("/nonexistent/domrate.toml"))).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn valid_file_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "value = 42").unwrap();
        let result: Option<Sample> = load_toml_file(Some(file.path())).unwrap();
        assert_eq!(result.unwrap().value, 42);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "value = \"not a number\"").unwrap();
        let result: Result<Option<Sample>, _> = load_toml_file(Some(file.path()));
        assert!(result.is_err());
    }
}
