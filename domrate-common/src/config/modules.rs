//! Per-module configuration table, shared by the scanner binary and (for
//! documentation/validation purposes) the coordinator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings for a single data-source module: an optional API key and an
/// optional request-rate limit. Individual modules interpret these loosely;
/// the scheduler itself never reads them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Arbitrary extra settings a module may need, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// `[modules.<Name>]` table from the TOML configuration file, keyed by
/// module name exactly as it appears in the module registration table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(flatten)]
    pub modules: BTreeMap<String, ModuleSettings>,
}

impl ModuleConfig {
    pub fn for_module(&self, name: &str) -> Option<&ModuleSettings> {
        self.modules.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_module_table() {
        let toml_src = r#"
            [VirusTotal]
            api_key = "abc123"
            limit = 4

            [Whois]
            limit = 10
        "#;
        let cfg: ModuleConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(
            cfg.for_module("VirusTotal").unwrap().api_key.as_deref(),
            Some("abc123")
        );
        assert_eq!(cfg.for_module("Whois").unwrap().limit, Some(10));
        assert!(cfg.for_module("Unknown").is_none());
    }

    #[test]
    fn default_is_empty() {
        let cfg = ModuleConfig::default();
        assert!(cfg.for_module("ASN").is_none());
    }
}
