//! Dump configuration.

use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_DUMP_PATH: &str = ".model.ai.json";
pub const DEFAULT_FORMAT: &str = "json";

pub const ENV_DUMP_PATH: &str = "AIJSON_DUMP_PATH";
pub const ENV_DUMP_FORMAT: &str = "AIJSON_DUMP_FORMAT";
pub const ENV_DUMP_PRETTY: &str = "AIJSON_DUMP_PRETTY";

/// Where and how a captured graph is written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    pub path: PathBuf,
    pub format: String,
    pub pretty: bool,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DUMP_PATH),
            format: DEFAULT_FORMAT.to_string(),
            pretty: true,
        }
    }
}

impl DumpConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Defaults overlaid with `AIJSON_DUMP_PATH`, `AIJSON_DUMP_FORMAT` and
    /// `AIJSON_DUMP_PRETTY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup(ENV_DUMP_PATH).filter(|value| !value.trim().is_empty()) {
            config.path = PathBuf::from(path);
        }
        if let Some(format) = lookup(ENV_DUMP_FORMAT).filter(|value| !value.trim().is_empty()) {
            config.format = format.trim().to_lowercase();
        }
        if let Some(pretty) = lookup(ENV_DUMP_PRETTY) {
            config.pretty = !matches!(pretty.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_manifest_convention() {
        let config = DumpConfig::default();
        assert_eq!(config.path, PathBuf::from(".model.ai.json"));
        assert_eq!(config.format, "json");
        assert!(config.pretty);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let env = HashMap::from([
            (ENV_DUMP_PATH, "out/model.json"),
            (ENV_DUMP_FORMAT, " JSON "),
            (ENV_DUMP_PRETTY, "off"),
        ]);
        let config = DumpConfig::from_lookup(|name| env.get(name).map(|value| value.to_string()));
        assert_eq!(config.path, PathBuf::from("out/model.json"));
        assert_eq!(config.format, "json");
        assert!(!config.pretty);
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: DumpConfig =
            serde_json::from_str(r#"{"path": "graph.json"}"#).expect("parse config");
        assert_eq!(config, DumpConfig::new("graph.json"));
    }
}
