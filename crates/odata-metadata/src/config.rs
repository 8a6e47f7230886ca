//! Cache configuration

use crate::{Error, Result};
use odata_edm::NameMatching;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::trace;

/// Settings shared by every schema a registry creates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Upper bound for one metadata fetch round trip, in milliseconds.
    /// `None` waits for the source indefinitely.
    pub fetch_timeout_ms: Option<u64>,
    /// Name comparison used by entity set and type lookups
    pub name_matching: NameMatching,
}

impl CacheConfig {
    /// Builder method to bound metadata fetches
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Builder method to set the lookup name matching policy
    pub fn with_name_matching(mut self, name_matching: NameMatching) -> Self {
        self.name_matching = name_matching;
        self
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Load a configuration from a YAML or JSON file.
    /// `.yaml`/`.yml` files are read as YAML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        trace!("Loading cache config from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;

        if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("YAML parse error: {}", e)))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("JSON parse error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.name_matching, NameMatching::CaseInsensitive);
    }

    #[test]
    fn test_from_yaml() {
        let config = CacheConfig::from_yaml_str("fetch_timeout_ms: 1500\nname_matching: exact\n").unwrap();
        assert_eq!(config.fetch_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.name_matching, NameMatching::Exact);
    }

    #[test]
    fn test_from_json_partial() {
        let config = CacheConfig::from_json_str(r#"{"fetch_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.fetch_timeout_ms, Some(250));
        assert_eq!(config.name_matching, NameMatching::CaseInsensitive);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = CacheConfig::from_yaml_str("retries: 3\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "name_matching: case_insensitive").unwrap();
        let config = CacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name_matching, NameMatching::CaseInsensitive);
    }

    #[test]
    fn test_from_file_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"name_matching": "exact"}}"#).unwrap();
        let config = CacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name_matching, NameMatching::Exact);
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::default()
            .with_fetch_timeout(Duration::from_secs(2))
            .with_name_matching(NameMatching::Exact);
        assert_eq!(config.fetch_timeout_ms, Some(2000));
        assert_eq!(config.name_matching, NameMatching::Exact);
    }
}
