use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{CacheError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// store config
    #[serde(default)]
    pub store: StoreConfig,
    /// caching config
    #[serde(default)]
    pub caching: CachingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// store type
    #[serde(default)]
    pub store_type: StoreType,
    /// capacity of the memo holding hashes of stored nodes, defaults to 4096
    #[serde(default = "default_hash_cache_capacity")]
    pub hash_cache_capacity: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Mem,
}

/// Persisted caching configuration.
///
/// `enabled_for` and `disabled_for` hold identifier patterns, see
/// [`crate::caching::get_use_cache`] for how they are resolved.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CachingConfig {
    #[serde(default)]
    pub default_enabled: bool,
    #[serde(default)]
    pub enabled_for: Vec<String>,
    #[serde(default)]
    pub disabled_for: Vec<String>,
}

/// Names of the options that can be addressed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
pub enum ConfigOption {
    #[strum(serialize = "caching.default_enabled")]
    CachingDefaultEnabled,
    #[strum(serialize = "caching.enabled_for")]
    CachingEnabledFor,
    #[strum(serialize = "caching.disabled_for")]
    CachingDisabledFor,
}

fn default_hash_cache_capacity() -> u64 {
    4096
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            hash_cache_capacity: default_hash_cache_capacity(),
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| CacheError::IoError(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        Ok(config)
    }

    /// Returns the value of an option addressed by its dotted name.
    pub fn get_option(
        &self,
        name: &str,
    ) -> Result<JsonValue> {
        let value = match parse_option(name)? {
            ConfigOption::CachingDefaultEnabled => JsonValue::Bool(self.caching.default_enabled),
            ConfigOption::CachingEnabledFor => serde_json::to_value(&self.caching.enabled_for)?,
            ConfigOption::CachingDisabledFor => serde_json::to_value(&self.caching.disabled_for)?,
        };
        Ok(value)
    }

    /// Sets an option addressed by its dotted name.
    pub fn set_option(
        &mut self,
        name: &str,
        value: JsonValue,
    ) -> Result<()> {
        match parse_option(name)? {
            ConfigOption::CachingDefaultEnabled => {
                self.caching.default_enabled = value
                    .as_bool()
                    .ok_or_else(|| CacheError::Configuration(format!("option '{}' expects a boolean, got {}", name, value)))?;
            }
            ConfigOption::CachingEnabledFor => {
                self.caching.enabled_for = string_list(name, value)?;
            }
            ConfigOption::CachingDisabledFor => {
                self.caching.disabled_for = string_list(name, value)?;
            }
        }
        Ok(())
    }
}

fn parse_option(name: &str) -> Result<ConfigOption> {
    name.parse::<ConfigOption>().map_err(|_| CacheError::Configuration(format!("unknown config option '{}'", name)))
}

fn string_list(
    name: &str,
    value: JsonValue,
) -> Result<Vec<String>> {
    serde_json::from_value::<Vec<String>>(value)
        .map_err(|e| CacheError::Configuration(format!("option '{}' expects a list of strings: {}", name, e)))
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use serde_json::json;

    use crate::{CacheError, Config, StoreType};

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        [store]
        store_type = "mem"
        hash_cache_capacity = 10

        [caching]
        default_enabled = true
        enabled_for = ["aiida.calculations:*"]
        disabled_for = ["aiida.calculations:core.*"]
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.store.store_type, StoreType::Mem);
        assert_eq!(config.store.hash_cache_capacity, 10);
        assert!(config.caching.default_enabled);
        assert_eq!(config.caching.enabled_for, vec!["aiida.calculations:*".to_string()]);
        assert_eq!(config.caching.disabled_for, vec!["aiida.calculations:core.*".to_string()]);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::load_from_str("").unwrap();
        assert!(!config.caching.default_enabled);
        assert!(config.caching.enabled_for.is_empty());
        assert_eq!(config.store.hash_cache_capacity, 4096);
    }

    #[test]
    fn test_config_invalid_structure() {
        let err = Config::load_from_str("[caching]\nenabled_for = true\n").unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_config_create_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[caching]\ndefault_enabled = true").unwrap();
        let config = Config::create(file.path()).unwrap();
        assert!(config.caching.default_enabled);

        let err = Config::create(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, CacheError::IoError(_)));
    }

    #[test]
    fn test_config_options() {
        let mut config = Config::default();
        config.set_option("caching.default_enabled", json!(true)).unwrap();
        config.set_option("caching.enabled_for", json!(["a.b", "c.*"])).unwrap();
        assert_eq!(config.get_option("caching.default_enabled").unwrap(), json!(true));
        assert_eq!(config.get_option("caching.enabled_for").unwrap(), json!(["a.b", "c.*"]));
        assert_eq!(config.get_option("caching.disabled_for").unwrap(), json!([]));

        assert!(matches!(config.set_option("caching.unknown", json!(1)), Err(CacheError::Configuration(_))));
        assert!(matches!(config.set_option("caching.default_enabled", json!("yes")), Err(CacheError::Configuration(_))));
        assert!(matches!(config.set_option("caching.disabled_for", json!([1, 2])), Err(CacheError::Configuration(_))));
    }
}
