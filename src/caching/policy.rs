//! Decides whether caching is consulted for an identifier.
//!
//! The persisted [`CachingConfig`] is layered with the overrides held by a
//! [`CachingContext`]. Overrides are installed by
//! [`CachingContext::enable_caching`] and [`CachingContext::disable_caching`]
//! and live until the returned [`CachingGuard`] is dropped.
//!
//! Dropping a guard clears *all* overrides of the context, not only the one
//! it installed. A scope nested inside another therefore ends the outer
//! scope's override as well when it exits. The context is shared by every
//! clone of a profile and is not isolated between threads.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CacheError, CachingConfig, PluginRegistry, Result, ShareLock};

use super::{match_wildcard, validate_identifier_pattern};

/// Effective caching options after applying the context overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    pub default_enabled: bool,
    pub enabled_for: Vec<String>,
    pub disabled_for: Vec<String>,
}

#[derive(Debug, Default)]
struct Overrides {
    /// Global switch, takes precedence over everything else.
    all: Option<bool>,
    enabled: Vec<String>,
    disabled: Vec<String>,
}

/// Scoped overrides of the persisted caching configuration.
#[derive(Debug, Clone, Default)]
pub struct CachingContext {
    overrides: ShareLock<Overrides>,
}

impl CachingContext {
    pub fn new() -> Self {
        Self {
            overrides: Arc::new(RwLock::new(Overrides::default())),
        }
    }

    pub fn enable_all(&self) {
        let mut overrides = self.overrides.write().unwrap();
        *overrides = Overrides::default();
        overrides.all = Some(true);
    }

    pub fn disable_all(&self) {
        let mut overrides = self.overrides.write().unwrap();
        *overrides = Overrides::default();
        overrides.all = Some(false);
    }

    pub fn enable_by_identifier(
        &self,
        identifier: &str,
    ) {
        let mut overrides = self.overrides.write().unwrap();
        overrides.enabled.push(identifier.to_string());
        remove_first(&mut overrides.disabled, identifier);
    }

    pub fn disable_by_identifier(
        &self,
        identifier: &str,
    ) {
        let mut overrides = self.overrides.write().unwrap();
        overrides.disabled.push(identifier.to_string());
        remove_first(&mut overrides.enabled, identifier);
    }

    /// Drops every override.
    pub fn clear(&self) {
        *self.overrides.write().unwrap() = Overrides::default();
    }

    /// Merges `config` with the overrides and validates every resulting pattern.
    ///
    /// A malformed pattern is reported as a configuration error.
    pub fn get_options(
        &self,
        config: &CachingConfig,
        registry: &PluginRegistry,
        strict: bool,
    ) -> Result<CacheOptions> {
        let overrides = self.overrides.read().unwrap();
        match overrides.all {
            Some(true) => {
                return Ok(CacheOptions {
                    default_enabled: true,
                    ..Default::default()
                });
            }
            Some(false) => return Ok(CacheOptions::default()),
            None => {}
        }

        let mut enabled_for = config.enabled_for.clone();
        let mut disabled_for = config.disabled_for.clone();
        for identifier in &overrides.enabled {
            enabled_for.push(identifier.clone());
            remove_first(&mut disabled_for, identifier);
        }
        for identifier in &overrides.disabled {
            disabled_for.push(identifier.clone());
            remove_first(&mut enabled_for, identifier);
        }

        for identifier in enabled_for.iter().chain(&disabled_for) {
            validate_identifier_pattern(identifier, registry, strict)
                .map_err(|err| CacheError::Configuration(format!("invalid identifier pattern in enable or disable list: {}", err)))?;
        }

        Ok(CacheOptions {
            default_enabled: config.default_enabled,
            enabled_for,
            disabled_for,
        })
    }

    /// Enables caching for `identifier`, or for everything if `None`.
    pub fn enable_caching(
        &self,
        registry: &PluginRegistry,
        identifier: Option<&str>,
        strict: bool,
    ) -> Result<CachingGuard> {
        match identifier {
            Some(identifier) => {
                validate_identifier_pattern(identifier, registry, strict)?;
                self.enable_by_identifier(identifier);
            }
            None => self.enable_all(),
        }
        debug!("caching enabled for {}", identifier.unwrap_or("all"));
        Ok(CachingGuard { context: self.clone() })
    }

    /// Disables caching for `identifier`, or for everything if `None`.
    pub fn disable_caching(
        &self,
        registry: &PluginRegistry,
        identifier: Option<&str>,
        strict: bool,
    ) -> Result<CachingGuard> {
        match identifier {
            Some(identifier) => {
                validate_identifier_pattern(identifier, registry, strict)?;
                self.disable_by_identifier(identifier);
            }
            None => self.disable_all(),
        }
        debug!("caching disabled for {}", identifier.unwrap_or("all"));
        Ok(CachingGuard { context: self.clone() })
    }
}

/// Keeps an override active; clears all overrides of its context on drop.
#[must_use = "the override ends as soon as the guard is dropped"]
pub struct CachingGuard {
    context: CachingContext,
}

impl Drop for CachingGuard {
    fn drop(&mut self) {
        self.context.clear();
    }
}

fn remove_first(
    list: &mut Vec<String>,
    identifier: &str,
) {
    if let Some(pos) = list.iter().position(|item| item == identifier) {
        list.remove(pos);
    }
}

/// Whether caching is enabled for `identifier` under `options`.
///
/// Without an identifier the default applies. Otherwise the enabled and
/// disabled patterns matching the identifier are collected. If only one side
/// matches, it decides. If both do, the single most specific pattern wins: the
/// one that is itself matched by every other matching pattern. Having no such
/// pattern, or more than one, is a configuration error.
pub fn get_use_cache(
    options: &CacheOptions,
    identifier: Option<&str>,
) -> Result<bool> {
    let Some(identifier) = identifier else {
        return Ok(options.default_enabled);
    };

    let enable_matches: Vec<&str> = options.enabled_for.iter().map(String::as_str).filter(|p| match_wildcard(identifier, p)).collect();
    let disable_matches: Vec<&str> = options.disabled_for.iter().map(String::as_str).filter(|p| match_wildcard(identifier, p)).collect();

    match (enable_matches.is_empty(), disable_matches.is_empty()) {
        (true, true) => Ok(options.default_enabled),
        (false, true) => Ok(true),
        (true, false) => Ok(false),
        (false, false) => {
            let all_matches: Vec<&str> = enable_matches.iter().chain(&disable_matches).copied().collect();
            let most_specific: Vec<&str> = all_matches
                .iter()
                .copied()
                .filter(|pattern| all_matches.iter().all(|other| match_wildcard(pattern, other)))
                .collect();

            if let [pattern] = most_specific.as_slice() {
                return Ok(enable_matches.contains(pattern));
            }
            Err(CacheError::Configuration(format!(
                "invalid configuration for caching of '{}': cannot decide between the matching patterns {:?}, most specific: {:?}",
                identifier, all_matches, most_specific
            )))
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CacheOptions, CachingContext, get_use_cache};
    use crate::{CacheError, CachingConfig, PluginRegistry};

    fn options(
        default_enabled: bool,
        enabled_for: &[&str],
        disabled_for: &[&str],
    ) -> CacheOptions {
        CacheOptions {
            default_enabled,
            enabled_for: enabled_for.iter().map(|s| s.to_string()).collect(),
            disabled_for: disabled_for.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_default() {
        assert!(!get_use_cache(&options(false, &[], &[]), Some("a.b")).unwrap());
        assert!(get_use_cache(&options(true, &[], &[]), Some("a.b")).unwrap());
        assert!(get_use_cache(&options(true, &["x.*"], &["y.*"]), None).unwrap());
    }

    #[test]
    fn test_single_side() {
        let opts = options(false, &["aiida.calculations:core.*"], &["aiida.calculations:core.arithmetic.*"]);
        assert!(get_use_cache(&opts, Some("aiida.calculations:core.other.add")).unwrap());

        let opts = options(true, &[], &["aiida.calculations:*"]);
        assert!(!get_use_cache(&opts, Some("aiida.calculations:core.other.add")).unwrap());
    }

    #[test]
    fn test_more_specific_wins() {
        let opts = options(false, &["aiida.calculations:*"], &["aiida.calculations:core.*"]);
        assert!(!get_use_cache(&opts, Some("aiida.calculations:core.arithmetic.add")).unwrap());

        let opts = options(false, &["aiida.calculations:core.arithmetic.add"], &["aiida.calculations:*"]);
        assert!(get_use_cache(&opts, Some("aiida.calculations:core.arithmetic.add")).unwrap());
    }

    #[test]
    fn test_ambiguous() {
        let opts = options(false, &["a.b*"], &["a.*c"]);
        let err = get_use_cache(&opts, Some("a.bc")).unwrap_err();
        match err {
            CacheError::Configuration(msg) => {
                assert!(msg.contains("a.bc"));
                assert!(msg.contains("a.b*"));
                assert!(msg.contains("a.*c"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // same pattern on both sides
        let opts = options(false, &["a.*"], &["a.*"]);
        assert!(matches!(get_use_cache(&opts, Some("a.b")), Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_context_overrides() {
        let registry = PluginRegistry::new();
        let config = CachingConfig {
            default_enabled: false,
            enabled_for: vec![],
            disabled_for: vec!["a.b".to_string()],
        };
        let context = CachingContext::new();

        let guard = context.enable_caching(&registry, Some("a.b"), false).unwrap();
        let opts = context.get_options(&config, &registry, false).unwrap();
        assert_eq!(opts.enabled_for, vec!["a.b".to_string()]);
        assert!(opts.disabled_for.is_empty());
        drop(guard);

        let opts = context.get_options(&config, &registry, false).unwrap();
        assert_eq!(opts.disabled_for, vec!["a.b".to_string()]);
    }

    #[test]
    fn test_global_short_circuit() {
        let registry = PluginRegistry::new();
        let config = CachingConfig {
            default_enabled: false,
            enabled_for: vec![],
            disabled_for: vec!["a.b".to_string()],
        };
        let context = CachingContext::new();

        {
            let _guard = context.enable_caching(&registry, None, false).unwrap();
            let opts = context.get_options(&config, &registry, false).unwrap();
            assert!(get_use_cache(&opts, Some("a.b")).unwrap());
        }
        {
            let _guard = context.disable_caching(&registry, None, false).unwrap();
            let opts = context.get_options(&config, &registry, false).unwrap();
            assert!(!get_use_cache(&opts, Some("anything")).unwrap());
        }
        let opts = context.get_options(&config, &registry, false).unwrap();
        assert!(!get_use_cache(&opts, Some("a.b")).unwrap());
    }

    #[test]
    fn test_nested_scope_clears_outer_override() {
        let registry = PluginRegistry::new();
        let config = CachingConfig::default();
        let context = CachingContext::new();

        let outer = context.enable_caching(&registry, Some("x"), false).unwrap();
        assert!(get_use_cache(&context.get_options(&config, &registry, false).unwrap(), Some("x")).unwrap());
        {
            let _inner = context.disable_caching(&registry, Some("y"), false).unwrap();
            let opts = context.get_options(&config, &registry, false).unwrap();
            assert!(get_use_cache(&opts, Some("x")).unwrap());
            assert!(!get_use_cache(&opts, Some("y")).unwrap());
        }
        // the inner scope's exit cleared the outer override as well
        assert!(!get_use_cache(&context.get_options(&config, &registry, false).unwrap(), Some("x")).unwrap());
        drop(outer);
    }

    #[test]
    fn test_malformed_patterns() {
        let registry = PluginRegistry::new();
        let context = CachingContext::new();
        assert!(matches!(context.enable_caching(&registry, Some("a..b"), false), Err(CacheError::Value(_))));

        let config = CachingConfig {
            default_enabled: false,
            enabled_for: vec!["aiida.nothing:x".to_string()],
            disabled_for: vec![],
        };
        assert!(matches!(context.get_options(&config, &registry, false), Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_strict_resolution() {
        let mut registry = PluginRegistry::new();
        registry.register_entry_point("aiida.calculations", "core.arithmetic.add", None).unwrap();
        let context = CachingContext::new();

        assert!(context.enable_caching(&registry, Some("aiida.calculations:core.arithmetic.ad"), false).is_ok());
        context.clear();
        assert!(matches!(context.enable_caching(&registry, Some("aiida.calculations:core.arithmetic.ad"), true), Err(CacheError::Value(_))));
        let _guard = context.enable_caching(&registry, Some("aiida.calculations:core.arithmetic.add"), true).unwrap();
    }
}
