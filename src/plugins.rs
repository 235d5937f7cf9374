//! Registry of loadable plugins.
//!
//! Plugins are addressed either by an entry point string `group:name` or by a
//! dotted class path. The registry answers two questions for the caching
//! core: does an identifier refer to something that exists (strict identifier
//! validation), and does a process class accept a node as a cache source.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use crate::{CacheError, Node, Result};

/// Separator between group and name in an entry point string.
pub const ENTRY_POINT_STRING_SEPARATOR: char = ':';

/// Entry point groups known out of the box.
pub const ENTRY_POINT_GROUPS: &[&str] = &[
    "aiida.calculations",
    "aiida.calculations.importers",
    "aiida.calculations.monitors",
    "aiida.cmdline.computer.configure",
    "aiida.cmdline.data",
    "aiida.cmdline.data.structure.import",
    "aiida.data",
    "aiida.groups",
    "aiida.node",
    "aiida.parsers",
    "aiida.schedulers",
    "aiida.storage",
    "aiida.tools.calculations",
    "aiida.tools.data.orbitals",
    "aiida.tools.dbexporters",
    "aiida.tools.dbimporters",
    "aiida.transports",
    "aiida.workflows",
];

/// Validity hook of a process class.
///
/// Called for every stored, sealed and finished candidate whose
/// `process_type` resolves to the class; returning `false` excludes the node
/// from cache lookups.
pub trait CacheValidity: Send + Sync {
    fn is_valid_cache(
        &self,
        node: &Node,
    ) -> bool;
}

/// Rejects nodes that finished with one of the given exit statuses.
#[derive(Debug, Clone, Default)]
pub struct ExitCodeValidity {
    invalidating: BTreeSet<i64>,
}

impl ExitCodeValidity {
    pub fn new(invalidating: impl IntoIterator<Item = i64>) -> Self {
        Self {
            invalidating: invalidating.into_iter().collect(),
        }
    }
}

impl CacheValidity for ExitCodeValidity {
    fn is_valid_cache(
        &self,
        node: &Node,
    ) -> bool {
        node.exit_status().is_none_or(|status| !self.invalidating.contains(&status))
    }
}

/// A loaded plugin.
#[derive(Clone)]
pub struct Plugin {
    identifier: String,
    validity: Option<Arc<dyn CacheValidity>>,
}

impl fmt::Debug for Plugin {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Plugin").field("identifier", &self.identifier).field("has_validity", &self.validity.is_some()).finish()
    }
}

impl Plugin {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Plugins without a validity hook accept every node.
    pub fn is_valid_cache(
        &self,
        node: &Node,
    ) -> bool {
        self.validity.as_ref().is_none_or(|validity| validity.is_valid_cache(node))
    }
}

#[derive(Clone, Debug)]
pub struct PluginRegistry {
    groups: BTreeSet<String>,
    plugins: HashMap<String, Plugin>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            groups: ENTRY_POINT_GROUPS.iter().map(|g| g.to_string()).collect(),
            plugins: HashMap::new(),
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    pub fn add_group(
        &mut self,
        group: &str,
    ) {
        self.groups.insert(group.to_string());
    }

    /// Registers `group:name`. The group must be known.
    pub fn register_entry_point(
        &mut self,
        group: &str,
        name: &str,
        validity: Option<Arc<dyn CacheValidity>>,
    ) -> Result<()> {
        if !self.groups.contains(group) {
            return Err(CacheError::Value(format!("unknown entry point group '{}'", group)));
        }
        if name.is_empty() || name.contains(ENTRY_POINT_STRING_SEPARATOR) {
            return Err(CacheError::Value(format!("invalid entry point name '{}'", name)));
        }
        let identifier = format!("{}{}{}", group, ENTRY_POINT_STRING_SEPARATOR, name);
        self.plugins.insert(identifier.clone(), Plugin { identifier, validity });
        Ok(())
    }

    /// Registers a class by its dotted path.
    pub fn register_class(
        &mut self,
        path: &str,
        validity: Option<Arc<dyn CacheValidity>>,
    ) -> Result<()> {
        if path.is_empty() || path.contains(ENTRY_POINT_STRING_SEPARATOR) {
            return Err(CacheError::Value(format!("invalid class path '{}'", path)));
        }
        self.plugins.insert(path.to_string(), Plugin {
            identifier: path.to_string(),
            validity,
        });
        Ok(())
    }

    pub fn load(
        &self,
        identifier: &str,
    ) -> Result<Plugin> {
        self.plugins.get(identifier).cloned().ok_or_else(|| CacheError::NotExistent(format!("plugin '{}' is not registered", identifier)))
    }
}
