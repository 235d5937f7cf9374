//! Profile - the shared handle every node is bound to.
//!
//! A profile bundles what the caching core needs beyond the node itself:
//! - the persisted configuration (including the caching options)
//! - the storage backend
//! - the plugin registry
//! - the caching context holding scoped enable/disable overrides
//! - a memo of hashes of stored nodes

use std::sync::{Arc, RwLock};

use serde_json::{Value as JsonValue, json};
use tracing::{debug, info};

use crate::{
    Config, Node, PluginRegistry, Result, ShareLock,
    caching::{CacheOptions, CachingContext, CachingGuard, HASH_EXTRA_KEY, get_use_cache},
    common::MemCache,
    store::{
        DbStore, Store,
        query::{Order, Query},
    },
};

/// Cheaply clonable handle; clones share all state.
#[derive(Clone)]
pub struct Profile {
    name: Arc<str>,
    config: ShareLock<Config>,
    store: Arc<Store>,
    registry: Arc<PluginRegistry>,
    context: CachingContext,
    hashes: Arc<MemCache<String, String>>,
}

impl Profile {
    pub(crate) fn new(
        name: &str,
        config: Config,
        registry: PluginRegistry,
        db: Arc<dyn DbStore>,
    ) -> Self {
        let hashes = MemCache::new(config.store.hash_cache_capacity);
        Self {
            name: name.into(),
            config: Arc::new(RwLock::new(config)),
            store: Arc::new(Store::with_backend(db)),
            registry: Arc::new(registry),
            context: CachingContext::new(),
            hashes: Arc::new(hashes),
        }
    }

    /// Creates a profile with an in-memory store and the default registry.
    pub fn new_with_config(config: Config) -> Result<Self> {
        crate::ProfileBuilder::new().config(config).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.config.read().unwrap().clone()
    }

    /// Sets a config option by its dotted name, e.g. `caching.enabled_for`.
    pub fn set_option(
        &self,
        name: &str,
        value: JsonValue,
    ) -> Result<()> {
        info!("profile {}: set option {} = {}", self.name, name, value);
        self.config.write().unwrap().set_option(name, value)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn caching_context(&self) -> &CachingContext {
        &self.context
    }

    pub(crate) fn hash_memo(&self) -> &MemCache<String, String> {
        &self.hashes
    }

    /// Creates a new unstored node of `node_type`.
    pub fn new_node(
        &self,
        node_type: &str,
    ) -> Node {
        Node::new(self, node_type)
    }

    pub fn load_node(
        &self,
        uuid: &str,
    ) -> Result<Node> {
        let record = self.store.find_node(uuid)?;
        Node::from_record(self, record)
    }

    /// Effective caching options: persisted config with the context overrides applied.
    pub fn caching_options(
        &self,
        strict: bool,
    ) -> Result<CacheOptions> {
        let config = self.config.read().unwrap().caching.clone();
        self.context.get_options(&config, &self.registry, strict)
    }

    /// Whether caching is enabled for `identifier` (or the default, if `None`).
    pub fn get_use_cache(
        &self,
        identifier: Option<&str>,
        strict: bool,
    ) -> Result<bool> {
        let options = self.caching_options(strict)?;
        let use_cache = get_use_cache(&options, identifier)?;
        debug!("profile {}: use cache for {:?}: {}", self.name, identifier, use_cache);
        Ok(use_cache)
    }

    /// Enables caching for `identifier`, or for everything if `None`, until the guard drops.
    pub fn enable_caching(
        &self,
        identifier: Option<&str>,
        strict: bool,
    ) -> Result<CachingGuard> {
        self.context.enable_caching(&self.registry, identifier, strict)
    }

    /// Disables caching for `identifier`, or for everything if `None`, until the guard drops.
    pub fn disable_caching(
        &self,
        identifier: Option<&str>,
        strict: bool,
    ) -> Result<CachingGuard> {
        self.context.disable_caching(&self.registry, identifier, strict)
    }

    /// Recomputes the hash of every stored node, optionally only of one exact node type.
    ///
    /// Returns the number of rehashed nodes.
    pub fn rehash_all(
        &self,
        node_type: Option<&str>,
    ) -> Result<usize> {
        let mut query = Query::new().order_by("pk", Order::Asc);
        if let Some(node_type) = node_type {
            query = query.filter("node_type", json!(node_type));
        }

        self.hashes.clear();
        let records = self.store.query_nodes(&query)?;
        let count = records.len();
        for record in records {
            let mut node = Node::from_record(self, record)?;
            node.rehash()?;
        }
        info!("profile {}: rehashed {} nodes", self.name, count);
        Ok(count)
    }

    /// Stored hash of `uuid`, if any.
    pub fn stored_hash(
        &self,
        uuid: &str,
    ) -> Result<Option<String>> {
        Ok(self.store.get_extra(uuid, HASH_EXTRA_KEY)?.and_then(|v| v.as_str().map(str::to_string)))
    }
}
