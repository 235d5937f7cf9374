//! Node caching.
//!
//! A stored node carries a content hash in its `_aiida_hash` extra. Before a
//! new node is stored, the hash is used to look up an equivalent stored node;
//! if caching is enabled for the node and one is found, the new node is
//! materialized as a copy of it instead of being computed afresh.
//!
//! - [`normalize`]: canonical form of attribute values
//! - [`make_hash`] and [`NodeCaching::get_hash`]: the hash engine
//! - [`get_use_cache`] and [`CachingContext`]: the cache policy
//! - [`NodeCaching::find_equivalent`]: lookup of an equivalent node
//! - [`Node::store_from_cache`]: materialization from a cache source

mod hash;
mod identifier;
mod lookup;
mod materialize;
mod normalize;
mod policy;

use tracing::{debug, warn};

use crate::{Node, Result, Value};

pub use hash::{HashErrors, make_hash};
pub use identifier::{match_wildcard, validate_identifier_pattern};
pub use normalize::{FIELD_SEPARATOR, clean_value, normalize, normalize_map, validate_key};
pub use policy::{CacheOptions, CachingContext, CachingGuard, get_use_cache};

/// Extra holding the hash of a stored node.
pub const HASH_EXTRA_KEY: &str = "_aiida_hash";
/// Extra holding the uuid of the node a node was cached from.
pub const CACHED_FROM_KEY: &str = "_aiida_cached_from";
/// Extra that, set to `false`, excludes a node from cache lookups.
pub const VALID_CACHE_KEY: &str = "_aiida_valid_cache";

/// Extras owned by the caching machinery, never carried over to clones.
pub const INTERNAL_EXTRAS: &[&str] = &[HASH_EXTRA_KEY, CACHED_FROM_KEY, VALID_CACHE_KEY];

/// Version of the hash layout. Bumping it invalidates every stored hash.
pub const CACHE_VERSION: i64 = 1;

/// Caching view of a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeCaching<'a> {
    node: &'a Node,
}

impl Node {
    pub fn caching(&self) -> NodeCaching<'_> {
        NodeCaching { node: self }
    }

    /// Recomputes the hash and writes it to the extras.
    pub fn rehash(&mut self) -> Result<()> {
        self.profile().hash_memo().remove(&self.uuid().to_string());
        let hash = self.caching().get_hash();
        match hash {
            Some(hash) => self.set_extra(HASH_EXTRA_KEY, hash),
            None if self.get_extra(HASH_EXTRA_KEY).is_some() => self.delete_extra(HASH_EXTRA_KEY),
            None => Ok(()),
        }
    }

    /// Blanks the stored hash so the node is no longer found by lookups.
    pub fn clear_hash(&mut self) -> Result<()> {
        self.profile().hash_memo().remove(&self.uuid().to_string());
        self.set_extra(HASH_EXTRA_KEY, "")
    }

    /// Marks the node as (in)valid cache source.
    pub fn set_is_valid_cache(
        &mut self,
        valid: bool,
    ) -> Result<()> {
        self.set_extra(VALID_CACHE_KEY, valid)
    }
}

impl<'a> NodeCaching<'a> {
    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// Whether the caching policy allows reusing an equivalent node for this one.
    ///
    /// The node's process type is the identifier the policy is evaluated for.
    pub fn should_use_cache(&self) -> Result<bool> {
        if !self.node.kind().is_cachable() {
            return Ok(false);
        }
        self.node.profile().get_use_cache(self.node.process_type(), false)
    }

    /// Whether the node may serve as cache source.
    ///
    /// Any node can be excluded through the `_aiida_valid_cache` extra.
    /// Process nodes must also be sealed and finished, and must pass the
    /// validity hook of the plugin their process type resolves to.
    pub fn is_valid_cache(&self) -> bool {
        let node = self.node;
        if node.get_extra(VALID_CACHE_KEY).and_then(Value::as_bool) == Some(false) {
            return false;
        }
        if !node.kind().is_process() {
            return true;
        }
        if !node.is_sealed() || !node.is_finished() {
            return false;
        }

        let Some(process_type) = node.process_type() else {
            warn!("node {}: no process type, not a valid cache source", node.uuid());
            return false;
        };
        match node.profile().registry().load(process_type) {
            Ok(plugin) => {
                let valid = plugin.is_valid_cache(node);
                if !valid {
                    debug!("node {}: rejected as cache source by {}", node.uuid(), process_type);
                }
                valid
            }
            Err(err) => {
                warn!("node {}: cannot load process type: {}", node.uuid(), err);
                false
            }
        }
    }

    /// Uuid of the node this node was cached from.
    pub fn get_cached_from(&self) -> Option<&'a str> {
        self.node.get_extra(CACHED_FROM_KEY).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        CALCFUNCTION_NODE_TYPE, CacheError, Config, ExitCodeValidity, LinkType, Node, PluginRegistry, ProcessState, Profile, ProfileBuilder, Value,
    };

    use super::{CACHED_FROM_KEY, HASH_EXTRA_KEY};

    const ADD: &str = "aiida.calculations:core.arithmetic.add";

    fn profile() -> Profile {
        let mut registry = PluginRegistry::new();
        registry.register_entry_point("aiida.calculations", "core.arithmetic.add", Some(Arc::new(ExitCodeValidity::new([410])))).unwrap();
        ProfileBuilder::new().registry(registry).build().unwrap()
    }

    fn int(
        profile: &Profile,
        value: i64,
    ) -> Node {
        let mut node = profile.new_node("data.core.int.Int.");
        node.set_attribute("value", value).unwrap();
        node.store().unwrap();
        node
    }

    fn calc(
        profile: &Profile,
        inputs: &[(&str, &Node)],
    ) -> Node {
        let mut node = profile.new_node(CALCFUNCTION_NODE_TYPE);
        node.set_process_type(Some(ADD)).unwrap();
        for (label, input) in inputs {
            node.add_incoming(input, LinkType::InputCalc, label).unwrap();
        }
        node
    }

    fn finish(
        node: &mut Node,
        exit_status: i64,
    ) {
        node.set_process_state(ProcessState::Finished).unwrap();
        node.set_exit_status(exit_status).unwrap();
        node.seal().unwrap();
    }

    #[test]
    fn test_hash_depends_on_inputs() {
        let profile = profile();
        let one = int(&profile, 1);
        let other_one = int(&profile, 1);
        let two = int(&profile, 2);

        let a = calc(&profile, &[("x", &one)]);
        let b = calc(&profile, &[("x", &other_one)]);
        let c = calc(&profile, &[("x", &two)]);
        let d = calc(&profile, &[("y", &one)]);
        assert!(a.caching().get_hash().is_some());
        assert_eq!(a.caching().get_hash(), b.caching().get_hash());
        assert_ne!(a.caching().get_hash(), c.caching().get_hash());
        assert_ne!(a.caching().get_hash(), d.caching().get_hash());
    }

    #[test]
    fn test_ignored_input_labels() {
        let profile = profile();
        let one = int(&profile, 1);
        let two = int(&profile, 2);
        let a = calc(&profile, &[("x", &one)]);
        let b = calc(&profile, &[("x", &one), ("CALL_CALC", &two)]);
        assert_eq!(a.caching().get_hash(), b.caching().get_hash());
    }

    #[test]
    fn test_is_valid_cache() {
        let profile = profile();
        let one = int(&profile, 1);
        assert!(one.caching().is_valid_cache());

        let mut node = calc(&profile, &[("x", &one)]);
        node.store().unwrap();
        assert!(!node.caching().is_valid_cache());
        finish(&mut node, 0);
        assert!(node.caching().is_valid_cache());
        node.set_is_valid_cache(false).unwrap();
        assert!(!node.caching().is_valid_cache());
        node.set_is_valid_cache(true).unwrap();
        assert!(node.caching().is_valid_cache());

        let mut failed = calc(&profile, &[("x", &one)]);
        failed.store().unwrap();
        finish(&mut failed, 410);
        assert!(!failed.caching().is_valid_cache());

        let mut unknown = profile.new_node(CALCFUNCTION_NODE_TYPE);
        unknown.set_process_type(Some("aiida.calculations:core.unknown")).unwrap();
        unknown.store().unwrap();
        finish(&mut unknown, 0);
        assert!(!unknown.caching().is_valid_cache());
    }

    #[test]
    fn test_equivalents_oldest_first() {
        let profile = profile();
        let one = int(&profile, 1);
        let mut first = calc(&profile, &[("x", &one)]);
        first.store().unwrap();
        finish(&mut first, 0);
        let mut second = calc(&profile, &[("x", &one)]);
        second.store().unwrap();
        finish(&mut second, 0);

        let candidate = calc(&profile, &[("x", &one)]);
        let found = candidate.caching().get_all_equivalents().unwrap();
        assert_eq!(found.iter().map(Node::uuid).collect::<Vec<_>>(), vec![first.uuid(), second.uuid()]);
        assert_eq!(candidate.caching().find_equivalent().unwrap().unwrap().uuid(), first.uuid());

        assert!(matches!(candidate.caching().get_all_same_nodes(), Err(CacheError::InvalidOperation(_))));
        assert_eq!(first.caching().get_all_same_nodes().unwrap().len(), 2);
    }

    #[test]
    fn test_equivalents_require_same_process_type() {
        let profile = profile();
        let one = int(&profile, 1);
        let mut source = calc(&profile, &[("x", &one)]);
        source.store().unwrap();
        finish(&mut source, 0);

        let mut candidate = profile.new_node(CALCFUNCTION_NODE_TYPE);
        candidate.set_process_type(Some("aiida.calculations:core.other")).unwrap();
        candidate.add_incoming(&one, LinkType::InputCalc, "x").unwrap();
        assert!(candidate.caching().find_equivalent().unwrap().is_none());
    }

    #[test]
    fn test_rehash_and_clear_hash() {
        let profile = profile();
        let mut node = int(&profile, 1);
        let hash = node.caching().get_hash().unwrap();
        assert_eq!(node.get_extra(HASH_EXTRA_KEY), Some(&Value::Str(hash.clone())));

        node.clear_hash().unwrap();
        assert_eq!(profile.stored_hash(node.uuid()).unwrap(), Some(String::new()));
        let mut candidate = profile.new_node("data.core.int.Int.");
        candidate.set_attribute("value", 1).unwrap();
        assert!(candidate.caching().find_equivalent().unwrap().is_none());

        node.rehash().unwrap();
        assert_eq!(profile.stored_hash(node.uuid()).unwrap(), Some(hash));
        assert_eq!(candidate.caching().find_equivalent().unwrap().unwrap().uuid(), node.uuid());
    }

    #[test]
    fn test_should_use_cache() {
        let profile = profile();
        let node = calc(&profile, &[]);
        assert!(!node.caching().should_use_cache().unwrap());
        {
            let _guard = profile.enable_caching(Some(ADD), false).unwrap();
            assert!(node.caching().should_use_cache().unwrap());
        }
        assert!(!node.caching().should_use_cache().unwrap());

        let mut workflow = profile.new_node(crate::WORKFUNCTION_NODE_TYPE);
        workflow.set_process_type(Some(ADD)).unwrap();
        let _guard = profile.enable_caching(None, false).unwrap();
        assert!(!workflow.caching().should_use_cache().unwrap());
        assert!(node.caching().should_use_cache().unwrap());
    }

    #[test]
    fn test_store_uses_cache() {
        let profile = profile();
        let one = int(&profile, 1);
        let mut source = calc(&profile, &[("x", &one)]);
        source.set_label("first").unwrap();
        source.store().unwrap();
        finish(&mut source, 0);

        let mut fresh = calc(&profile, &[("x", &one)]);
        fresh.store().unwrap();
        assert_eq!(fresh.caching().get_cached_from(), None);

        let _guard = profile.enable_caching(Some(ADD), false).unwrap();
        let mut cached = calc(&profile, &[("x", &one)]);
        cached.store().unwrap();
        assert!(cached.is_stored());
        assert_eq!(cached.caching().get_cached_from(), Some(source.uuid()));
        assert_eq!(cached.label(), "first");
        assert!(!cached.is_sealed());
        assert_eq!(cached.get_extra(CACHED_FROM_KEY), Some(&Value::Str(source.uuid().to_string())));
        assert_eq!(cached.caching().get_hash(), source.caching().get_hash());
        assert_eq!(cached.get_incoming(&LinkType::INPUTS).unwrap().len(), 1);

        let loaded = profile.load_node(cached.uuid()).unwrap();
        assert_eq!(loaded.caching().get_cached_from(), Some(source.uuid()));
    }

    #[test]
    fn test_unknown_process_type_is_never_a_source() {
        let profile = ProfileBuilder::new().config(Config::default()).build().unwrap();
        let mut source = profile.new_node(CALCFUNCTION_NODE_TYPE);
        source.set_process_type(Some(ADD)).unwrap();
        source.store().unwrap();
        finish(&mut source, 0);

        let _guard = profile.enable_caching(None, false).unwrap();
        let mut candidate = profile.new_node(CALCFUNCTION_NODE_TYPE);
        candidate.set_process_type(Some(ADD)).unwrap();
        candidate.store().unwrap();
        assert_eq!(candidate.caching().get_cached_from(), None);
    }
}
