use serde_json::json;
use tracing::debug;

use crate::{
    CacheError, Node, Result,
    store::query::{Order, Query},
};

use super::{HASH_EXTRA_KEY, NodeCaching};

impl NodeCaching<'_> {
    /// Stored nodes equivalent to this one, oldest first.
    ///
    /// Candidates have exactly the same node type, the same hash and, for
    /// process nodes, the same process type, and must be valid cache sources.
    /// A node that is not cachable or cannot be hashed has no equivalents.
    pub fn get_all_equivalents(&self) -> Result<Vec<Node>> {
        let node = self.node;
        let kind = node.kind();
        if !kind.is_cachable() {
            return Ok(Vec::new());
        }
        let Some(hash) = self.get_hash() else {
            return Ok(Vec::new());
        };

        let mut query = Query::new()
            .filter("node_type", json!(node.node_type()))
            .filter(format!("extras.{}", HASH_EXTRA_KEY), json!(hash))
            .order_by("pk", Order::Asc);
        if kind.is_process() {
            query = query.filter("process_type", json!(node.process_type()));
        }

        let profile = node.profile();
        let mut equivalents = Vec::new();
        for record in profile.store().query_nodes(&query)? {
            let candidate = Node::from_record(profile, record)?;
            if candidate.is_stored() && candidate.caching().is_valid_cache() {
                equivalents.push(candidate);
            }
        }
        debug!("node {}: {} equivalent nodes for hash {}", node.uuid(), equivalents.len(), hash);
        Ok(equivalents)
    }

    /// The oldest valid equivalent node, if any.
    pub fn find_equivalent(&self) -> Result<Option<Node>> {
        Ok(self.get_all_equivalents()?.into_iter().next())
    }

    /// All stored nodes sharing the hash of this stored node, itself included if valid.
    pub fn get_all_same_nodes(&self) -> Result<Vec<Node>> {
        if !self.node.is_stored() {
            return Err(CacheError::InvalidOperation(format!(
                "node {} must be stored before looking up same nodes",
                self.node.uuid()
            )));
        }
        self.get_all_equivalents()
    }
}
