use tracing::{debug, info};

use crate::{CacheError, LinkType, Node, Result, Value};

use super::CACHED_FROM_KEY;

impl Node {
    /// Stores this node as a copy of the stored, equivalent `source`.
    ///
    /// Label, description, repository and attributes (except the seal) are
    /// taken from `source`, the uuid of `source` is recorded in the
    /// `_aiida_cached_from` extra, and every node `source` created is cloned
    /// and linked to this node. All of it happens in one transaction; on
    /// failure this node stays unstored and unchanged.
    pub fn store_from_cache(
        &mut self,
        source: &Node,
    ) -> Result<()> {
        if self.is_stored() {
            return Err(CacheError::InvalidOperation(format!("node {} is already stored", self.uuid())));
        }
        if source.node_type() != self.node_type() {
            return Err(CacheError::Value(format!(
                "cannot store node of type {} from cache of type {}",
                self.node_type(),
                source.node_type()
            )));
        }
        if !source.is_stored() {
            return Err(CacheError::Value(format!("cache source {} is not stored", source.uuid())));
        }
        if !source.get_outgoing(&[LinkType::Return])?.is_empty() {
            return Err(CacheError::Value("Cannot use cache from nodes with RETURN links.".to_string()));
        }

        let mut staged = self.clone();
        staged.copy_content_from(source);
        staged.insert_extra_unchecked(CACHED_FROM_KEY, Value::Str(source.uuid().to_string()));

        let store = self.profile().store().clone();
        let outputs = store.transaction(|| {
            staged.store_fresh(false)?;
            staged.clone_outputs(source)
        })?;

        info!("node {}: stored from cache of {} with {} cloned outputs", staged.uuid(), source.uuid(), outputs.len());
        *self = staged;
        Ok(())
    }

    /// Clones every node `source` created and links the clones as created by this node.
    pub fn clone_outputs(
        &self,
        source: &Node,
    ) -> Result<Vec<Node>> {
        let mut outputs = Vec::new();
        for triple in source.get_outgoing(&[LinkType::Create])? {
            let mut output = triple.node.clone_unstored();
            output.add_incoming(self, LinkType::Create, &triple.link_label)?;
            output.store()?;
            debug!("node {}: cloned output '{}' {} -> {}", self.uuid(), triple.link_label, triple.node.uuid(), output.uuid());
            outputs.push(output);
        }
        Ok(outputs)
    }
}
