mod collect;
mod r#impl;

use std::{borrow::Cow, collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};
use collect::Collect;

/// In-memory backend.
///
/// All collections share one transaction stack, so concurrent transactions
/// from different threads are not isolated from each other.
#[derive(Debug, Clone)]
pub struct MemStore {
    nodes: Arc<Collect<NodeRecord>>,
    links: Arc<Collect<LinkRecord>>,
    objects: Arc<Collect<ObjectRecord>>,
}

trait DbDocument: Serialize + DeserializeOwned {
    fn id(&self) -> Cow<'_, str>;
    fn doc(&self) -> Result<HashMap<String, JsonValue>>;
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) {
        s.register(self.nodes());
        s.register(self.links());
        s.register(self.objects());
    }

    fn begin(&self) -> Result<()> {
        self.nodes.savepoint();
        self.links.savepoint();
        self.objects.savepoint();
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.nodes.release()?;
        self.links.release()?;
        self.objects.release()
    }

    fn rollback(&self) -> Result<()> {
        self.nodes.restore()?;
        self.links.restore()?;
        self.objects.restore()
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(Collect::new("nodes")),
            links: Arc::new(Collect::new("links")),
            objects: Arc::new(Collect::new("objects")),
        }
    }

    pub fn nodes(&self) -> Arc<dyn DbCollection<Item = NodeRecord> + Send + Sync> {
        self.nodes.clone()
    }

    pub fn links(&self) -> Arc<dyn DbCollection<Item = LinkRecord> + Send + Sync> {
        self.links.clone()
    }

    pub fn objects(&self) -> Arc<dyn DbCollection<Item = ObjectRecord> + Send + Sync> {
        self.objects.clone()
    }
}
