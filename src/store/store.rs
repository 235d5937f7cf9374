use std::{
    any::Any,
    collections::HashMap,
    convert::AsRef,
    sync::{
        Arc, RwLock,
        atomic::{AtomicI64, Ordering},
    },
};

use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tracing::trace;

use crate::{CacheError, Result, ShareLock, utils};

use super::{
    DbCollection, DbCollectionIden, DbStore, StoreIden,
    data::*,
    query::{Order, Query},
};

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

/// Facade over a storage backend.
///
/// Besides typed access to the registered collections it offers the
/// operations the caching core consumes: storing a node with its links and
/// objects, querying nodes, and reading or writing extras and updatable
/// attributes of stored nodes.
pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
    db: ShareLock<Option<Arc<dyn DbStore>>>,
    next_pk: AtomicI64,
    next_link_id: AtomicI64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            db: Arc::new(RwLock::new(None)),
            next_pk: AtomicI64::new(1),
            next_link_id: AtomicI64::new(1),
        }
    }

    /// Creates a store and lets `db` register its collections.
    pub fn with_backend(db: Arc<dyn DbStore>) -> Self {
        let store = Self::new();
        db.init(&store);
        *store.db.write().unwrap() = Some(db);
        store
    }

    pub fn collection<DATA>(&self) -> Result<Arc<dyn DbCollection<Item = DATA>>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let collections = self.collections.read().unwrap();
        collections
            .get(&DATA::iden())
            .and_then(|collection| collection.downcast_ref::<DynDbSetRef<DATA>>())
            .map(|v| v.0.clone())
            .ok_or_else(|| CacheError::Store(format!("fail to get collection: {}", DATA::iden().as_ref())))
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        let mut collections = self.collections.write().unwrap();
        collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
    }

    pub fn nodes(&self) -> Result<Arc<dyn DbCollection<Item = NodeRecord>>> {
        self.collection()
    }

    pub fn links(&self) -> Result<Arc<dyn DbCollection<Item = LinkRecord>>> {
        self.collection()
    }

    pub fn objects(&self) -> Result<Arc<dyn DbCollection<Item = ObjectRecord>>> {
        self.collection()
    }

    /// Runs `f` inside a transaction, rolling back every write of `f` if it fails.
    ///
    /// Transactions may nest. They do not isolate concurrent writers.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let db = self.db.read().unwrap().clone().ok_or_else(|| CacheError::Store("store has no backend".to_string()))?;
        db.begin()?;
        match f() {
            Ok(value) => {
                db.commit()?;
                Ok(value)
            }
            Err(err) => {
                trace!("store::transaction rollback: {}", err);
                db.rollback()?;
                Err(err)
            }
        }
    }

    /// Persists a node record together with its incoming links and repository objects.
    ///
    /// Assigns and returns the pk. Objects already present are not rewritten.
    pub fn store_node(
        &self,
        mut record: NodeRecord,
        links: Vec<LinkRecord>,
        objects: Vec<ObjectRecord>,
    ) -> Result<i64> {
        trace!("store::store_node({}, {})", record.uuid, record.node_type);
        self.transaction(|| {
            let nodes = self.nodes()?;
            if nodes.exists(&record.uuid)? {
                return Err(CacheError::Store(format!("node {} is already stored", record.uuid)));
            }

            let collection = self.objects()?;
            for object in &objects {
                if !collection.exists(&object.key)? {
                    collection.create(object)?;
                }
            }

            record.pk = self.next_pk.fetch_add(1, Ordering::SeqCst);
            nodes.create(&record)?;

            let collection = self.links()?;
            for mut link in links {
                if !nodes.exists(&link.source)? {
                    return Err(CacheError::NotExistent(format!("link source {} is not stored", link.source)));
                }
                link.id = self.next_link_id.fetch_add(1, Ordering::SeqCst);
                link.target = record.uuid.clone();
                collection.create(&link)?;
            }

            Ok(record.pk)
        })
    }

    pub fn find_node(
        &self,
        uuid: &str,
    ) -> Result<NodeRecord> {
        self.nodes()?.find(uuid)
    }

    pub fn query_nodes(
        &self,
        query: &Query,
    ) -> Result<Vec<NodeRecord>> {
        self.nodes()?.query(query)
    }

    pub fn get_extra(
        &self,
        uuid: &str,
        key: &str,
    ) -> Result<Option<JsonValue>> {
        let record = self.find_node(uuid)?;
        Ok(record.extras.get(key).cloned())
    }

    pub fn set_extra(
        &self,
        uuid: &str,
        key: &str,
        value: JsonValue,
    ) -> Result<()> {
        trace!("store::set_extra({}, {})", uuid, key);
        self.update_node(uuid, |record| {
            object_mut(&mut record.extras, "extras")?.insert(key.to_string(), value);
            Ok(())
        })
    }

    pub fn delete_extra(
        &self,
        uuid: &str,
        key: &str,
    ) -> Result<()> {
        self.update_node(uuid, |record| {
            object_mut(&mut record.extras, "extras")?.remove(key);
            Ok(())
        })
    }

    pub fn get_attribute(
        &self,
        uuid: &str,
        key: &str,
    ) -> Result<Option<JsonValue>> {
        let record = self.find_node(uuid)?;
        Ok(record.attributes.get(key).cloned())
    }

    pub fn set_attribute_many(
        &self,
        uuid: &str,
        attributes: JsonMap<String, JsonValue>,
    ) -> Result<()> {
        trace!("store::set_attribute_many({}, {:?})", uuid, attributes.keys().collect::<Vec<_>>());
        self.update_node(uuid, |record| {
            object_mut(&mut record.attributes, "attributes")?.extend(attributes);
            Ok(())
        })
    }

    /// Links pointing at `uuid`, in creation order.
    pub fn incoming_links(
        &self,
        uuid: &str,
    ) -> Result<Vec<LinkRecord>> {
        self.links()?.query(&Query::new().filter("target", json!(uuid)).order_by("id", Order::Asc))
    }

    /// Links leaving `uuid`, in creation order.
    pub fn outgoing_links(
        &self,
        uuid: &str,
    ) -> Result<Vec<LinkRecord>> {
        self.links()?.query(&Query::new().filter("source", json!(uuid)).order_by("id", Order::Asc))
    }

    pub fn get_object(
        &self,
        key: &str,
    ) -> Result<Vec<u8>> {
        Ok(self.objects()?.find(key)?.content)
    }

    fn update_node(
        &self,
        uuid: &str,
        f: impl FnOnce(&mut NodeRecord) -> Result<()>,
    ) -> Result<()> {
        let nodes = self.nodes()?;
        let mut record = nodes.find(uuid)?;
        f(&mut record)?;
        record.mtime = utils::time::time_millis();
        nodes.update(&record)?;
        Ok(())
    }
}

fn object_mut<'a>(
    value: &'a mut JsonValue,
    field: &str,
) -> Result<&'a mut JsonMap<String, JsonValue>> {
    if value.is_null() {
        *value = JsonValue::Object(JsonMap::new());
    }
    value.as_object_mut().ok_or_else(|| CacheError::Store(format!("node {} is not a JSON object", field)))
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, sync::Arc};

    use serde_json::json;

    use crate::{
        CacheError,
        store::{MemStore, Store, data::*, query::Query},
    };

    fn record(uuid: &str) -> NodeRecord {
        NodeRecord {
            pk: 0,
            uuid: uuid.to_string(),
            node_type: "data.core.int.Int.".to_string(),
            process_type: None,
            label: String::new(),
            description: String::new(),
            computer: None,
            attributes: json!({"value": 1}),
            extras: json!({}),
            repository: BTreeMap::new(),
            ctime: 0,
            mtime: 0,
        }
    }

    fn link(source: &str) -> LinkRecord {
        LinkRecord {
            id: 0,
            source: source.to_string(),
            target: String::new(),
            link_type: "input_calc".to_string(),
            link_label: "x".to_string(),
        }
    }

    fn store() -> Store {
        Store::with_backend(Arc::new(MemStore::new()))
    }

    #[test]
    fn test_store_node_assigns_pk_and_links() {
        let store = store();
        let a = store.store_node(record("a"), vec![], vec![]).unwrap();
        let b = store.store_node(record("b"), vec![link("a")], vec![]).unwrap();
        assert!(b > a);

        let incoming = store.incoming_links("b").unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].target, "b");
        assert_eq!(store.outgoing_links("a").unwrap().len(), 1);
    }

    #[test]
    fn test_store_node_rolls_back() {
        let store = store();
        let object = ObjectRecord {
            key: "k".to_string(),
            content: b"bytes".to_vec(),
        };
        let err = store.store_node(record("b"), vec![link("missing")], vec![object]).unwrap_err();
        assert!(matches!(err, CacheError::NotExistent(_)));
        assert!(store.find_node("b").is_err());
        assert!(store.get_object("k").is_err());
    }

    #[test]
    fn test_nested_transaction_rollback() {
        let store = store();
        store
            .transaction(|| {
                store.store_node(record("a"), vec![], vec![])?;
                let inner: crate::Result<()> = store.transaction(|| {
                    store.store_node(record("b"), vec![], vec![])?;
                    Err(CacheError::Store("boom".to_string()))
                });
                assert!(inner.is_err());
                Ok(())
            })
            .unwrap();
        assert!(store.find_node("a").is_ok());
        assert!(store.find_node("b").is_err());
    }

    #[test]
    fn test_extras_and_attributes() {
        let store = store();
        store.store_node(record("a"), vec![], vec![]).unwrap();
        store.set_extra("a", "_aiida_hash", json!("abc")).unwrap();
        assert_eq!(store.get_extra("a", "_aiida_hash").unwrap(), Some(json!("abc")));

        let found = store.query_nodes(&Query::new().filter("extras._aiida_hash", json!("abc"))).unwrap();
        assert_eq!(found.len(), 1);

        store.delete_extra("a", "_aiida_hash").unwrap();
        assert_eq!(store.get_extra("a", "_aiida_hash").unwrap(), None);

        let mut attributes = serde_json::Map::new();
        attributes.insert("sealed".to_string(), json!(true));
        store.set_attribute_many("a", attributes).unwrap();
        assert_eq!(store.get_attribute("a", "sealed").unwrap(), Some(json!(true)));
        assert_eq!(store.get_attribute("a", "value").unwrap(), Some(json!(1)));
    }
}
