use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use tracing::trace;

use crate::{
    CacheError, Result, ShareLock,
    store::{DbCollection, query::Query},
};

use super::DbDocument;

/// Prior values of the rows touched since a savepoint; `None` marks a row that did not exist.
type UndoLog<T> = BTreeMap<String, Option<T>>;

/// In-memory collection of documents keyed by id.
///
/// Each savepoint is an undo log holding the previous value of every row
/// written after it, stacked for nested transactions.
#[derive(Debug, Clone)]
pub struct Collect<T> {
    name: String,
    rows: ShareLock<BTreeMap<String, T>>,
    savepoints: ShareLock<Vec<UndoLog<T>>>,
}

impl<T> Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            savepoints: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn savepoint(&self) {
        self.savepoints.write().unwrap().push(UndoLog::new());
    }

    /// Closes the innermost savepoint, handing its undo entries to the enclosing one.
    pub fn release(&self) -> Result<()> {
        let mut savepoints = self.savepoints.write().unwrap();
        let log = savepoints.pop().ok_or_else(|| CacheError::Store(format!("{}: commit without transaction", self.name)))?;
        if let Some(outer) = savepoints.last_mut() {
            for (id, prior) in log {
                outer.entry(id).or_insert(prior);
            }
        }
        Ok(())
    }

    /// Undoes every write since the innermost savepoint.
    pub fn restore(&self) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        let log = self
            .savepoints
            .write()
            .unwrap()
            .pop()
            .ok_or_else(|| CacheError::Store(format!("{}: rollback without transaction", self.name)))?;
        for (id, prior) in log {
            match prior {
                Some(row) => rows.insert(id, row),
                None => rows.remove(&id),
            };
        }
        Ok(())
    }

    /// Remembers the current value of `id` in the innermost savepoint, once per savepoint.
    fn record(
        &self,
        rows: &BTreeMap<String, T>,
        id: &str,
    ) {
        if let Some(log) = self.savepoints.write().unwrap().last_mut() {
            if !log.contains_key(id) {
                log.insert(id.to_string(), rows.get(id).cloned());
            }
        }
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        Ok(self.rows.read().unwrap().contains_key(id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        self.rows
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::NotExistent(format!("{}: no record with id '{}'", self.name, id)))
    }

    fn query(
        &self,
        query: &Query,
    ) -> Result<Vec<Self::Item>> {
        trace!("collect::query({}, {:?})", self.name, query.filters());
        let rows = self.rows.read().unwrap();
        let mut matched = Vec::new();
        for item in rows.values() {
            let doc = item.doc()?;
            if query.matches(&doc) {
                matched.push((doc, item.clone()));
            }
        }
        matched.sort_by(|(a, _), (b, _)| query.compare(a, b));

        let limit = query.max_rows().unwrap_or(matched.len());
        Ok(matched.into_iter().take(limit).map(|(_, item)| item).collect())
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        let id = data.id();
        if rows.contains_key(id.as_ref()) {
            return Err(CacheError::Store(format!("{}: duplicate id '{}'", self.name, id)));
        }
        self.record(&rows, &id);
        rows.insert(id.into_owned(), data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        let id = data.id();
        if !rows.contains_key(id.as_ref()) {
            return Err(CacheError::NotExistent(format!("{}: no record with id '{}'", self.name, id)));
        }
        self.record(&rows, &id);
        rows.insert(id.into_owned(), data.clone());
        Ok(true)
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap();
        self.record(&rows, id);
        Ok(rows.remove(id).is_some())
    }
}

#[cfg(test)]
mod test {
    use super::Collect;
    use crate::store::{DbCollection, data::ObjectRecord};

    fn object(
        key: &str,
        content: &[u8],
    ) -> ObjectRecord {
        ObjectRecord {
            key: key.to_string(),
            content: content.to_vec(),
        }
    }

    #[test]
    fn test_restore_undoes_writes() {
        let objects: Collect<ObjectRecord> = Collect::new("objects");
        objects.create(&object("a", b"one")).unwrap();

        objects.savepoint();
        objects.update(&object("a", b"two")).unwrap();
        objects.update(&object("a", b"three")).unwrap();
        objects.create(&object("b", b"b")).unwrap();
        objects.restore().unwrap();

        assert_eq!(objects.find("a").unwrap().content, b"one");
        assert!(!objects.exists("b").unwrap());
    }

    #[test]
    fn test_released_savepoint_is_undone_by_outer() {
        let objects: Collect<ObjectRecord> = Collect::new("objects");
        objects.create(&object("a", b"one")).unwrap();

        objects.savepoint();
        objects.create(&object("b", b"b")).unwrap();
        objects.savepoint();
        objects.update(&object("a", b"two")).unwrap();
        objects.delete("b").unwrap();
        objects.create(&object("c", b"c")).unwrap();
        objects.release().unwrap();
        assert_eq!(objects.find("a").unwrap().content, b"two");
        objects.restore().unwrap();

        assert_eq!(objects.find("a").unwrap().content, b"one");
        assert!(!objects.exists("b").unwrap());
        assert!(!objects.exists("c").unwrap());
    }

    #[test]
    fn test_delete_is_restored() {
        let objects: Collect<ObjectRecord> = Collect::new("objects");
        objects.create(&object("a", b"one")).unwrap();
        objects.savepoint();
        assert!(objects.delete("a").unwrap());
        objects.restore().unwrap();
        assert_eq!(objects.find("a").unwrap().content, b"one");
        assert!(objects.release().is_err());
    }
}
