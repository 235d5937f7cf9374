use std::fmt;

use serde_json::Value as JsonValue;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    CacheError, Profile, Result,
    caching::{self, normalize_map, validate_key},
    store::data::{LinkRecord, NodeRecord, ObjectRecord},
    utils,
};

use super::{
    EXIT_STATUS_KEY, IntoValue, LinkTriple, LinkType, NodeKind, PROCESS_STATE_KEY, ProcessState, Repository, SEALED_KEY, Value, ValueMap,
};

/// A unit of data or process state in the provenance graph.
///
/// A node is created unstored, filled with attributes, extras, repository
/// content and incoming links, and then persisted with [`Node::store`]. Once
/// stored, attributes are immutable except for the updatable attributes of
/// its kind, which stay writable until the node is sealed. Extras are always
/// writable and are written through to the store.
#[derive(Clone)]
pub struct Node {
    profile: Profile,
    pk: Option<i64>,
    uuid: String,
    node_type: String,
    process_type: Option<String>,
    label: String,
    description: String,
    computer: Option<String>,
    attributes: ValueMap,
    extras: ValueMap,
    repository: Repository,
    incoming: Vec<LinkTriple>,
    ctime: i64,
    mtime: i64,
}

impl fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Node")
            .field("pk", &self.pk)
            .field("uuid", &self.uuid)
            .field("node_type", &self.node_type)
            .field("process_type", &self.process_type)
            .field("label", &self.label)
            .field("attributes", &self.attributes)
            .field("extras", &self.extras)
            .finish()
    }
}

impl Node {
    pub fn new(
        profile: &Profile,
        node_type: &str,
    ) -> Self {
        let now = utils::time::time_millis();
        Self {
            profile: profile.clone(),
            pk: None,
            uuid: Uuid::new_v4().to_string(),
            node_type: node_type.to_string(),
            process_type: None,
            label: String::new(),
            description: String::new(),
            computer: None,
            attributes: ValueMap::new(),
            extras: ValueMap::new(),
            repository: Repository::new(),
            incoming: Vec::new(),
            ctime: now,
            mtime: now,
        }
    }

    pub(crate) fn from_record(
        profile: &Profile,
        record: NodeRecord,
    ) -> Result<Self> {
        Ok(Self {
            profile: profile.clone(),
            pk: Some(record.pk),
            uuid: record.uuid,
            node_type: record.node_type,
            process_type: record.process_type,
            label: record.label,
            description: record.description,
            computer: record.computer,
            attributes: json_object(record.attributes, "attributes")?,
            extras: json_object(record.extras, "extras")?,
            repository: Repository::from_files(record.repository),
            incoming: Vec::new(),
            ctime: record.ctime,
            mtime: record.mtime,
        })
    }

    fn to_record(&self) -> Result<NodeRecord> {
        Ok(NodeRecord {
            pk: self.pk.unwrap_or_default(),
            uuid: self.uuid.clone(),
            node_type: self.node_type.clone(),
            process_type: self.process_type.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            computer: self.computer.clone(),
            attributes: Value::Map(self.attributes.clone()).to_json()?,
            extras: Value::Map(self.extras.clone()).to_json()?,
            repository: self.repository.files().clone(),
            ctime: self.ctime,
            mtime: self.mtime,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn pk(&self) -> Option<i64> {
        self.pk
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from_node_type(&self.node_type)
    }

    pub fn process_type(&self) -> Option<&str> {
        self.process_type.as_deref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn computer(&self) -> Option<&str> {
        self.computer.as_deref()
    }

    pub fn ctime(&self) -> i64 {
        self.ctime
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn is_stored(&self) -> bool {
        self.pk.is_some()
    }

    fn check_mutable(
        &self,
        what: &str,
    ) -> Result<()> {
        if self.is_stored() {
            return Err(CacheError::ModificationNotAllowed(format!("cannot set {} of stored node {}", what, self.uuid)));
        }
        Ok(())
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) -> Result<()> {
        self.check_mutable("label")?;
        self.label = label.to_string();
        Ok(())
    }

    pub fn set_description(
        &mut self,
        description: &str,
    ) -> Result<()> {
        self.check_mutable("description")?;
        self.description = description.to_string();
        Ok(())
    }

    pub fn set_process_type(
        &mut self,
        process_type: Option<&str>,
    ) -> Result<()> {
        self.check_mutable("process_type")?;
        self.process_type = process_type.map(str::to_string);
        Ok(())
    }

    /// Sets the uuid of the computer the node is associated with.
    pub fn set_computer(
        &mut self,
        computer: Option<&str>,
    ) -> Result<()> {
        self.check_mutable("computer")?;
        self.computer = computer.map(str::to_string);
        Ok(())
    }

    pub fn attributes(&self) -> &ValueMap {
        &self.attributes
    }

    pub fn get_attribute(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(
        &mut self,
        key: &str,
        value: impl IntoValue,
    ) -> Result<()> {
        let mut attributes = ValueMap::new();
        attributes.insert(key.to_string(), value.into_value());
        self.set_attribute_many(attributes)
    }

    /// Sets several attributes at once; on a stored node all of them must be updatable.
    pub fn set_attribute_many(
        &mut self,
        attributes: ValueMap,
    ) -> Result<()> {
        for key in attributes.keys() {
            validate_key(key)?;
            self.check_updatable(key)?;
        }

        if self.is_stored() {
            let cleaned = normalize_map(attributes)?;
            let mut json = serde_json::Map::new();
            for (key, value) in &cleaned {
                json.insert(key.clone(), value.to_json()?);
            }
            self.profile.store().set_attribute_many(&self.uuid, json)?;
            self.attributes.extend(cleaned);
            self.mtime = utils::time::time_millis();
        } else {
            self.attributes.extend(attributes);
        }
        Ok(())
    }

    pub fn delete_attribute(
        &mut self,
        key: &str,
    ) -> Result<()> {
        self.check_mutable("attributes")?;
        self.attributes
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| CacheError::NotExistent(format!("attribute '{}' does not exist", key)))
    }

    fn check_updatable(
        &self,
        key: &str,
    ) -> Result<()> {
        if !self.is_stored() {
            return Ok(());
        }
        if !self.kind().updatable_attributes().contains(&key) {
            return Err(CacheError::ModificationNotAllowed(format!(
                "attribute '{}' of stored node {} is immutable",
                key, self.uuid
            )));
        }
        if self.is_sealed() {
            return Err(CacheError::ModificationNotAllowed(format!("node {} is sealed", self.uuid)));
        }
        Ok(())
    }

    pub fn extras(&self) -> &ValueMap {
        &self.extras
    }

    pub fn get_extra(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Sets an extra, writing it through to the store if the node is stored.
    pub fn set_extra(
        &mut self,
        key: &str,
        value: impl IntoValue,
    ) -> Result<()> {
        validate_key(key)?;
        let value = value.into_value();
        if self.is_stored() {
            let value = caching::normalize(value)?;
            self.profile.store().set_extra(&self.uuid, key, value.to_json()?)?;
            self.extras.insert(key.to_string(), value);
        } else {
            self.extras.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn delete_extra(
        &mut self,
        key: &str,
    ) -> Result<()> {
        if self.extras.remove(key).is_none() {
            return Err(CacheError::NotExistent(format!("extra '{}' does not exist", key)));
        }
        if self.is_stored() {
            self.profile.store().delete_extra(&self.uuid, key)?;
        }
        Ok(())
    }

    /// Adds a link from `source` to this node. The source may still be unstored,
    /// but must be stored before this node is.
    pub fn add_incoming(
        &mut self,
        source: &Node,
        link_type: LinkType,
        link_label: &str,
    ) -> Result<()> {
        if self.is_stored() {
            return Err(CacheError::ModificationNotAllowed(format!("cannot add incoming links to stored node {}", self.uuid)));
        }
        if self.incoming.iter().any(|t| t.link_type == link_type && t.link_label == link_label) {
            return Err(CacheError::Value(format!(
                "node {} already has an incoming {} link with label '{}'",
                self.uuid,
                link_type.as_ref(),
                link_label
            )));
        }
        self.incoming.push(LinkTriple {
            node: source.clone(),
            link_type,
            link_label: link_label.to_string(),
        });
        Ok(())
    }

    /// Incoming links restricted to `link_types` (all types if empty).
    pub fn get_incoming(
        &self,
        link_types: &[LinkType],
    ) -> Result<Vec<LinkTriple>> {
        if !self.is_stored() {
            return Ok(self.incoming.iter().filter(|t| link_types.is_empty() || link_types.contains(&t.link_type)).cloned().collect());
        }
        let links = self.profile.store().incoming_links(&self.uuid)?;
        self.resolve_links(links, link_types, |link| &link.source)
    }

    /// Outgoing links restricted to `link_types` (all types if empty). Unstored nodes have none.
    pub fn get_outgoing(
        &self,
        link_types: &[LinkType],
    ) -> Result<Vec<LinkTriple>> {
        if !self.is_stored() {
            return Ok(Vec::new());
        }
        let links = self.profile.store().outgoing_links(&self.uuid)?;
        self.resolve_links(links, link_types, |link| &link.target)
    }

    fn resolve_links(
        &self,
        links: Vec<LinkRecord>,
        link_types: &[LinkType],
        other_end: impl Fn(&LinkRecord) -> &String,
    ) -> Result<Vec<LinkTriple>> {
        let mut triples = Vec::new();
        for link in links {
            let link_type: LinkType = link
                .link_type
                .parse()
                .map_err(|_| CacheError::Store(format!("unknown link type '{}' in store", link.link_type)))?;
            if !link_types.is_empty() && !link_types.contains(&link_type) {
                continue;
            }
            triples.push(LinkTriple {
                node: self.profile.load_node(other_end(&link))?,
                link_type,
                link_label: link.link_label,
            });
        }
        Ok(triples)
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn put_object_from_bytes(
        &mut self,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        self.check_mutable("repository content")?;
        self.repository.put_object_from_bytes(path, bytes)
    }

    pub fn get_object_content(
        &self,
        path: &str,
    ) -> Result<Vec<u8>> {
        let key = self
            .repository
            .get_key(path)
            .ok_or_else(|| CacheError::NotExistent(format!("no object at repository path '{}'", path)))?;
        match self.repository.sandbox_content(key) {
            Some(bytes) => Ok(bytes.as_ref().clone()),
            None => self.profile.store().get_object(key),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.get_attribute(SEALED_KEY).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Seals a process node, after which none of its attributes can change.
    pub fn seal(&mut self) -> Result<()> {
        if !self.kind().is_sealable() {
            return Err(CacheError::InvalidOperation(format!("node {} of type {} cannot be sealed", self.uuid, self.node_type)));
        }
        if self.is_sealed() {
            return Ok(());
        }
        self.set_attribute(SEALED_KEY, true)
    }

    pub fn process_state(&self) -> Option<ProcessState> {
        self.get_attribute(PROCESS_STATE_KEY).and_then(Value::as_str).and_then(|s| s.parse().ok())
    }

    pub fn set_process_state(
        &mut self,
        state: ProcessState,
    ) -> Result<()> {
        self.set_attribute(PROCESS_STATE_KEY, state.as_ref())
    }

    pub fn exit_status(&self) -> Option<i64> {
        self.get_attribute(EXIT_STATUS_KEY).and_then(Value::as_i64)
    }

    pub fn set_exit_status(
        &mut self,
        status: i64,
    ) -> Result<()> {
        self.set_attribute(EXIT_STATUS_KEY, status)
    }

    pub fn is_finished(&self) -> bool {
        self.process_state() == Some(ProcessState::Finished)
    }

    /// Finished with a zero (or absent) exit status.
    pub fn is_finished_ok(&self) -> bool {
        self.is_finished() && self.exit_status().unwrap_or(0) == 0
    }

    /// Returns an unstored copy with a fresh uuid: same content, no links,
    /// no caching bookkeeping extras.
    pub fn clone_unstored(&self) -> Node {
        let mut clone = Node::new(&self.profile, &self.node_type);
        clone.process_type = self.process_type.clone();
        clone.label = self.label.clone();
        clone.description = self.description.clone();
        clone.computer = self.computer.clone();
        clone.attributes = self.attributes.clone();
        clone.extras = self.extras.iter().filter(|(k, _)| !caching::INTERNAL_EXTRAS.contains(&k.as_str())).map(|(k, v)| (k.clone(), v.clone())).collect();
        clone.repository.copy_from(&self.repository);
        clone
    }

    /// Normalizes attributes and extras in place.
    pub(crate) fn clean_values(&mut self) -> Result<()> {
        let attributes = normalize_map(self.attributes.clone())?;
        let extras = normalize_map(self.extras.clone())?;
        self.attributes = attributes;
        self.extras = extras;
        Ok(())
    }

    fn verify_are_parents_stored(&self) -> Result<()> {
        for triple in &self.incoming {
            if !triple.node.is_stored() {
                return Err(CacheError::ModificationNotAllowed(format!(
                    "cannot store node {}: source {} of {} link '{}' is not stored",
                    self.uuid,
                    triple.node.uuid,
                    triple.link_type.as_ref(),
                    triple.link_label
                )));
            }
        }
        Ok(())
    }

    /// Stores the node, reusing an equivalent stored node if caching is enabled for it.
    ///
    /// Attributes are normalized before the hash is computed, the hash is
    /// written to the extras in the same transaction as the node itself.
    /// Storing an already stored node is a no-op.
    pub fn store(&mut self) -> Result<()> {
        if self.is_stored() {
            return Ok(());
        }
        trace!("node::store({}, {})", self.uuid, self.node_type);
        self.verify_are_parents_stored()?;

        let use_cache = self.caching().should_use_cache()?;
        self.clean_values()?;

        let same = if use_cache { self.caching().find_equivalent()? } else { None };
        match same {
            Some(source) => {
                debug!("node {}: storing from cache of {}", self.uuid, source.uuid);
                self.store_from_cache(&source)
            }
            None => self.store_fresh(false),
        }
    }

    /// Persists the node as is, computing and attaching its hash.
    pub(crate) fn store_fresh(
        &mut self,
        clean: bool,
    ) -> Result<()> {
        self.verify_are_parents_stored()?;
        let mut staged = self.clone();
        if clean {
            staged.clean_values()?;
        }

        let hash = staged.caching().get_hash();
        match hash {
            Some(hash) => staged.extras.insert(caching::HASH_EXTRA_KEY.to_string(), Value::Str(hash)),
            None => staged.extras.remove(caching::HASH_EXTRA_KEY),
        };
        staged.mtime = utils::time::time_millis();

        let objects = staged
            .repository
            .take_sandbox()
            .into_iter()
            .map(|(key, content)| ObjectRecord {
                key,
                content: content.as_ref().clone(),
            })
            .collect();
        let links = staged
            .incoming
            .iter()
            .map(|t| LinkRecord {
                id: 0,
                source: t.node.uuid.clone(),
                target: staged.uuid.clone(),
                link_type: t.link_type.as_ref().to_string(),
                link_label: t.link_label.clone(),
            })
            .collect();

        let pk = self.profile.store().store_node(staged.to_record()?, links, objects)?;
        staged.pk = Some(pk);
        staged.incoming.clear();
        *self = staged;
        Ok(())
    }

    pub(crate) fn insert_extra_unchecked(
        &mut self,
        key: &str,
        value: Value,
    ) {
        self.extras.insert(key.to_string(), value);
    }

    pub(crate) fn copy_content_from(
        &mut self,
        source: &Node,
    ) {
        self.label = source.label.clone();
        self.description = source.description.clone();
        self.repository.copy_from(&source.repository);
        for (key, value) in &source.attributes {
            if key != SEALED_KEY {
                self.attributes.insert(key.clone(), value.clone());
            }
        }
    }
}

fn json_object(
    value: JsonValue,
    field: &str,
) -> Result<ValueMap> {
    match Value::from(value) {
        Value::Map(map) => Ok(map),
        Value::Null => Ok(ValueMap::new()),
        other => Err(CacheError::Validation(format!("stored {} must be an object, got {}", field, other.type_name()))),
    }
}
