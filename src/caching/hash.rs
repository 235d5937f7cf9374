//! Hash engine.
//!
//! Digests are sha256 over a type-tagged encoding of the value tree: every
//! value contributes its type tag and its payload, containers contribute the
//! digests of their children. Mapping entries are sorted by key, so the
//! digest does not depend on insertion order, while sequences keep theirs.
//! Floats are rendered with 14 significant digits so that values differing
//! only by rounding noise hash equally.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{CacheError, LinkType, Result, Value, ValueMap};

use super::{CACHE_VERSION, NodeCaching, normalize};

/// What [`NodeCaching::compute_hash`] does when hashing fails.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HashErrors {
    /// Log the failure and return no hash; the node is simply not cachable.
    #[default]
    Ignore,
    /// Propagate the failure.
    Raise,
}

/// Hex digest of `value`.
pub fn make_hash(value: &Value) -> Result<String> {
    Ok(hex::encode(digest(value)?))
}

fn single_digest(
    type_tag: &str,
    payload: &[u8],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update((type_tag.len() as u32).to_le_bytes());
    hasher.update(type_tag.as_bytes());
    hasher.update(payload);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

fn float_to_text(f: f64) -> String {
    format!("{:.13e}", f)
}

fn digest(value: &Value) -> Result<[u8; 32]> {
    let tag = value.type_name();
    let digest = match value {
        Value::Null => single_digest(tag, &[]),
        Value::Bool(b) => single_digest(tag, &[*b as u8]),
        Value::Int(i) => single_digest(tag, i.to_string().as_bytes()),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(CacheError::Hashing(format!("cannot hash non-finite float {}", f)));
            }
            single_digest(tag, float_to_text(*f).as_bytes())
        }
        Value::Str(s) => single_digest(tag, s.as_bytes()),
        Value::List(items) => {
            let mut payload = Vec::with_capacity(items.len() * 32);
            for item in items {
                payload.extend_from_slice(&digest(item)?);
            }
            single_digest(tag, &payload)
        }
        Value::Map(map) => {
            let mut payload = Vec::with_capacity(map.len() * 64);
            // BTreeMap iterates in key order
            for (key, item) in map {
                payload.extend_from_slice(&single_digest("str", key.as_bytes()));
                payload.extend_from_slice(&digest(item)?);
            }
            single_digest(tag, &payload)
        }
    };
    Ok(digest)
}

impl NodeCaching<'_> {
    /// The objects the hash of the node is computed from, in order:
    ///
    /// 1. class marker: node type and cache version
    /// 2. normalized attributes without the ignored and updatable ones
    /// 3. repository descriptor
    /// 4. computer uuid or null
    /// 5. process nodes only: input link label to hash of the input node
    pub fn get_objects_to_hash(&self) -> Result<Vec<Value>> {
        let node = self.node;
        let kind = node.kind();

        let mut marker = ValueMap::new();
        marker.insert("class".to_string(), Value::Str(node.node_type().to_string()));
        marker.insert("version".to_string(), Value::Int(CACHE_VERSION));

        let mut attributes = ValueMap::new();
        for (key, value) in node.attributes() {
            if kind.is_hashed_attribute(key) {
                attributes.insert(key.clone(), normalize(value.clone())?);
            }
        }

        let mut objects = vec![
            Value::Map(marker),
            Value::Map(attributes),
            node.repository().descriptor(),
            node.computer().map(|uuid| Value::Str(uuid.to_string())).unwrap_or(Value::Null),
        ];

        if kind.is_process() {
            let mut inputs = ValueMap::new();
            for triple in node.get_incoming(&LinkType::INPUTS)? {
                if kind.hash_ignored_inputs().contains(&triple.link_label.as_str()) {
                    continue;
                }
                let hash = triple.node.caching().input_hash()?;
                inputs.insert(triple.link_label, Value::Str(hash));
            }
            objects.push(Value::Map(inputs));
        }

        Ok(objects)
    }

    /// Hash of the node, or `None` if hashing failed and `errors` is [`HashErrors::Ignore`].
    pub fn compute_hash(
        &self,
        errors: HashErrors,
    ) -> Result<Option<String>> {
        match self.get_objects_to_hash().and_then(|objects| make_hash(&Value::List(objects))) {
            Ok(hash) => Ok(Some(hash)),
            Err(err) => match errors {
                HashErrors::Ignore => {
                    warn!("failed to hash node {}: {}", self.node.uuid(), err);
                    Ok(None)
                }
                HashErrors::Raise => Err(err),
            },
        }
    }

    /// Hash of the node, `None` if it cannot be hashed.
    pub fn get_hash(&self) -> Option<String> {
        self.compute_hash(HashErrors::Ignore).ok().flatten()
    }

    /// Hash of a node used as input of a process, memoized for stored nodes.
    fn input_hash(&self) -> Result<String> {
        let node = self.node;
        let memo = node.profile().hash_memo();
        let key = node.uuid().to_string();
        if node.is_stored() {
            if let Some(hash) = memo.get(&key) {
                return Ok(hash);
            }
        }

        let hash = self
            .compute_hash(HashErrors::Raise)?
            .ok_or_else(|| CacheError::Hashing(format!("input node {} has no hash", node.uuid())))?;
        if node.is_stored() {
            memo.set(key, hash.clone());
        }
        Ok(hash)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::{HashErrors, make_hash};
    use crate::{CALCJOB_NODE_TYPE, CacheError, Config, Profile, Value};

    #[test]
    fn test_make_hash_is_order_insensitive_for_maps() {
        let a = Value::from(json!({"a": 1, "b": [1, 2]}));
        let b = Value::from(json!({"b": [1, 2], "a": 1}));
        assert_eq!(make_hash(&a).unwrap(), make_hash(&b).unwrap());
    }

    #[test]
    fn test_make_hash_is_order_sensitive_for_lists() {
        let a = Value::from(json!([1, 2]));
        let b = Value::from(json!([2, 1]));
        assert_ne!(make_hash(&a).unwrap(), make_hash(&b).unwrap());
    }

    #[test]
    fn test_make_hash_distinguishes_types() {
        assert_ne!(make_hash(&Value::Int(1)).unwrap(), make_hash(&Value::Float(1.0)).unwrap());
        assert_ne!(make_hash(&Value::Int(1)).unwrap(), make_hash(&Value::Str("1".into())).unwrap());
        assert_ne!(make_hash(&Value::Null).unwrap(), make_hash(&Value::Str(String::new())).unwrap());
        assert_ne!(
            make_hash(&Value::from(json!({"a": "b"}))).unwrap(),
            make_hash(&Value::from(json!(["a", "b"]))).unwrap()
        );
    }

    #[test]
    fn test_make_hash_float_precision() {
        assert_eq!(make_hash(&Value::Float(0.1 + 0.2)).unwrap(), make_hash(&Value::Float(0.3)).unwrap());
        assert_ne!(make_hash(&Value::Float(0.3)).unwrap(), make_hash(&Value::Float(0.31)).unwrap());
        assert!(matches!(make_hash(&Value::Float(f64::NAN)), Err(CacheError::Hashing(_))));
    }

    #[test]
    fn test_make_hash_is_stable() {
        // pinned so that an accidental change of the encoding is noticed
        let first = make_hash(&Value::from(json!({"x": 1}))).unwrap();
        let second = make_hash(&Value::from(json!({"x": 1}))).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_ignored_and_updatable_attributes() {
        let profile = Profile::new_with_config(Config::default()).unwrap();
        let mut a = profile.new_node(CALCJOB_NODE_TYPE);
        a.set_attribute("x", 1).unwrap();
        let mut b = a.clone_unstored();
        b.set_attribute("queue_name", "debug").unwrap();
        b.set_attribute("process_state", "finished").unwrap();
        assert_eq!(a.caching().get_hash(), b.caching().get_hash());

        b.set_attribute("x", 2).unwrap();
        assert_ne!(a.caching().get_hash(), b.caching().get_hash());
    }

    #[test]
    fn test_repository_and_computer_are_hashed() {
        let profile = Profile::new_with_config(Config::default()).unwrap();
        let mut a = profile.new_node("data.core.folder.FolderData.");
        a.set_attribute("x", 1).unwrap();
        a.put_object_from_bytes("in/file.txt", b"content".to_vec()).unwrap();

        let same = a.clone_unstored();
        assert_eq!(a.caching().get_hash(), same.caching().get_hash());

        let mut other_content = a.clone_unstored();
        other_content.put_object_from_bytes("in/file.txt", b"changed".to_vec()).unwrap();
        assert_ne!(a.caching().get_hash(), other_content.caching().get_hash());

        let mut extra_file = a.clone_unstored();
        extra_file.put_object_from_bytes("in/other.txt", b"content".to_vec()).unwrap();
        assert_ne!(a.caching().get_hash(), extra_file.caching().get_hash());

        let mut with_computer = a.clone_unstored();
        with_computer.set_computer(Some("5ed8a1b2-0000-4000-8000-000000000001")).unwrap();
        assert_ne!(a.caching().get_hash(), with_computer.caching().get_hash());

        let mut other_computer = a.clone_unstored();
        other_computer.set_computer(Some("5ed8a1b2-0000-4000-8000-000000000002")).unwrap();
        assert_ne!(with_computer.caching().get_hash(), other_computer.caching().get_hash());

        // same content stored later hashes the same
        a.store().unwrap();
        assert_eq!(a.caching().get_hash(), same.caching().get_hash());
    }

    #[test]
    fn test_hash_errors_policy() {
        let profile = Profile::new_with_config(Config::default()).unwrap();
        let mut node = profile.new_node("data.core.float.Float.");
        node.set_attribute("value", f64::INFINITY).unwrap();
        assert_eq!(node.caching().get_hash(), None);
        assert_eq!(node.caching().compute_hash(HashErrors::Ignore).unwrap(), None);
        assert!(matches!(node.caching().compute_hash(HashErrors::Raise), Err(CacheError::Validation(_))));
    }
}
