//! File hierarchy attached to a node.
//!
//! Files are addressed by the sha256 digest of their content. A repository
//! only maps relative paths to content keys; the bytes of an unstored node sit
//! in a sandbox until the node is stored, after which they live in the object
//! collection of the store and are shared by every node referencing the key.

use std::{collections::BTreeMap, sync::Arc};

use sha2::{Digest, Sha256};

use crate::{CacheError, Result};

use super::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Repository {
    files: BTreeMap<String, String>,
    sandbox: BTreeMap<String, Arc<Vec<u8>>>,
}

/// Content key of a byte string.
pub fn content_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        return Err(CacheError::Value(format!("invalid repository path '{}': must be a relative file path", path)));
    }
    if path.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(CacheError::Value(format!("invalid repository path '{}': empty or relative component", path)));
    }
    Ok(())
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a repository from a stored file map.
    pub fn from_files(files: BTreeMap<String, String>) -> Self {
        Self {
            files,
            sandbox: BTreeMap::new(),
        }
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn list_object_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn get_key(
        &self,
        path: &str,
    ) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Puts `bytes` under `path`, replacing any previous file, and returns the content key.
    pub fn put_object_from_bytes(
        &mut self,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        validate_path(path)?;
        let key = content_key(&bytes);
        self.sandbox.insert(key.clone(), Arc::new(bytes));
        self.files.insert(path.to_string(), key.clone());
        Ok(key)
    }

    /// Bytes still held in the sandbox for `key`.
    pub fn sandbox_content(
        &self,
        key: &str,
    ) -> Option<Arc<Vec<u8>>> {
        self.sandbox.get(key).cloned()
    }

    /// Removes the sandbox, returning only the objects still referenced by a path.
    pub fn take_sandbox(&mut self) -> Vec<(String, Arc<Vec<u8>>)> {
        let sandbox = std::mem::take(&mut self.sandbox);
        let referenced: std::collections::BTreeSet<&String> = self.files.values().collect();
        sandbox.into_iter().filter(|(key, _)| referenced.contains(key)).collect()
    }

    /// Makes this repository an alias of `other`, without copying stored bytes.
    pub fn copy_from(
        &mut self,
        other: &Repository,
    ) {
        self.files = other.files.clone();
        self.sandbox = other.sandbox.clone();
    }

    /// Descriptor of the hierarchy used for hashing: path to content key.
    pub fn descriptor(&self) -> Value {
        Value::Map(self.files.iter().map(|(path, key)| (path.clone(), Value::Str(key.clone()))).collect())
    }
}
