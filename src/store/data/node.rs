use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeRecord {
    pub pk: i64,
    pub uuid: String,
    pub node_type: String,
    pub process_type: Option<String>,
    pub label: String,
    pub description: String,
    pub computer: Option<String>,

    /// JSON object of attributes.
    pub attributes: JsonValue,
    /// JSON object of extras.
    pub extras: JsonValue,
    /// Repository path to content key.
    pub repository: BTreeMap<String, String>,

    pub ctime: i64,
    pub mtime: i64,
}

impl DbCollectionIden for NodeRecord {
    fn iden() -> StoreIden {
        StoreIden::Nodes
    }
}
