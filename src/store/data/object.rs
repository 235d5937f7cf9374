use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ObjectRecord {
    /// sha256 hex digest of `content`.
    pub key: String,
    pub content: Vec<u8>,
}

impl DbCollectionIden for ObjectRecord {
    fn iden() -> StoreIden {
        StoreIden::Objects
    }
}
