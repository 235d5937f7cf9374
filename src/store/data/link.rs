use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LinkRecord {
    /// Assigned by the store, in creation order.
    pub id: i64,
    pub source: String,
    pub target: String,
    pub link_type: String,
    pub link_label: String,
}

impl DbCollectionIden for LinkRecord {
    fn iden() -> StoreIden {
        StoreIden::Links
    }
}
