use std::{borrow::Cow, collections::HashMap};

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::ObjectRecord, db::mem::DbDocument},
};

impl DbDocument for ObjectRecord {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.key)
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("key".to_string(), json!(self.key.clone()));
        map.insert("size".to_string(), json!(self.content.len()));
        Ok(map)
    }
}
