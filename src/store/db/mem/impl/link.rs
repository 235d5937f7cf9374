use std::{borrow::Cow, collections::HashMap};

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::LinkRecord, db::mem::DbDocument},
};

impl DbDocument for LinkRecord {
    fn id(&self) -> Cow<'_, str> {
        Cow::Owned(self.id.to_string())
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert("source".to_string(), json!(self.source.clone()));
        map.insert("target".to_string(), json!(self.target.clone()));
        map.insert("link_type".to_string(), json!(self.link_type.clone()));
        map.insert("link_label".to_string(), json!(self.link_label.clone()));
        Ok(map)
    }
}
