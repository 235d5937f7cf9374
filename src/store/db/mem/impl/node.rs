use std::{borrow::Cow, collections::HashMap};

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::NodeRecord, db::mem::DbDocument},
};

impl DbDocument for NodeRecord {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.uuid)
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("pk".to_string(), json!(self.pk));
        map.insert("uuid".to_string(), json!(self.uuid.clone()));
        map.insert("node_type".to_string(), json!(self.node_type.clone()));
        map.insert("process_type".to_string(), json!(self.process_type.clone()));
        map.insert("label".to_string(), json!(self.label.clone()));
        map.insert("computer".to_string(), json!(self.computer.clone()));
        map.insert("attributes".to_string(), self.attributes.clone());
        map.insert("extras".to_string(), self.extras.clone());
        map.insert("ctime".to_string(), json!(self.ctime));
        map.insert("mtime".to_string(), json!(self.mtime));
        Ok(map)
    }
}
