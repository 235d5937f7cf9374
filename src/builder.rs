use std::sync::Arc;

use crate::{
    Config, PluginRegistry, Profile, Result, StoreType,
    store::{DbStore, MemStore},
};

pub struct ProfileBuilder {
    name: String,
    config: Config,
    registry: PluginRegistry,
    db: Option<Arc<dyn DbStore>>,
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            config: Config::default(),
            registry: PluginRegistry::new(),
            db: None,
        }
    }
}

impl ProfileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(
        mut self,
        name: &str,
    ) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn registry(
        mut self,
        registry: PluginRegistry,
    ) -> Self {
        self.registry = registry;
        self
    }

    /// Uses `db` instead of the backend selected by the store config.
    pub fn backend(
        mut self,
        db: Arc<dyn DbStore>,
    ) -> Self {
        self.db = Some(db);
        self
    }

    pub fn build(&self) -> Result<Profile> {
        let db = match &self.db {
            Some(db) => db.clone(),
            None => match self.config.store.store_type {
                StoreType::Mem => Arc::new(MemStore::new()) as Arc<dyn DbStore>,
            },
        };

        Ok(Profile::new(&self.name, self.config.clone(), self.registry.clone(), db))
    }
}
