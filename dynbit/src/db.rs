use crate::logger;
use crate::model::registry::Registry;
use crate::model::Model;
use crate::settings::AppConfig;
use crate::storage::Storage;
use crate::{info, AppError};
use std::sync::Arc;

struct DbInner {
    storage: Storage,
    registry: Registry,
}

/// Storage plus the registry of models living in it. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    pub fn new(storage: Storage, registry: Registry) -> Db {
        Db { inner: Arc::new(DbInner { storage, registry }) }
    }

    pub fn from_config(config: &AppConfig, registry: Registry) -> Result<Db, AppError> {
        logger::set_level(config.logging.level);
        let storage = Storage::from_settings(&config.storage)?;
        info!(
            "Db ready with namespace `{}` at {}",
            storage.namespace(),
            storage.path().map(|p| p.display().to_string()).unwrap_or_else(|| "memory".to_string())
        );
        Ok(Db::new(storage, registry))
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn model(&self, name: &str) -> Result<Model, AppError> {
        let def = self.inner.registry.model(name)?;
        Ok(Model::new(self.clone(), Arc::clone(def)))
    }
}
