//! Field resolution for models and instances.
//!
//! A name resolves, in order, to a declared field, to a variant already materialized in
//! this scope, or to a new variant of the first dynamic base whose pattern accepts it.

use crate::field::FieldDescriptor;
use crate::model::instance::Instance;
use crate::model::registry::Registry;
use crate::model::{Model, ModelDef};
use crate::{debug, AppError};
use std::sync::Arc;

fn no_such_field(model: &str, name: &str) -> AppError {
    AppError::NoSuchField(format!("`{}` has no field and no dynamic field matching `{}`", model, name))
}

impl Registry {
    /// The dynamic base of `model` accepting `name`, memoized including misses.
    pub(crate) fn dynamic_match(&self, model: &ModelDef, name: &str) -> Result<Option<Arc<FieldDescriptor>>, AppError> {
        let key = (model.name().to_string(), name.to_string());
        if let Some(found) = self.matches.lock()?.get(&key) {
            return Ok(found.clone());
        }
        let mut found = None;
        if model.is_dynamic() {
            for base in model.dynamic_fields() {
                if base.accepts(name)? {
                    found = Some(Arc::clone(base));
                    break;
                }
            }
        }
        Ok(self.matches.lock()?.entry(key).or_insert(found).clone())
    }

    /// The class variant `name` of `base` on `model`, created once and propagated to every
    /// subclass through the subclass's own inherited copy of `base`.
    pub(crate) fn materialize_for_class(
        &self,
        model: &ModelDef,
        base: &Arc<FieldDescriptor>,
        name: &str,
    ) -> Result<Arc<FieldDescriptor>, AppError> {
        let key = (model.name().to_string(), name.to_string());
        if let Some(variant) = self.class_variants.lock()?.get(&key) {
            return Ok(Arc::clone(variant));
        }
        let created = Arc::new(base.create_variant(name, model.name())?);
        let variant = {
            let mut variants = self.class_variants.lock()?;
            match variants.get(&key) {
                Some(existing) => return Ok(Arc::clone(existing)),
                None => {
                    variants.insert(key, Arc::clone(&created));
                    created
                }
            }
        };
        if variant.relation().is_some() && !model.is_abstract() {
            self.register_reverse(model, &variant)?;
        }
        debug!("Materialized `{}` from `{}` on model `{}`", name, base.name(), model.name());

        for subclass in self.subclasses(model.name()).to_vec() {
            let sub_def = self.model(&subclass)?;
            if let Some(sub_base) = sub_def.field(base.name()) {
                self.materialize_for_class(sub_def, sub_base, name)?;
            }
        }
        Ok(variant)
    }

    pub fn class_variant(&self, model: &str, name: &str) -> Result<Option<Arc<FieldDescriptor>>, AppError> {
        Ok(self.class_variants.lock()?.get(&(model.to_string(), name.to_string())).cloned())
    }
}

impl Model {
    pub(crate) fn resolve_class_field(&self, name: &str) -> Result<Arc<FieldDescriptor>, AppError> {
        let def = self.def();
        if let Some(field) = def.field(name) {
            return Ok(Arc::clone(field));
        }
        let registry = self.registry();
        if let Some(variant) = registry.class_variant(def.name(), name)? {
            return Ok(variant);
        }
        match registry.dynamic_match(def, name)? {
            Some(base) => registry.materialize_for_class(def, &base, name),
            None => Err(no_such_field(def.name(), name)),
        }
    }
}

impl Instance {
    pub(crate) fn resolve_field(&self, name: &str) -> Result<Arc<FieldDescriptor>, AppError> {
        let model = self.model();
        let def = model.def();
        if let Some(field) = def.field(name) {
            return Ok(Arc::clone(field));
        }
        if let Some(field) = self.attached(name)? {
            return Ok(field);
        }
        let registry = model.registry();
        let base = registry.dynamic_match(def, name)?.ok_or_else(|| no_such_field(def.name(), name))?;
        let class_variant = registry.materialize_for_class(def, &base, name)?;
        self.attach(Arc::new(class_variant.instance_copy()))
    }
}
