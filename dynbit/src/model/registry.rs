//! The set of models known to a [`crate::Db`] plus the lazily filled state of dynamic fields.
//!
//! Models are fixed once the registry is built. The caches only ever grow: every entry is
//! computed once from immutable declarations and lives as long as the registry.

use crate::field::FieldDescriptor;
use crate::model::builder::ModelBuilder;
use crate::model::ModelDef;
use crate::{info, AppError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Model declaration submitted with `inventory::submit!` and picked up by [`Registry::discover`].
pub struct ModelInfo {
    pub name: &'static str,
    pub define_fn: fn() -> ModelBuilder,
}

impl ModelInfo {
    pub const fn new(name: &'static str, define_fn: fn() -> ModelBuilder) -> ModelInfo {
        ModelInfo { name, define_fn }
    }
}

inventory::collect!(ModelInfo);

/// Where a reverse collection on a related model reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseRef {
    pub forward_model: String,
    pub field: String,
    /// The field is a dynamic base: callers must supply the variable part.
    pub dynamic: bool,
}

pub(crate) type FieldCacheKey = (String, String);

pub struct Registry {
    models: HashMap<String, Arc<ModelDef>>,
    order: Vec<String>,
    subclasses: HashMap<String, Vec<String>>,
    pub(crate) class_variants: Mutex<HashMap<FieldCacheKey, Arc<FieldDescriptor>>>,
    pub(crate) matches: Mutex<HashMap<FieldCacheKey, Option<Arc<FieldDescriptor>>>>,
    reverse: Mutex<HashMap<FieldCacheKey, ReverseRef>>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    models: Vec<ModelBuilder>,
}

impl RegistryBuilder {
    pub fn model(mut self, model: ModelBuilder) -> RegistryBuilder {
        self.models.push(model);
        self
    }

    /// Builds parents before children whatever the declaration order, then validates and
    /// registers every relation.
    pub fn build(self) -> Result<Registry, AppError> {
        let mut pending = self.models;
        let mut models: HashMap<String, Arc<ModelDef>> = HashMap::new();
        let mut order = Vec::new();
        let mut subclasses: HashMap<String, Vec<String>> = HashMap::new();

        while !pending.is_empty() {
            let ready = pending.iter().position(|m| m.parent().map_or(true, |p| models.contains_key(p)));
            let Some(idx) = ready else {
                let names: Vec<String> = pending.iter().map(|m| format!("{} extends {:?}", m.name(), m.parent())).collect();
                return Err(AppError::configuration(format!("unknown or cyclic parent models: {}", names.join(", "))));
            };
            let builder = pending.remove(idx);
            if models.contains_key(builder.name()) {
                return Err(AppError::configuration(format!("model `{}` is declared twice", builder.name())));
            }
            let parent = builder.parent().and_then(|p| models.get(p)).cloned();
            let def = builder.build(parent.as_deref())?;
            if let Some(parent) = def.parent() {
                subclasses.entry(parent.to_string()).or_default().push(def.name().to_string());
            }
            order.push(def.name().to_string());
            models.insert(def.name().to_string(), Arc::new(def));
        }

        let registry = Registry {
            models,
            order,
            subclasses,
            class_variants: Mutex::new(HashMap::new()),
            matches: Mutex::new(HashMap::new()),
            reverse: Mutex::new(HashMap::new()),
        };
        registry.register_relations()?;
        info!("Registry built with {} models", registry.order.len());
        Ok(registry)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("models", &self.order).finish_non_exhaustive()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry of every model submitted through `inventory::submit!(ModelInfo::new(..))`.
    pub fn discover() -> Result<Registry, AppError> {
        let mut builder = Registry::builder();
        for info in inventory::iter::<ModelInfo> {
            let model = (info.define_fn)();
            if model.name() != info.name {
                return Err(AppError::configuration(format!("model info `{}` defines model `{}`", info.name, model.name())));
            }
            builder = builder.model(model);
        }
        builder.build()
    }

    pub fn model(&self, name: &str) -> Result<&Arc<ModelDef>, AppError> {
        self.models.get(name).ok_or_else(|| AppError::usage(format!("unknown model `{}`", name)))
    }

    /// Models in build order, parents first.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelDef>> {
        self.order.iter().filter_map(|name| self.models.get(name))
    }

    pub fn subclasses(&self, name: &str) -> &[String] {
        self.subclasses.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn register_relations(&self) -> Result<(), AppError> {
        for def in self.models().filter(|m| !m.is_abstract()) {
            for field in def.fields() {
                if field.relation().is_some() {
                    self.register_reverse(def, field)?;
                }
            }
        }
        Ok(())
    }

    /// Exposes `field` of `forward` under its related name on the related model.
    pub(crate) fn register_reverse(&self, forward: &ModelDef, field: &FieldDescriptor) -> Result<(), AppError> {
        let Some(relation) = field.relation() else {
            return Ok(());
        };
        let related = self.model(&relation.related_model).map_err(|_| {
            AppError::configuration(format!(
                "field `{}` of `{}` relates to unknown model `{}`",
                field.name(),
                forward.name(),
                relation.related_model
            ))
        })?;
        let key = (related.name().to_string(), relation.related_name.clone());
        let mut reverse = self.reverse.lock()?;
        if let Some(existing) = reverse.get(&key) {
            return Err(AppError::configuration(format!(
                "related name `{}` on `{}` is used by both `{}.{}` and `{}.{}`",
                relation.related_name,
                related.name(),
                existing.forward_model,
                existing.field,
                forward.name(),
                field.name()
            )));
        }
        reverse.insert(
            key,
            ReverseRef { forward_model: forward.name().to_string(), field: field.name().to_string(), dynamic: field.is_dynamic_base() },
        );
        Ok(())
    }

    pub fn reverse(&self, related_model: &str, related_name: &str) -> Result<Option<ReverseRef>, AppError> {
        Ok(self.reverse.lock()?.get(&(related_model.to_string(), related_name.to_string())).cloned())
    }

    /// Every reverse collection exposed on `model`, sorted by related name.
    pub fn reverse_refs(&self, model: &str) -> Result<Vec<(String, ReverseRef)>, AppError> {
        let reverse = self.reverse.lock()?;
        let mut refs: Vec<(String, ReverseRef)> =
            reverse.iter().filter(|((m, _), _)| m == model).map(|((_, name), r)| (name.clone(), r.clone())).collect();
        refs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::{FieldDecl, SELF};

    fn person() -> ModelBuilder {
        ModelBuilder::new("Person").pk("name").field(FieldDecl::fk_string("prefered_group", "Group").related_name("prefered_for"))
    }

    fn group() -> ModelBuilder {
        ModelBuilder::new("Group")
            .pk("name")
            .field(FieldDecl::fk_instance_hash("parent", SELF).related_name("children"))
            .field(FieldDecl::m2m_set("members", "Person").related_name("membership"))
    }

    #[test]
    fn relations_are_registered_on_related_model() {
        let registry = Registry::builder().model(person()).model(group()).build().unwrap();
        let children = registry.reverse("Group", "children").unwrap().unwrap();
        assert_eq!(children, ReverseRef { forward_model: "Group".into(), field: "parent".into(), dynamic: false });
        let names: Vec<String> = registry.reverse_refs("Person").unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["membership".to_string()]);
    }

    #[test]
    fn unknown_related_model_is_rejected() {
        let err = Registry::builder().model(person()).build().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn duplicate_related_name_is_rejected() {
        let other = ModelBuilder::new("Club").field(FieldDecl::m2m_set("members", "Person").related_name("membership"));
        let err = Registry::builder().model(person()).model(group()).model(other).build().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn parents_are_built_first_and_tracked() {
        let registry = Registry::builder()
            .model(ModelBuilder::new("Child").extends("Base"))
            .model(ModelBuilder::new("Base").abstract_model().with_dynamic_fields())
            .build()
            .unwrap();
        assert_eq!(registry.subclasses("Base"), &["Child".to_string()]);
        assert!(registry.model("Child").unwrap().is_dynamic());
        let order: Vec<&str> = registry.models().map(|m| m.name()).collect();
        assert_eq!(order, vec!["Base", "Child"]);
    }

    #[test]
    fn missing_parent_is_rejected() {
        let err = Registry::builder().model(ModelBuilder::new("Orphan").extends("Nobody")).build().unwrap_err();
        assert!(err.is_configuration());
    }
}
