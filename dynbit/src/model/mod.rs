pub mod builder;
pub mod instance;
pub mod registry;
pub mod value;

use crate::collection::Collection;
use crate::db::Db;
use crate::field::kind::FieldKind;
use crate::field::{Field, FieldDescriptor};
use crate::model::builder::{FieldDecl, PkSpec};
use crate::model::instance::Instance;
use crate::model::registry::Registry;
use crate::model::value::FieldValue;
use crate::storage::entry;
use crate::storage::{KeyRead, Storage, WriteCtx};
use crate::AppError;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Key suffixes living next to instance keys under the model scope.
const RESERVED_PKS: &[&str] = &["collection", "max_pk"];

/// A built model: its key prefix, primary key and ordered declared fields (inherited first).
#[derive(Debug)]
pub struct ModelDef {
    name: String,
    namespace: String,
    pk: PkSpec,
    parent: Option<String>,
    dynamic: bool,
    is_abstract: bool,
    fields: Vec<Arc<FieldDescriptor>>,
    decls: Vec<FieldDecl>,
    field_names: Arc<Vec<String>>,
    hash_field_names: Arc<Vec<String>>,
}

impl ModelDef {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        namespace: String,
        pk: PkSpec,
        parent: Option<String>,
        dynamic: bool,
        is_abstract: bool,
        fields: Vec<Arc<FieldDescriptor>>,
        decls: Vec<FieldDecl>,
    ) -> ModelDef {
        let field_names = fields.iter().map(|f| f.name().to_string()).collect();
        let hash_field_names = fields
            .iter()
            .filter(|f| f.kind() == FieldKind::InstanceHash && !f.is_dynamic_base())
            .map(|f| f.name().to_string())
            .collect();
        ModelDef {
            name,
            namespace,
            pk,
            parent,
            dynamic,
            is_abstract,
            fields,
            decls,
            field_names: Arc::new(field_names),
            hash_field_names: Arc::new(hash_field_names),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pk(&self) -> &PkSpec {
        &self.pk
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Declared dynamic bases, in declaration order.
    pub fn dynamic_fields(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> {
        self.fields.iter().filter(|f| f.is_dynamic_base())
    }

    pub fn field_names(&self) -> &Arc<Vec<String>> {
        &self.field_names
    }

    pub fn hash_field_names(&self) -> &Arc<Vec<String>> {
        &self.hash_field_names
    }

    pub(crate) fn decls(&self) -> &[FieldDecl] {
        &self.decls
    }

    /// Name under which keys are written: `{namespace}:{name}`, or the bare name.
    pub fn key_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.namespace, self.name)
        }
    }
}

/// Class level handle of a model.
#[derive(Clone)]
pub struct Model {
    db: Db,
    def: Arc<ModelDef>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Model").field(&self.name()).finish()
    }
}

impl Model {
    pub(crate) fn new(db: Db, def: Arc<ModelDef>) -> Model {
        Model { db, def }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn storage(&self) -> &Storage {
        self.db.storage()
    }

    pub(crate) fn registry(&self) -> &Registry {
        self.db.registry()
    }

    /// `{db namespace}:{model key name}`, prefix of every key and index entry of the model.
    pub fn scope(&self) -> String {
        self.storage().scope(&self.def.key_name())
    }

    pub(crate) fn collection_key(&self) -> String {
        format!("{}:collection", self.scope())
    }

    fn max_pk_key(&self) -> String {
        format!("{}:max_pk", self.scope())
    }

    /// Field by name, static or dynamic; a dynamic name is materialized on the model.
    pub fn get_field(&self, name: &str) -> Result<Field, AppError> {
        let descriptor = self.resolve_class_field(name)?;
        Ok(Field::unbound(descriptor, self.clone()))
    }

    /// Whether `name` is declared or matches a dynamic field; nothing is materialized.
    pub fn has_field(&self, name: &str) -> Result<bool, AppError> {
        let def = self.def();
        if def.field(name).is_some() || self.registry().class_variant(def.name(), name)?.is_some() {
            return Ok(true);
        }
        Ok(self.registry().dynamic_match(def, name)?.is_some())
    }

    /// Concrete name of the variant of dynamic field `base_name` for `variable_part`.
    pub fn field_name_for(&self, base_name: &str, variable_part: impl FieldValue) -> Result<String, AppError> {
        self.get_field(base_name)?.name_for(variable_part)
    }

    pub fn collection(&self) -> Collection {
        Collection::new(self.clone())
    }

    pub(crate) fn bind(&self, pk: String) -> Instance {
        Instance::new(self.clone(), pk)
    }

    pub(crate) fn exists_in(&self, ctx: &dyn KeyRead, pk: &str) -> Result<bool, AppError> {
        let key = self.collection_key();
        Ok(entry::set_ref(&key, ctx.entry(&key)?.as_ref())?.is_some_and(|pks| pks.contains(pk)))
    }

    pub(crate) fn pks_in(&self, ctx: &dyn KeyRead) -> Result<BTreeSet<String>, AppError> {
        let key = self.collection_key();
        entry::smembers(&key, ctx.entry(&key)?.as_ref())
    }

    pub fn exists(&self, pk: impl FieldValue) -> Result<bool, AppError> {
        let pk = pk.to_field_value();
        self.storage().read(|ctx| self.exists_in(ctx, &pk))
    }

    /// Loads an existing instance.
    pub fn get(&self, pk: impl FieldValue) -> Result<Instance, AppError> {
        let pk = pk.to_field_value();
        if !self.exists(pk.as_str())? {
            return Err(AppError::NotFound(format!("{} with {} `{}`", self.name(), self.def.pk().name, pk)));
        }
        Ok(self.bind(pk))
    }

    /// Creates an instance and stores `values` through each field's proxy setter; names may
    /// be dynamic variant names. Everything happens in one write transaction.
    pub fn create(&self, values: &[(&str, &str)]) -> Result<Instance, AppError> {
        if self.def.is_abstract() {
            return Err(AppError::usage(format!("abstract model `{}` cannot be instantiated", self.name())));
        }
        let pk_spec = self.def.pk();
        let explicit_pk = values.iter().find(|(name, _)| *name == pk_spec.name || *name == "pk").map(|(_, v)| v.to_string());
        self.storage().write(|ctx| {
            let pk = match (pk_spec.auto, explicit_pk) {
                (true, Some(_)) => {
                    return Err(AppError::usage(format!("primary key of `{}` is generated and cannot be set", self.name())))
                }
                (true, None) => self.next_pk(ctx)?,
                (false, Some(pk)) => pk,
                (false, None) => {
                    return Err(AppError::usage(format!("a value for `{}` is required to create a `{}`", pk_spec.name, self.name())))
                }
            };
            if RESERVED_PKS.contains(&pk.as_str()) {
                return Err(AppError::usage(format!("`{}` is reserved and cannot be used as a primary key", pk)));
            }
            if self.exists_in(ctx, &pk)? {
                return Err(AppError::AlreadyExists(format!("{} with {} `{}`", self.name(), pk_spec.name, pk)));
            }
            let key = self.collection_key();
            let members = [pk.clone()];
            ctx.update(&key, |e| entry::sadd(&key, e, &members))?;

            let instance = self.bind(pk);
            for (name, value) in values.iter().filter(|(name, _)| *name != pk_spec.name && *name != "pk") {
                let field = instance.get_field(name)?;
                if field.descriptor().is_dynamic_base() {
                    return Err(AppError::configuration(format!("`{}` is a dynamic field, set one of its variants instead", name)));
                }
                field.apply(ctx, field.kind().proxy_set(value.to_string())?)?;
            }
            Ok(instance)
        })
    }

    fn next_pk(&self, ctx: &mut WriteCtx<'_>) -> Result<String, AppError> {
        let key = self.max_pk_key();
        let current = match entry::get(&key, ctx.entry(&key)?.as_ref())? {
            Some(value) => value.parse::<u64>().map_err(|e| AppError::Custom(format!("corrupted pk counter `{}`: {}", key, e)))?,
            None => 0,
        };
        let next = (current + 1).to_string();
        ctx.update(&key, |e| {
            entry::set(e, &next);
            Ok(())
        })?;
        Ok(next)
    }
}
