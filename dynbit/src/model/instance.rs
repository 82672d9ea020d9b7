use crate::field::kind::FieldKind;
use crate::field::{Field, FieldDescriptor};
use crate::model::value::FieldValue;
use crate::model::Model;
use crate::related::dynamic::DynamicReverseCollection;
use crate::related::ReverseCollection;
use crate::storage::entry;
use crate::storage::{KeyRead, WriteCtx};
use crate::{debug, AppError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Field names an instance sees. The lists start shared with the model and are copied
/// the first time a dynamic variant is attached.
struct InstanceFields {
    names: Arc<Vec<String>>,
    hash_names: Arc<Vec<String>>,
    attached: HashMap<String, Arc<FieldDescriptor>>,
}

struct InstanceInner {
    model: Model,
    pk: String,
    fields: Mutex<InstanceFields>,
}

/// Handle on one stored instance; clones share attached dynamic variants.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.inner.model.name(), self.inner.pk)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.inner.model.name() == other.inner.model.name() && self.inner.pk == other.inner.pk
    }
}

impl Instance {
    pub(crate) fn new(model: Model, pk: String) -> Instance {
        let fields = InstanceFields {
            names: Arc::clone(model.def().field_names()),
            hash_names: Arc::clone(model.def().hash_field_names()),
            attached: HashMap::new(),
        };
        Instance { inner: Arc::new(InstanceInner { model, pk, fields: Mutex::new(fields) }) }
    }

    pub fn pk(&self) -> &str {
        &self.inner.pk
    }

    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    /// `{scope}:{pk}`, the hash holding every instance hash slot.
    pub(crate) fn hash_key(&self) -> String {
        format!("{}:{}", self.inner.model.scope(), self.inner.pk)
    }

    pub(crate) fn field_key(&self, field: &str) -> String {
        format!("{}:{}:{}", self.inner.model.scope(), self.inner.pk, field)
    }

    pub(crate) fn attached(&self, name: &str) -> Result<Option<Arc<FieldDescriptor>>, AppError> {
        Ok(self.inner.fields.lock()?.attached.get(name).cloned())
    }

    pub(crate) fn attach(&self, variant: Arc<FieldDescriptor>) -> Result<Arc<FieldDescriptor>, AppError> {
        let mut fields = self.inner.fields.lock()?;
        if let Some(existing) = fields.attached.get(variant.name()) {
            return Ok(Arc::clone(existing));
        }
        let name = variant.name().to_string();
        if !fields.names.contains(&name) {
            Arc::make_mut(&mut fields.names).push(name.clone());
        }
        if variant.kind() == FieldKind::InstanceHash && !fields.hash_names.contains(&name) {
            Arc::make_mut(&mut fields.hash_names).push(name.clone());
        }
        fields.attached.insert(name, Arc::clone(&variant));
        debug!("Attached `{}` to {:?}", variant.name(), self);
        Ok(variant)
    }

    pub fn get_field(&self, name: &str) -> Result<Field, AppError> {
        Ok(Field::bound(self.resolve_field(name)?, self.clone()))
    }

    /// Variant of the dynamic field `base` for `variable_part`, bound to this instance.
    pub fn get_for(&self, base: &str, variable_part: impl FieldValue) -> Result<Field, AppError> {
        self.get_field(base)?.get_for(variable_part)
    }

    pub fn has_field(&self, name: &str) -> Result<bool, AppError> {
        if self.attached(name)?.is_some() {
            return Ok(true);
        }
        self.inner.model.has_field(name)
    }

    /// Declared fields followed by the variants attached to this instance.
    pub fn field_names(&self) -> Result<Arc<Vec<String>>, AppError> {
        Ok(Arc::clone(&self.inner.fields.lock()?.names))
    }

    pub fn hash_field_names(&self) -> Result<Arc<Vec<String>>, AppError> {
        Ok(Arc::clone(&self.inner.fields.lock()?.hash_names))
    }

    /// Values of several instance hash fields at once; dynamic names are materialized first.
    pub fn hmget(&self, names: &[&str]) -> Result<Vec<Option<String>>, AppError> {
        for name in names {
            let field = self.get_field(name)?;
            if field.kind() != FieldKind::InstanceHash || field.descriptor().is_dynamic_base() {
                return Err(AppError::usage(format!("`{}` is not an instance hash field of `{}`", name, self.model().name())));
            }
        }
        let key = self.hash_key();
        self.model().storage().read(|ctx| {
            let current = ctx.entry(&key)?;
            let hash = entry::hash_ref(&key, current.as_ref())?;
            Ok(names.iter().map(|name| hash.and_then(|h| h.get(*name).cloned())).collect())
        })
    }

    pub fn reverse(&self, related_name: &str) -> Result<ReverseCollection, AppError> {
        ReverseCollection::for_instance(self, related_name)
    }

    pub fn dynamic_reverse(&self, related_name: &str) -> Result<DynamicReverseCollection, AppError> {
        DynamicReverseCollection::for_instance(self, related_name)
    }

    /// Deletes every field, every inventoried dynamic variant, the instance itself and every
    /// relation pointing at it, in one write transaction.
    ///
    /// Relations held by variants of a dynamic relation field are detached only for the
    /// variants materialized in this process.
    pub fn delete(&self) -> Result<(), AppError> {
        self.model().storage().write(|ctx| self.delete_in(ctx))
    }

    fn delete_in(&self, ctx: &mut WriteCtx<'_>) -> Result<(), AppError> {
        let model = self.model();
        if !model.exists_in(ctx, self.pk())? {
            return Err(AppError::NotFound(format!("{:?}", self)));
        }
        for descriptor in model.def().fields() {
            let field = Field::bound(Arc::clone(descriptor), self.clone());
            if descriptor.is_dynamic_base() {
                field.delete_variants(ctx, self)?;
            } else {
                field.apply(ctx, field.kind().delete_command())?;
            }
        }
        ctx.put(&self.hash_key(), None)?;
        let key = model.collection_key();
        let members = [self.pk().to_string()];
        ctx.update(&key, |e| entry::srem(&key, e, &members))?;

        for (related_name, reverse_ref) in model.registry().reverse_refs(model.name())? {
            if !reverse_ref.dynamic {
                ReverseCollection::for_instance(self, &related_name)?.detach_all(ctx)?;
            }
        }
        debug!("Deleted {:?}", self);
        Ok(())
    }
}
