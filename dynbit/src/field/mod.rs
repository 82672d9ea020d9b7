//! Field descriptors and bound field handles.
//!
//! A [`FieldDescriptor`] is the immutable description of one field of one model: its kind,
//! whether it is indexed, and the optional dynamic and relation capabilities. A [`Field`]
//! binds a descriptor to a model handle and, for storage commands, to an instance.

pub mod command;
pub mod kind;

use crate::dynamic::grammar::{sanitize_identifier, NameGrammar};
use crate::dynamic::inventory;
use crate::model::instance::Instance;
use crate::model::value::FieldValue;
use crate::model::Model;
use crate::storage::WriteCtx;
use crate::AppError;
use command::{Command, Reply};
use kind::{FieldKind, Slot};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_FIELD_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub related_model: String,
    pub related_name: String,
}

pub struct FieldDescriptor {
    id: u64,
    name: String,
    model: String,
    kind: FieldKind,
    indexable: bool,
    grammar: Option<Arc<NameGrammar>>,
    dynamic_version_of: Option<Arc<FieldDescriptor>>,
    dynamic_part: OnceCell<String>,
    relation: Option<Relation>,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("kind", &self.kind)
            .field("indexable", &self.indexable)
            .field("dynamic", &self.is_dynamic())
            .field("dynamic_version_of", &self.dynamic_version_of.as_ref().map(|b| b.id))
            .field("relation", &self.relation)
            .finish()
    }
}

impl FieldDescriptor {
    pub(crate) fn new(
        name: &str,
        model: &str,
        kind: FieldKind,
        indexable: bool,
        grammar: Option<Arc<NameGrammar>>,
        relation: Option<Relation>,
    ) -> FieldDescriptor {
        FieldDescriptor {
            id: next_id(),
            name: name.to_string(),
            model: model.to_string(),
            kind,
            indexable,
            grammar,
            dynamic_version_of: None,
            dynamic_part: OnceCell::new(),
            relation,
        }
    }

    /// Process unique identity, distinct for every variant and every instance copy.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model this descriptor was attached to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_indexable(&self) -> bool {
        self.indexable
    }

    pub fn relation(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    pub fn grammar(&self) -> Option<&Arc<NameGrammar>> {
        self.grammar.as_ref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.grammar.is_some()
    }

    /// The declared dynamic field itself, which never holds data.
    pub fn is_dynamic_base(&self) -> bool {
        self.grammar.is_some() && self.dynamic_version_of.is_none()
    }

    pub fn dynamic_version_of(&self) -> Option<&Arc<FieldDescriptor>> {
        self.dynamic_version_of.as_ref()
    }

    fn grammar_or_err(&self) -> Result<&NameGrammar, AppError> {
        self.grammar
            .as_deref()
            .ok_or_else(|| AppError::usage(format!("field `{}` of `{}` is not a dynamic field", self.name, self.model)))
    }

    pub fn name_for(&self, variable_part: &str) -> Result<String, AppError> {
        self.grammar_or_err()?.name_for(variable_part)
    }

    pub fn accepts(&self, candidate: &str) -> Result<bool, AppError> {
        self.grammar_or_err()?.accepts(candidate)
    }

    /// The variable part of a variant, extracted from its own name on first use.
    pub fn dynamic_part(&self) -> Result<&str, AppError> {
        if self.dynamic_version_of.is_none() {
            return Err(AppError::usage(format!("`{}` is not a variant of a dynamic field", self.name)));
        }
        let grammar = self.grammar_or_err()?;
        self.dynamic_part.get_or_try_init(|| grammar.extract_variable_part(&self.name)).map(String::as_str)
    }

    /// A variant of this dynamic base named `name`, attached to `model`.
    ///
    /// A relation variant gets the related name `{base}__{part}__{id}` so every variant
    /// owns a distinct reverse collection.
    pub(crate) fn create_variant(self: &Arc<Self>, name: &str, model: &str) -> Result<FieldDescriptor, AppError> {
        let id = next_id();
        let dynamic_part = OnceCell::new();
        let relation = match &self.relation {
            Some(relation) => {
                let part = self.grammar_or_err()?.extract_variable_part(name)?;
                let related_name = format!("{}__{}__{}", relation.related_name, sanitize_identifier(&part)?, id);
                let _ = dynamic_part.set(part);
                Some(Relation { related_model: relation.related_model.clone(), related_name })
            }
            None => None,
        };
        Ok(FieldDescriptor {
            id,
            name: name.to_string(),
            model: model.to_string(),
            kind: self.kind,
            indexable: self.indexable,
            grammar: self.grammar.clone(),
            dynamic_version_of: Some(Arc::clone(self)),
            dynamic_part,
            relation,
        })
    }

    /// Copy attached to a single instance, keeping the class variant's related name.
    pub(crate) fn instance_copy(&self) -> FieldDescriptor {
        let dynamic_part = OnceCell::new();
        if let Some(part) = self.dynamic_part.get() {
            let _ = dynamic_part.set(part.clone());
        }
        FieldDescriptor {
            id: next_id(),
            name: self.name.clone(),
            model: self.model.clone(),
            kind: self.kind,
            indexable: self.indexable,
            grammar: self.grammar.clone(),
            dynamic_version_of: self.dynamic_version_of.clone(),
            dynamic_part,
            relation: self.relation.clone(),
        }
    }
}

/// A field resolved on a model, bound to an instance when it came from one.
#[derive(Clone)]
pub struct Field {
    descriptor: Arc<FieldDescriptor>,
    model: Model,
    instance: Option<Instance>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.descriptor.name)
            .field("model", &self.model.name())
            .field("pk", &self.instance.as_ref().map(|i| i.pk().to_string()))
            .finish()
    }
}

impl Field {
    pub(crate) fn unbound(descriptor: Arc<FieldDescriptor>, model: Model) -> Field {
        Field { descriptor, model, instance: None }
    }

    pub(crate) fn bound(descriptor: Arc<FieldDescriptor>, instance: Instance) -> Field {
        Field { descriptor, model: instance.model().clone(), instance: Some(instance) }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn kind(&self) -> FieldKind {
        self.descriptor.kind()
    }

    pub fn descriptor(&self) -> &Arc<FieldDescriptor> {
        &self.descriptor
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub(crate) fn bound_instance(&self) -> Result<&Instance, AppError> {
        self.instance
            .as_ref()
            .ok_or_else(|| AppError::usage(format!("field `{}` of `{}` is not bound to an instance", self.name(), self.model.name())))
    }

    pub(crate) fn slot(&self, instance: &Instance) -> Slot {
        let key = match self.kind() {
            FieldKind::InstanceHash => instance.hash_key(),
            _ => instance.field_key(self.name()),
        };
        Slot { key, name: self.name().to_string() }
    }

    pub fn call(&self, command: Command) -> Result<Reply, AppError> {
        if self.descriptor.is_dynamic_base() {
            return Err(AppError::configuration(format!(
                "`{}` on `{}`: commands apply only to materialized variants of a dynamic field",
                command.name(),
                self.name()
            )));
        }
        let instance = self.bound_instance()?;
        let kind = self.kind();
        if !kind.accepts(&command) {
            return Err(AppError::usage(format!("`{}` is not a command of the {} field `{}`", command.name(), kind.type_name(), self.name())));
        }
        let storage = self.model.storage();
        if kind.is_modifier(&command) {
            storage.write(|ctx| self.apply(ctx, command))
        } else {
            let slot = self.slot(instance);
            storage.read(|ctx| kind.query(&slot, ctx, &command))
        }
    }

    /// Runs a modifier inside an open write transaction, keeping the equality index and,
    /// for dynamic variants, the inventory in step with the stored value.
    pub(crate) fn apply(&self, ctx: &mut WriteCtx<'_>, command: Command) -> Result<Reply, AppError> {
        let instance = self.bound_instance()?;
        let kind = self.kind();
        let slot = self.slot(instance);
        let before = if self.descriptor.is_indexable() { kind.index_values(&slot, ctx)? } else { BTreeSet::new() };
        let reply = kind.execute(&slot, ctx, &command)?;
        if self.descriptor.is_indexable() {
            let after = kind.index_values(&slot, ctx)?;
            let scope = self.model.scope();
            for (filter, value) in before.difference(&after) {
                ctx.index_remove(&scope, filter, value, instance.pk())?;
            }
            for (filter, value) in after.difference(&before) {
                ctx.index_add(&scope, filter, value, instance.pk())?;
            }
        }
        if let Some(base) = self.descriptor.dynamic_version_of() {
            let part = self.descriptor.dynamic_part()?;
            let key = instance.field_key(base.name());
            if command.is_delete_family() {
                if !kind.holds_data(&slot, ctx)? {
                    inventory::remove(ctx, &key, part)?;
                }
            } else {
                inventory::add(ctx, &key, part)?;
            }
        }
        Ok(reply)
    }

    /// Deletes the stored value; on a dynamic base, deletes every inventoried variant.
    pub fn delete(&self) -> Result<(), AppError> {
        if self.descriptor.is_dynamic_base() {
            let instance = self.bound_instance()?;
            return self.model.storage().write(|ctx| self.delete_variants(ctx, instance));
        }
        self.call(self.kind().delete_command()).map(|_| ())
    }

    // ---------- proxies ----------

    pub fn get(&self) -> Result<Option<String>, AppError> {
        match self.kind() {
            FieldKind::InstanceHash => self.hget(),
            _ => self.call(Command::Get)?.into_value(),
        }
    }

    pub fn set(&self, value: impl FieldValue) -> Result<(), AppError> {
        self.call(self.kind().proxy_set(value.to_field_value())?).map(|_| ())
    }

    /// Every value held, whatever the kind: list and sorted set members, hash values,
    /// or the single value of a string or slot.
    pub fn members(&self) -> Result<BTreeSet<String>, AppError> {
        Ok(match self.kind() {
            FieldKind::String | FieldKind::InstanceHash => self.get()?.into_iter().collect(),
            FieldKind::Hash => self.hgetall()?.into_values().collect(),
            FieldKind::Set => self.smembers()?,
            FieldKind::List => self.lrange(0, -1)?.into_iter().collect(),
            FieldKind::SortedSet => self.zrange(0, -1)?.into_iter().collect(),
        })
    }

    pub fn contains(&self, value: impl FieldValue) -> Result<bool, AppError> {
        Ok(self.members()?.contains(&value.to_field_value()))
    }

    // ---------- instance hash slot ----------

    pub fn hget(&self) -> Result<Option<String>, AppError> {
        self.call(Command::SlotGet)?.into_value()
    }

    pub fn hset(&self, value: impl FieldValue) -> Result<usize, AppError> {
        self.call(Command::SlotSet(value.to_field_value()))?.into_int()
    }

    pub fn hdel(&self) -> Result<usize, AppError> {
        self.call(Command::SlotDel)?.into_int()
    }

    // ---------- hash ----------

    pub fn hget_key(&self, key: &str) -> Result<Option<String>, AppError> {
        self.call(Command::HGet(key.to_string()))?.into_value()
    }

    pub fn hset_key(&self, key: &str, value: impl FieldValue) -> Result<usize, AppError> {
        self.call(Command::HSet(key.to_string(), value.to_field_value()))?.into_int()
    }

    pub fn hmset(&self, pairs: &[(&str, &str)]) -> Result<(), AppError> {
        let pairs = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.call(Command::HMSet(pairs))?.into_ok()
    }

    pub fn hmget(&self, keys: &[&str]) -> Result<Vec<Option<String>>, AppError> {
        self.call(Command::HMGet(keys.iter().map(|k| k.to_string()).collect()))?.into_values()
    }

    pub fn hgetall(&self) -> Result<BTreeMap<String, String>, AppError> {
        self.call(Command::HGetAll)?.into_map()
    }

    pub fn hdel_keys(&self, keys: &[&str]) -> Result<usize, AppError> {
        self.call(Command::HDel(keys.iter().map(|k| k.to_string()).collect()))?.into_int()
    }

    pub fn hkeys(&self) -> Result<Vec<String>, AppError> {
        self.call(Command::HKeys)?.into_strings()
    }

    pub fn hlen(&self) -> Result<usize, AppError> {
        self.call(Command::HLen)?.into_int()
    }

    // ---------- set ----------

    pub fn sadd<V: FieldValue>(&self, members: &[V]) -> Result<usize, AppError> {
        self.call(Command::SAdd(to_values(members)))?.into_int()
    }

    pub fn srem<V: FieldValue>(&self, members: &[V]) -> Result<usize, AppError> {
        self.call(Command::SRem(to_values(members)))?.into_int()
    }

    pub fn smembers(&self) -> Result<BTreeSet<String>, AppError> {
        self.call(Command::SMembers)?.into_members()
    }

    pub fn sismember(&self, member: impl FieldValue) -> Result<bool, AppError> {
        self.call(Command::SIsMember(member.to_field_value()))?.into_bool()
    }

    pub fn scard(&self) -> Result<usize, AppError> {
        self.call(Command::SCard)?.into_int()
    }

    // ---------- list ----------

    pub fn lpush<V: FieldValue>(&self, values: &[V]) -> Result<usize, AppError> {
        self.call(Command::LPush(to_values(values)))?.into_int()
    }

    pub fn rpush<V: FieldValue>(&self, values: &[V]) -> Result<usize, AppError> {
        self.call(Command::RPush(to_values(values)))?.into_int()
    }

    pub fn lrem(&self, count: i64, value: impl FieldValue) -> Result<usize, AppError> {
        self.call(Command::LRem(count, value.to_field_value()))?.into_int()
    }

    pub fn lrange(&self, start: i64, stop: i64) -> Result<Vec<String>, AppError> {
        self.call(Command::LRange(start, stop))?.into_strings()
    }

    pub fn llen(&self) -> Result<usize, AppError> {
        self.call(Command::LLen)?.into_int()
    }

    // ---------- sorted set ----------

    pub fn zadd<V: FieldValue>(&self, pairs: &[(f64, V)]) -> Result<usize, AppError> {
        let pairs = pairs.iter().map(|(score, v)| (*score, v.to_field_value())).collect();
        self.call(Command::ZAdd(pairs))?.into_int()
    }

    pub fn zrem<V: FieldValue>(&self, members: &[V]) -> Result<usize, AppError> {
        self.call(Command::ZRem(to_values(members)))?.into_int()
    }

    pub fn zrange(&self, start: i64, stop: i64) -> Result<Vec<String>, AppError> {
        self.call(Command::ZRange(start, stop))?.into_strings()
    }

    pub fn zrange_with_scores(&self, start: i64, stop: i64) -> Result<Vec<(String, f64)>, AppError> {
        self.call(Command::ZRangeWithScores(start, stop))?.into_scored()
    }

    pub fn zscore(&self, member: impl FieldValue) -> Result<Option<f64>, AppError> {
        self.call(Command::ZScore(member.to_field_value()))?.into_score()
    }

    pub fn zcard(&self) -> Result<usize, AppError> {
        self.call(Command::ZCard)?.into_int()
    }
}

fn to_values<V: FieldValue>(values: &[V]) -> Vec<String> {
    values.iter().map(FieldValue::to_field_value).collect()
}
