//! Reverse side of relation fields.
//!
//! A reverse collection is never stored. Reads query the forward model's equality index
//! for the origin primary key, mutations replay forward commands on each related instance.

pub mod dynamic;

use crate::collection::Collection;
use crate::field::command::Command;
use crate::field::kind::FieldKind;
use crate::model::instance::Instance;
use crate::model::value::FieldValue;
use crate::model::Model;
use crate::storage::WriteCtx;
use crate::{debug, AppError};
use std::collections::BTreeSet;

/// Forward writes a reverse mutation translates into, by relation shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseStrategy {
    /// Foreign key over a string or instance hash slot.
    Single,
    Set,
    List,
    SortedSet,
}

impl ReverseStrategy {
    pub fn for_kind(kind: FieldKind) -> Result<ReverseStrategy, AppError> {
        match kind {
            FieldKind::String | FieldKind::InstanceHash => Ok(ReverseStrategy::Single),
            FieldKind::Set => Ok(ReverseStrategy::Set),
            FieldKind::List => Ok(ReverseStrategy::List),
            FieldKind::SortedSet => Ok(ReverseStrategy::SortedSet),
            FieldKind::Hash => Err(AppError::configuration("hash fields cannot be relations")),
        }
    }

    fn vocabulary(&self) -> &'static str {
        match self {
            ReverseStrategy::Single | ReverseStrategy::Set => "sadd, srem",
            ReverseStrategy::List => "lpush, rpush, lrem",
            ReverseStrategy::SortedSet => "zadd, zrem",
        }
    }

    /// Forward command removing `origin_pk` from a related instance.
    fn detach_command(&self, kind: FieldKind, origin_pk: &str) -> Command {
        match self {
            ReverseStrategy::Single => kind.delete_command(),
            ReverseStrategy::Set => Command::SRem(vec![origin_pk.to_string()]),
            ReverseStrategy::List => Command::LRem(0, origin_pk.to_string()),
            ReverseStrategy::SortedSet => Command::ZRem(vec![origin_pk.to_string()]),
        }
    }
}

/// Instances of `forward` whose relation field `field` points at `origin`.
#[derive(Clone)]
pub struct ReverseCollection {
    origin: Instance,
    forward: Model,
    field: String,
    kind: FieldKind,
    strategy: ReverseStrategy,
}

impl std::fmt::Debug for ReverseCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseCollection")
            .field("origin", &self.origin)
            .field("forward", &self.forward.name())
            .field("field", &self.field)
            .field("kind", &self.kind)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl ReverseCollection {
    pub(crate) fn for_instance(origin: &Instance, related_name: &str) -> Result<ReverseCollection, AppError> {
        let model = origin.model();
        let reverse_ref = model.registry().reverse(model.name(), related_name)?.ok_or_else(|| {
            AppError::NoSuchField(format!("`{}` has no reverse collection `{}`", model.name(), related_name))
        })?;
        if reverse_ref.dynamic {
            return Err(AppError::usage(format!(
                "`{}` is the reverse of the dynamic field `{}.{}`, use `dynamic_reverse`",
                related_name, reverse_ref.forward_model, reverse_ref.field
            )));
        }
        let forward = model.db().model(&reverse_ref.forward_model)?;
        ReverseCollection::for_field(origin, forward, &reverse_ref.field)
    }

    pub(crate) fn for_field(origin: &Instance, forward: Model, field: &str) -> Result<ReverseCollection, AppError> {
        let descriptor = forward.get_field(field)?.descriptor().clone();
        if descriptor.relation().is_none() || descriptor.is_dynamic_base() {
            return Err(AppError::usage(format!("`{}.{}` is not a concrete relation field", forward.name(), field)));
        }
        Ok(ReverseCollection {
            origin: origin.clone(),
            forward,
            field: descriptor.name().to_string(),
            kind: descriptor.kind(),
            strategy: ReverseStrategy::for_kind(descriptor.kind())?,
        })
    }

    pub fn origin(&self) -> &Instance {
        &self.origin
    }

    pub fn forward_model(&self) -> &Model {
        &self.forward
    }

    pub fn forward_field(&self) -> &str {
        &self.field
    }

    pub fn strategy(&self) -> ReverseStrategy {
        self.strategy
    }

    /// Query on the forward model restricted to instances pointing at the origin.
    pub fn collection(&self) -> Result<Collection, AppError> {
        self.forward.collection().filter(&self.field, self.origin.pk())
    }

    pub fn call(&self) -> Result<BTreeSet<String>, AppError> {
        self.collection()?.pks()
    }

    pub fn filter(&self, extra: &[(&str, &str)]) -> Result<BTreeSet<String>, AppError> {
        self.collection()?.filters(extra)?.pks()
    }

    pub fn instances(&self) -> Result<Vec<Instance>, AppError> {
        self.collection()?.instances()
    }

    pub fn contains(&self, value: impl FieldValue) -> Result<bool, AppError> {
        Ok(self.call()?.contains(&value.to_field_value()))
    }

    // ---------- mutations ----------

    pub fn sadd<V: FieldValue>(&self, values: &[V]) -> Result<(), AppError> {
        let origin = self.origin.pk().to_string();
        match self.strategy {
            ReverseStrategy::Single => self.replay(values, |kind| kind.proxy_set(origin.clone())),
            ReverseStrategy::Set => self.replay(values, |_| Ok(Command::SAdd(vec![origin.clone()]))),
            _ => Err(self.wrong_vocabulary("sadd")),
        }
    }

    pub fn srem<V: FieldValue>(&self, values: &[V]) -> Result<(), AppError> {
        let origin = self.origin.pk().to_string();
        match self.strategy {
            ReverseStrategy::Single => self.replay(values, |kind| Ok(kind.delete_command())),
            ReverseStrategy::Set => self.replay(values, |_| Ok(Command::SRem(vec![origin.clone()]))),
            _ => Err(self.wrong_vocabulary("srem")),
        }
    }

    pub fn lpush<V: FieldValue>(&self, values: &[V]) -> Result<(), AppError> {
        self.require(ReverseStrategy::List, "lpush")?;
        let origin = self.origin.pk().to_string();
        self.replay(values, |_| Ok(Command::LPush(vec![origin.clone()])))
    }

    pub fn rpush<V: FieldValue>(&self, values: &[V]) -> Result<(), AppError> {
        self.require(ReverseStrategy::List, "rpush")?;
        let origin = self.origin.pk().to_string();
        self.replay(values, |_| Ok(Command::RPush(vec![origin.clone()])))
    }

    /// Removes every occurrence of the origin from the lists of `values`.
    pub fn lrem<V: FieldValue>(&self, values: &[V]) -> Result<(), AppError> {
        self.require(ReverseStrategy::List, "lrem")?;
        let origin = self.origin.pk().to_string();
        self.replay(values, |_| Ok(Command::LRem(0, origin.clone())))
    }

    /// Adds the origin to the sorted set of each value with the paired score.
    pub fn zadd<V: FieldValue>(&self, pairs: &[(f64, V)]) -> Result<(), AppError> {
        self.require(ReverseStrategy::SortedSet, "zadd")?;
        let origin = self.origin.pk().to_string();
        self.forward.storage().write(|ctx| {
            for (score, value) in pairs {
                self.apply_on(ctx, &value.to_field_value(), Command::ZAdd(vec![(*score, origin.clone())]))?;
            }
            Ok(())
        })
    }

    pub fn zrem<V: FieldValue>(&self, values: &[V]) -> Result<(), AppError> {
        self.require(ReverseStrategy::SortedSet, "zrem")?;
        let origin = self.origin.pk().to_string();
        self.replay(values, |_| Ok(Command::ZRem(vec![origin.clone()])))
    }

    fn require(&self, strategy: ReverseStrategy, command: &str) -> Result<(), AppError> {
        if self.strategy == strategy {
            Ok(())
        } else {
            Err(self.wrong_vocabulary(command))
        }
    }

    fn wrong_vocabulary(&self, command: &str) -> AppError {
        AppError::usage(format!(
            "`{}` is not available on the reverse of `{}.{}`, use one of: {}",
            command,
            self.forward.name(),
            self.field,
            self.strategy.vocabulary()
        ))
    }

    fn replay<V: FieldValue>(&self, values: &[V], command: impl Fn(FieldKind) -> Result<Command, AppError>) -> Result<(), AppError> {
        self.forward.storage().write(|ctx| {
            for value in values {
                self.apply_on(ctx, &value.to_field_value(), command(self.kind)?)?;
            }
            Ok(())
        })
    }

    fn apply_on(&self, ctx: &mut WriteCtx<'_>, forward_pk: &str, command: Command) -> Result<(), AppError> {
        if !self.forward.exists_in(ctx, forward_pk)? {
            return Err(AppError::NotFound(format!("{} with pk `{}`", self.forward.name(), forward_pk)));
        }
        let field = self.forward.bind(forward_pk.to_string()).get_field(&self.field)?;
        field.apply(ctx, command)?;
        Ok(())
    }

    /// Removes the origin from every forward instance pointing at it.
    pub(crate) fn detach_all(&self, ctx: &mut WriteCtx<'_>) -> Result<usize, AppError> {
        let pks = self.collection()?.pks_in(ctx)?;
        let command = self.strategy.detach_command(self.kind, self.origin.pk());
        for pk in &pks {
            let field = self.forward.bind(pk.clone()).get_field(&self.field)?;
            field.apply(ctx, command.clone())?;
        }
        if !pks.is_empty() {
            debug!("Detached {:?} from {} `{}.{}` values", self.origin, pks.len(), self.forward.name(), self.field);
        }
        Ok(pks.len())
    }
}
