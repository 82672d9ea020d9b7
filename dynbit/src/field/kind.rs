use crate::field::command::{Command, Reply};
use crate::storage::entry::{self, Entry};
use crate::storage::{KeyRead, WriteCtx};
use crate::AppError;
use std::collections::BTreeSet;

/// Storage primitive backing a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    /// One slot of the per-instance hash, addressed by the field name.
    InstanceHash,
    Hash,
    Set,
    List,
    SortedSet,
}

/// Where a bound field keeps its value: the key, plus the field name used as hash slot
/// and as index filter name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub key: String,
    pub name: String,
}

const STRING_MODIFIERS: &[&str] = &["set", "delete"];
const INSTANCE_HASH_MODIFIERS: &[&str] = &["hset", "hdel"];
const HASH_MODIFIERS: &[&str] = &["hset", "hmset", "hdel", "delete"];
const SET_MODIFIERS: &[&str] = &["sadd", "srem", "delete"];
const LIST_MODIFIERS: &[&str] = &["lpush", "rpush", "lrem", "delete"];
const SORTED_SET_MODIFIERS: &[&str] = &["zadd", "zrem", "delete"];

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::InstanceHash => "instance hash",
            FieldKind::Hash => "hash",
            FieldKind::Set => "set",
            FieldKind::List => "list",
            FieldKind::SortedSet => "sorted set",
        }
    }

    pub fn modifiers(&self) -> &'static [&'static str] {
        match self {
            FieldKind::String => STRING_MODIFIERS,
            FieldKind::InstanceHash => INSTANCE_HASH_MODIFIERS,
            FieldKind::Hash => HASH_MODIFIERS,
            FieldKind::Set => SET_MODIFIERS,
            FieldKind::List => LIST_MODIFIERS,
            FieldKind::SortedSet => SORTED_SET_MODIFIERS,
        }
    }

    pub fn is_modifier(&self, command: &Command) -> bool {
        self.modifiers().contains(&command.name())
    }

    pub fn accepts(&self, command: &Command) -> bool {
        use Command::*;
        match self {
            FieldKind::String => matches!(command, Get | Set(_) | Delete),
            FieldKind::InstanceHash => matches!(command, SlotGet | SlotSet(_) | SlotDel),
            FieldKind::Hash => {
                matches!(command, HGet(_) | HSet(_, _) | HMSet(_) | HMGet(_) | HGetAll | HDel(_) | HKeys | HLen | Delete)
            }
            FieldKind::Set => matches!(command, SAdd(_) | SRem(_) | SMembers | SIsMember(_) | SCard | Delete),
            FieldKind::List => matches!(command, LPush(_) | RPush(_) | LRem(_, _) | LRange(_, _) | LLen | Delete),
            FieldKind::SortedSet => {
                matches!(command, ZAdd(_) | ZRem(_) | ZRange(_, _) | ZRangeWithScores(_, _) | ZScore(_) | ZCard | Delete)
            }
        }
    }

    /// Kinds that hold at most one value per instance.
    pub fn is_single_valued(&self) -> bool {
        matches!(self, FieldKind::String | FieldKind::InstanceHash)
    }

    pub fn delete_command(&self) -> Command {
        match self {
            FieldKind::InstanceHash => Command::SlotDel,
            _ => Command::Delete,
        }
    }

    /// The command storing one plain value, used when values are passed at creation time.
    pub fn proxy_set(&self, value: String) -> Result<Command, AppError> {
        match self {
            FieldKind::String => Ok(Command::Set(value)),
            FieldKind::InstanceHash => Ok(Command::SlotSet(value)),
            FieldKind::Set => Ok(Command::SAdd(vec![value])),
            FieldKind::List => Ok(Command::RPush(vec![value])),
            FieldKind::Hash | FieldKind::SortedSet => {
                Err(AppError::usage(format!("a {} field cannot be set from a single value", self.type_name())))
            }
        }
    }

    pub(crate) fn execute(&self, slot: &Slot, ctx: &mut WriteCtx<'_>, command: &Command) -> Result<Reply, AppError> {
        let key = slot.key.as_str();
        match command {
            Command::Set(value) => ctx.update(key, |e| {
                entry::set(e, value);
                Ok(Reply::Ok)
            }),
            Command::Delete => {
                let existed = ctx.entry(key)?.is_some();
                ctx.put(key, None)?;
                Ok(Reply::Int(existed as usize))
            }
            Command::SlotSet(value) => {
                ctx.update(key, |e| entry::hset(key, e, &slot.name, value).map(|new| Reply::Int(new as usize)))
            }
            Command::SlotDel => {
                let names = [slot.name.clone()];
                ctx.update(key, |e| entry::hdel(key, e, &names).map(Reply::Int))
            }
            Command::HSet(field, value) => {
                ctx.update(key, |e| entry::hset(key, e, field, value).map(|new| Reply::Int(new as usize)))
            }
            Command::HMSet(pairs) => ctx.update(key, |e| {
                for (field, value) in pairs {
                    entry::hset(key, e, field, value)?;
                }
                Ok(Reply::Ok)
            }),
            Command::HDel(fields) => ctx.update(key, |e| entry::hdel(key, e, fields).map(Reply::Int)),
            Command::SAdd(members) => ctx.update(key, |e| entry::sadd(key, e, members).map(Reply::Int)),
            Command::SRem(members) => ctx.update(key, |e| entry::srem(key, e, members).map(Reply::Int)),
            Command::LPush(values) => ctx.update(key, |e| entry::lpush(key, e, values).map(Reply::Int)),
            Command::RPush(values) => ctx.update(key, |e| entry::rpush(key, e, values).map(Reply::Int)),
            Command::LRem(count, value) => ctx.update(key, |e| entry::lrem(key, e, *count, value).map(Reply::Int)),
            Command::ZAdd(pairs) => ctx.update(key, |e| entry::zadd(key, e, pairs).map(Reply::Int)),
            Command::ZRem(members) => ctx.update(key, |e| entry::zrem(key, e, members).map(Reply::Int)),
            other => self.query(slot, ctx, other),
        }
    }

    pub(crate) fn query(&self, slot: &Slot, ctx: &dyn KeyRead, command: &Command) -> Result<Reply, AppError> {
        let key = slot.key.as_str();
        let current = ctx.entry(key)?;
        let current = current.as_ref();
        let reply = match command {
            Command::Get => Reply::Value(entry::get(key, current)?),
            Command::SlotGet => Reply::Value(entry::hget(key, current, &slot.name)?),
            Command::HGet(field) => Reply::Value(entry::hget(key, current, field)?),
            Command::HMGet(fields) => {
                let hash = entry::hash_ref(key, current)?;
                Reply::Values(fields.iter().map(|f| hash.and_then(|h| h.get(f).cloned())).collect())
            }
            Command::HGetAll => Reply::Map(entry::hash_ref(key, current)?.cloned().unwrap_or_default()),
            Command::HKeys => Reply::Strings(entry::hash_ref(key, current)?.map(|h| h.keys().cloned().collect()).unwrap_or_default()),
            Command::HLen => Reply::Int(entry::hash_ref(key, current)?.map_or(0, |h| h.len())),
            Command::SMembers => Reply::Members(entry::smembers(key, current)?),
            Command::SIsMember(member) => Reply::Bool(entry::set_ref(key, current)?.is_some_and(|s| s.contains(member))),
            Command::SCard => Reply::Int(entry::set_ref(key, current)?.map_or(0, |s| s.len())),
            Command::LRange(start, stop) => Reply::Strings(entry::lrange(key, current, *start, *stop)?),
            Command::LLen => Reply::Int(entry::list_ref(key, current)?.map_or(0, |l| l.len())),
            Command::ZRange(start, stop) => {
                Reply::Strings(entry::zrange(key, current, *start, *stop)?.into_iter().map(|(m, _)| m).collect())
            }
            Command::ZRangeWithScores(start, stop) => Reply::Scored(entry::zrange(key, current, *start, *stop)?),
            Command::ZScore(member) => Reply::Score(entry::zset_ref(key, current)?.and_then(|z| z.get(member).copied())),
            Command::ZCard => Reply::Int(entry::zset_ref(key, current)?.map_or(0, |z| z.len())),
            other => {
                return Err(AppError::usage(format!("`{}` cannot be run as a read on a {} field", other.name(), self.type_name())))
            }
        };
        Ok(reply)
    }

    /// Every `(filter name, value)` pair the equality index holds for this slot.
    pub(crate) fn index_values(&self, slot: &Slot, ctx: &dyn KeyRead) -> Result<BTreeSet<(String, String)>, AppError> {
        let key = slot.key.as_str();
        let current = ctx.entry(key)?;
        let current = current.as_ref();
        let name = &slot.name;
        let values: BTreeSet<(String, String)> = match self {
            FieldKind::String => entry::get(key, current)?.into_iter().map(|v| (name.clone(), v)).collect(),
            FieldKind::InstanceHash => entry::hget(key, current, name)?.into_iter().map(|v| (name.clone(), v)).collect(),
            FieldKind::Hash => entry::hash_ref(key, current)?
                .map(|h| h.iter().map(|(k, v)| (format!("{}__{}", name, k), v.clone())).collect())
                .unwrap_or_default(),
            FieldKind::Set => entry::smembers(key, current)?.into_iter().map(|m| (name.clone(), m)).collect(),
            FieldKind::List => {
                entry::list_ref(key, current)?.map(|l| l.iter().map(|m| (name.clone(), m.clone())).collect()).unwrap_or_default()
            }
            FieldKind::SortedSet => {
                entry::zset_ref(key, current)?.map(|z| z.keys().map(|m| (name.clone(), m.clone())).collect()).unwrap_or_default()
            }
        };
        Ok(values)
    }

    pub(crate) fn holds_data(&self, slot: &Slot, ctx: &dyn KeyRead) -> Result<bool, AppError> {
        let current = ctx.entry(&slot.key)?;
        Ok(match self {
            FieldKind::InstanceHash => entry::hget(&slot.key, current.as_ref(), &slot.name)?.is_some(),
            _ => current.as_ref().is_some_and(|e| !Entry::is_empty(e)),
        })
    }
}
