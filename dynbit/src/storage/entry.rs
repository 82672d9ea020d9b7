use crate::AppError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// One stored value, tagged by the primitive that owns the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    List(Vec<String>),
    ZSet(BTreeMap<String, f64>),
}

impl Entry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Entry::Str(_) => "string",
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::List(_) => "list",
            Entry::ZSet(_) => "zset",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Entry::Str(_) => false,
            Entry::Hash(h) => h.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::List(l) => l.is_empty(),
            Entry::ZSet(z) => z.is_empty(),
        }
    }
}

/// Drops a collection that became empty, the way the key disappears in a Redis-like store.
pub fn prune(entry: &mut Option<Entry>) {
    if entry.as_ref().is_some_and(Entry::is_empty) {
        *entry = None;
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Entry) -> AppError {
    AppError::WrongType { key: key.to_string(), expected, found: found.type_name() }
}

macro_rules! typed_access {
    ($read:ident, $write:ident, $variant:ident, $ty:ty, $label:expr, $empty:expr) => {
        pub fn $read<'a>(key: &str, entry: Option<&'a Entry>) -> Result<Option<&'a $ty>, AppError> {
            match entry {
                None => Ok(None),
                Some(Entry::$variant(v)) => Ok(Some(v)),
                Some(other) => Err(wrong_type(key, $label, other)),
            }
        }

        pub fn $write<'a>(key: &str, entry: &'a mut Option<Entry>) -> Result<&'a mut $ty, AppError> {
            match entry.get_or_insert_with(|| Entry::$variant($empty)) {
                Entry::$variant(v) => Ok(v),
                other => Err(wrong_type(key, $label, other)),
            }
        }
    };
}

typed_access!(hash_ref, hash_mut, Hash, BTreeMap<String, String>, "hash", BTreeMap::new());
typed_access!(set_ref, set_mut, Set, BTreeSet<String>, "set", BTreeSet::new());
typed_access!(list_ref, list_mut, List, Vec<String>, "list", Vec::new());
typed_access!(zset_ref, zset_mut, ZSet, BTreeMap<String, f64>, "zset", BTreeMap::new());

// ---------- strings ----------

pub fn get(key: &str, entry: Option<&Entry>) -> Result<Option<String>, AppError> {
    match entry {
        None => Ok(None),
        Some(Entry::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(wrong_type(key, "string", other)),
    }
}

/// Overwrites the key whatever it held before.
pub fn set(entry: &mut Option<Entry>, value: &str) {
    *entry = Some(Entry::Str(value.to_string()));
}

// ---------- hashes ----------

pub fn hget(key: &str, entry: Option<&Entry>, field: &str) -> Result<Option<String>, AppError> {
    Ok(hash_ref(key, entry)?.and_then(|h| h.get(field).cloned()))
}

pub fn hset(key: &str, entry: &mut Option<Entry>, field: &str, value: &str) -> Result<bool, AppError> {
    Ok(hash_mut(key, entry)?.insert(field.to_string(), value.to_string()).is_none())
}

pub fn hdel(key: &str, entry: &mut Option<Entry>, fields: &[String]) -> Result<usize, AppError> {
    if entry.is_none() {
        return Ok(0);
    }
    let hash = hash_mut(key, entry)?;
    Ok(fields.iter().filter(|f| hash.remove(f.as_str()).is_some()).count())
}

// ---------- sets ----------

pub fn sadd(key: &str, entry: &mut Option<Entry>, members: &[String]) -> Result<usize, AppError> {
    let set = set_mut(key, entry)?;
    Ok(members.iter().filter(|m| set.insert((*m).clone())).count())
}

pub fn srem(key: &str, entry: &mut Option<Entry>, members: &[String]) -> Result<usize, AppError> {
    if entry.is_none() {
        return Ok(0);
    }
    let set = set_mut(key, entry)?;
    Ok(members.iter().filter(|m| set.remove(m.as_str())).count())
}

pub fn smembers(key: &str, entry: Option<&Entry>) -> Result<BTreeSet<String>, AppError> {
    Ok(set_ref(key, entry)?.cloned().unwrap_or_default())
}

// ---------- lists ----------

pub fn lpush(key: &str, entry: &mut Option<Entry>, values: &[String]) -> Result<usize, AppError> {
    let list = list_mut(key, entry)?;
    for v in values {
        list.insert(0, v.clone());
    }
    Ok(list.len())
}

pub fn rpush(key: &str, entry: &mut Option<Entry>, values: &[String]) -> Result<usize, AppError> {
    let list = list_mut(key, entry)?;
    list.extend(values.iter().cloned());
    Ok(list.len())
}

/// `count > 0` removes from the head, `count < 0` from the tail, `0` removes every match.
pub fn lrem(key: &str, entry: &mut Option<Entry>, count: i64, value: &str) -> Result<usize, AppError> {
    if entry.is_none() {
        return Ok(0);
    }
    let list = list_mut(key, entry)?;
    let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
    let mut removed = 0;
    if count >= 0 {
        let mut i = 0;
        while i < list.len() && removed < limit {
            if list[i] == value {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = list.len();
        while i > 0 && removed < limit {
            i -= 1;
            if list[i] == value {
                list.remove(i);
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Resolves Redis-style inclusive `[start, stop]` bounds, negative values counting from the end.
pub fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

pub fn lrange(key: &str, entry: Option<&Entry>, start: i64, stop: i64) -> Result<Vec<String>, AppError> {
    let list = match list_ref(key, entry)? {
        Some(list) => list,
        None => return Ok(Vec::new()),
    };
    Ok(match resolve_range(list.len(), start, stop) {
        Some((from, to)) => list[from..=to].to_vec(),
        None => Vec::new(),
    })
}

// ---------- sorted sets ----------

pub fn zadd(key: &str, entry: &mut Option<Entry>, pairs: &[(f64, String)]) -> Result<usize, AppError> {
    let zset = zset_mut(key, entry)?;
    Ok(pairs.iter().filter(|(score, member)| zset.insert(member.clone(), *score).is_none()).count())
}

pub fn zrem(key: &str, entry: &mut Option<Entry>, members: &[String]) -> Result<usize, AppError> {
    if entry.is_none() {
        return Ok(0);
    }
    let zset = zset_mut(key, entry)?;
    Ok(members.iter().filter(|m| zset.remove(m.as_str()).is_some()).count())
}

/// Members ordered by score, ties broken by member.
pub fn zsorted(key: &str, entry: Option<&Entry>) -> Result<Vec<(String, f64)>, AppError> {
    let mut pairs: Vec<(String, f64)> = match zset_ref(key, entry)? {
        Some(zset) => zset.iter().map(|(m, s)| (m.clone(), *s)).collect(),
        None => return Ok(Vec::new()),
    };
    pairs.sort_by(|a, b| match a.1.total_cmp(&b.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    Ok(pairs)
}

pub fn zrange(key: &str, entry: Option<&Entry>, start: i64, stop: i64) -> Result<Vec<(String, f64)>, AppError> {
    let sorted = zsorted(key, entry)?;
    Ok(match resolve_range(sorted.len(), start, stop) {
        Some((from, to)) => sorted[from..=to].to_vec(),
        None => Vec::new(),
    })
}
