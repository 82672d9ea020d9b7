use crate::AppError;
use std::collections::{BTreeMap, BTreeSet};

/// A storage command addressed to one field.
///
/// `SlotGet`/`SlotSet`/`SlotDel` act on the field's own slot of the instance hash, the
/// `H*` commands act on a whole hash field.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get,
    Set(String),
    Delete,

    SlotGet,
    SlotSet(String),
    SlotDel,

    HGet(String),
    HSet(String, String),
    HMSet(Vec<(String, String)>),
    HMGet(Vec<String>),
    HGetAll,
    HDel(Vec<String>),
    HKeys,
    HLen,

    SAdd(Vec<String>),
    SRem(Vec<String>),
    SMembers,
    SIsMember(String),
    SCard,

    LPush(Vec<String>),
    RPush(Vec<String>),
    LRem(i64, String),
    LRange(i64, i64),
    LLen,

    ZAdd(Vec<(f64, String)>),
    ZRem(Vec<String>),
    ZRange(i64, i64),
    ZRangeWithScores(i64, i64),
    ZScore(String),
    ZCard,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::Set(_) => "set",
            Command::Delete => "delete",
            Command::SlotGet => "hget",
            Command::SlotSet(_) => "hset",
            Command::SlotDel => "hdel",
            Command::HGet(_) => "hget",
            Command::HSet(_, _) => "hset",
            Command::HMSet(_) => "hmset",
            Command::HMGet(_) => "hmget",
            Command::HGetAll => "hgetall",
            Command::HDel(_) => "hdel",
            Command::HKeys => "hkeys",
            Command::HLen => "hlen",
            Command::SAdd(_) => "sadd",
            Command::SRem(_) => "srem",
            Command::SMembers => "smembers",
            Command::SIsMember(_) => "sismember",
            Command::SCard => "scard",
            Command::LPush(_) => "lpush",
            Command::RPush(_) => "rpush",
            Command::LRem(_, _) => "lrem",
            Command::LRange(_, _) => "lrange",
            Command::LLen => "llen",
            Command::ZAdd(_) => "zadd",
            Command::ZRem(_) => "zrem",
            Command::ZRange(_, _) => "zrange",
            Command::ZRangeWithScores(_, _) => "zrange_with_scores",
            Command::ZScore(_) => "zscore",
            Command::ZCard => "zcard",
        }
    }

    /// Commands that take data away and so never record a dynamic variant in the inventory.
    pub fn is_delete_family(&self) -> bool {
        matches!(self.name(), "delete" | "hdel")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Int(usize),
    Bool(bool),
    Value(Option<String>),
    Values(Vec<Option<String>>),
    Strings(Vec<String>),
    Members(BTreeSet<String>),
    Map(BTreeMap<String, String>),
    Scored(Vec<(String, f64)>),
    Score(Option<f64>),
}

macro_rules! reply_into {
    ($fn_name:ident, $variant:ident, $ty:ty, $label:expr) => {
        pub fn $fn_name(self) -> Result<$ty, AppError> {
            match self {
                Reply::$variant(v) => Ok(v),
                other => Err(AppError::UnexpectedReply { expected: $label, got: format!("{:?}", other) }),
            }
        }
    };
}

impl Reply {
    reply_into!(into_int, Int, usize, "integer");
    reply_into!(into_bool, Bool, bool, "boolean");
    reply_into!(into_value, Value, Option<String>, "value");
    reply_into!(into_values, Values, Vec<Option<String>>, "values");
    reply_into!(into_strings, Strings, Vec<String>, "strings");
    reply_into!(into_members, Members, BTreeSet<String>, "members");
    reply_into!(into_map, Map, BTreeMap<String, String>, "map");
    reply_into!(into_scored, Scored, Vec<(String, f64)>, "scored members");
    reply_into!(into_score, Score, Option<f64>, "score");

    pub fn into_ok(self) -> Result<(), AppError> {
        match self {
            Reply::Ok => Ok(()),
            other => Err(AppError::UnexpectedReply { expected: "ok", got: format!("{:?}", other) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_commands_share_hash_names() {
        assert_eq!(Command::SlotDel.name(), "hdel");
        assert!(Command::SlotDel.is_delete_family());
        assert!(Command::HDel(vec!["a".into()]).is_delete_family());
        assert!(!Command::SRem(vec!["a".into()]).is_delete_family());
    }

    #[test]
    fn mismatched_reply_is_an_error() {
        assert_eq!(Reply::Int(2).into_int().unwrap(), 2);
        let err = Reply::Ok.into_members().unwrap_err();
        assert!(matches!(err, AppError::UnexpectedReply { expected: "members", .. }));
    }
}
